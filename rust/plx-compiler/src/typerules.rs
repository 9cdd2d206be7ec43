//! Operator and call typing rules used while lowering.

use plx_core::ir::{BinaryOp, Expr, UnaryOp};
use plx_core::types::{assignable, ElementaryType, Type};
use plx_core::value::Value;

/// The wider of two elementary types under implicit widening, if either
/// side accepts the other.
pub fn promote(left: ElementaryType, right: ElementaryType) -> Option<ElementaryType> {
    if left == right {
        return Some(left);
    }
    let l = Type::Elementary(left);
    let r = Type::Elementary(right);
    if assignable(&l, &r) {
        Some(left)
    } else if assignable(&r, &l) {
        Some(right)
    } else {
        None
    }
}

/// Result type of a binary operation, or `None` when the operand types do
/// not compose.
pub fn binary_result(op: BinaryOp, left: &Type, right: &Type) -> Option<Type> {
    let le = left.elementary();
    let re = right.elementary();
    match op {
        BinaryOp::Add | BinaryOp::Sub => {
            let (l, r) = (le?, re?);
            if l.is_duration() && r.is_duration() {
                return promote(l, r).map(Type::Elementary);
            }
            if l.is_numeric() && r.is_numeric() {
                return promote(l, r).map(Type::Elementary);
            }
            None
        }
        BinaryOp::Mul | BinaryOp::Div => {
            let (l, r) = (le?, re?);
            if l.is_numeric() && r.is_numeric() {
                return promote(l, r).map(Type::Elementary);
            }
            None
        }
        BinaryOp::Mod => {
            let (l, r) = (le?, re?);
            if l.is_integer() && r.is_integer() {
                return promote(l, r).map(Type::Elementary);
            }
            None
        }
        BinaryOp::Pow => {
            let (l, r) = (le?, re?);
            if l.is_numeric() && r.is_numeric() {
                return promote(l, r).map(Type::Elementary);
            }
            None
        }
        BinaryOp::Eq | BinaryOp::NotEq => equality_comparable(left, right).then_some(Type::BOOL),
        BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
            ordered_comparable(left, right).then_some(Type::BOOL)
        }
        BinaryOp::And | BinaryOp::Or | BinaryOp::Xor => {
            (left.is_boolean() && right.is_boolean()).then_some(Type::BOOL)
        }
        BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor => {
            let (l, r) = (le?, re?);
            if l.is_bit_string() && r.is_bit_string() {
                return promote(l, r).map(Type::Elementary);
            }
            None
        }
    }
}

fn equality_comparable(left: &Type, right: &Type) -> bool {
    if ordered_comparable(left, right) {
        return true;
    }
    match (left, right) {
        (Type::Elementary(ElementaryType::Bool), Type::Elementary(ElementaryType::Bool)) => true,
        (Type::Enum(l), Type::Enum(r)) => l == r,
        _ => false,
    }
}

fn ordered_comparable(left: &Type, right: &Type) -> bool {
    match (left, right) {
        (Type::Elementary(l), Type::Elementary(r)) => {
            (l.is_numeric() && r.is_numeric())
                || (l.is_duration() && r.is_duration())
                || (l.is_bit_string() && r.is_bit_string())
                || (l == r
                    && matches!(
                        l,
                        ElementaryType::Date
                            | ElementaryType::TimeOfDay
                            | ElementaryType::DateTime
                            | ElementaryType::Char
                            | ElementaryType::WChar
                    ))
        }
        (Type::String { .. }, Type::String { .. }) => true,
        (Type::WString { .. }, Type::WString { .. }) => true,
        _ => false,
    }
}

/// Result type of a unary operation.
pub fn unary_result(op: UnaryOp, operand: &Type) -> Option<Type> {
    match op {
        UnaryOp::Not => operand.is_boolean().then_some(Type::BOOL),
        UnaryOp::Neg => {
            let e = operand.elementary()?;
            (e.is_signed_int() || e.is_float() || e.is_duration()).then(|| operand.clone())
        }
        UnaryOp::BitNot => {
            let e = operand.elementary()?;
            e.is_bit_string().then(|| operand.clone())
        }
    }
}

/// Whether `value` (an already-typed expression) may be assigned into a
/// slot of type `to`: assignable by widening, or an integer constant that
/// fits the target range.
pub fn expr_assignable(to: &Type, value: &Expr) -> bool {
    let Some(from) = &value.ty else { return false };
    if assignable(to, from) {
        return true;
    }
    if let (Some(v), Some(target)) = (value.const_int(), to.elementary()) {
        if target.is_integer() {
            return Value::int_of(target, v as i128).is_some();
        }
        if target.is_float() {
            return true;
        }
    }
    // A float literal adapts to either float width.
    if let plx_core::ir::ExprKind::Literal(Value::LReal(_) | Value::Real(_)) = &value.kind {
        if to.elementary().is_some_and(|e| e.is_float()) {
            return true;
        }
    }
    false
}

/// Result types of the supported standard functions. Explicit type
/// conversions (`INT(x)`, `LREAL(x)`, ...) are handled by the lowerer
/// before this table is consulted.
pub fn std_function_result(name: &str, args: &[Type]) -> Option<Type> {
    match (name, args) {
        ("ABS", [t]) => {
            let e = t.elementary()?;
            (e.is_signed_int() || e.is_float()).then(|| t.clone())
        }
        ("SQRT", [t]) => {
            let e = t.elementary()?;
            e.is_float().then(|| t.clone())
        }
        ("MIN", [l, r]) | ("MAX", [l, r]) => {
            let result = promote(l.elementary()?, r.elementary()?)?;
            result.is_numeric().then_some(Type::Elementary(result))
        }
        ("LIMIT", [lo, x, hi]) => {
            let lower = promote(lo.elementary()?, x.elementary()?)?;
            let result = promote(lower, hi.elementary()?)?;
            result.is_numeric().then_some(Type::Elementary(result))
        }
        _ => None,
    }
}
