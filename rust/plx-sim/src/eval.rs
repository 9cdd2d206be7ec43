//! Pure value operations for the scan evaluator, and the runtime fault
//! type surfaced when a scan aborts.

use plx_core::ir::{BinaryOp, UnaryOp};
use plx_core::time::IecDuration;
use plx_core::types::{ElementaryType, Type};
use plx_core::value::Value;
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    #[error("division by zero")]
    DivisionByZero,
    #[error("array index out of range")]
    IndexOutOfRange,
    #[error("for-loop step is zero")]
    InvalidStep,
    #[error("negative integer exponent")]
    InvalidOperand,
    #[error("value does not fit the operation")]
    TypeConfusion,
    #[error("unknown variable")]
    UnknownVariable,
    #[error("unknown POU or function block")]
    UnknownPou,
    #[error("construct not executable")]
    UnsupportedConstruct,
}

/// A scan-aborting fault with the evaluation trace that led to it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("runtime fault: {kind}{}", render_trace(.trace))]
pub struct RuntimeFault {
    pub kind: FaultKind,
    pub trace: Vec<String>,
}

fn render_trace(trace: &[String]) -> String {
    if trace.is_empty() {
        String::new()
    } else {
        format!(" (at {})", trace.join(" / "))
    }
}

impl RuntimeFault {
    pub fn new(kind: FaultKind) -> Self {
        Self {
            kind,
            trace: Vec::new(),
        }
    }

    pub fn pushed(mut self, frame: impl Into<String>) -> Self {
        self.trace.push(frame.into());
        self
    }
}

impl From<FaultKind> for RuntimeFault {
    fn from(kind: FaultKind) -> Self {
        RuntimeFault::new(kind)
    }
}

fn as_number(v: &Value) -> Option<f64> {
    v.as_float().or_else(|| v.as_int().map(|i| i as f64))
}

/// Fit an integer result into the annotated result type, wrapping like an
/// explicit conversion. Falls back to LINT when no annotation is present.
fn fit_int(result: Option<&Type>, v: i64) -> Value {
    let target = result
        .and_then(Type::elementary)
        .filter(|e| e.is_integer() || e.is_bit_string())
        .unwrap_or(ElementaryType::LInt);
    Value::LInt(v)
        .convert_to(target)
        .unwrap_or(Value::LInt(v))
}

fn fit_float(result: Option<&Type>, v: f64) -> Value {
    match result.and_then(Type::elementary) {
        Some(ElementaryType::Real) => Value::Real(v as f32),
        _ => Value::LReal(v),
    }
}

fn fit_duration(result: Option<&Type>, nanos: i64) -> Value {
    match result.and_then(Type::elementary) {
        Some(ElementaryType::LTime) => Value::LTime(IecDuration::from_nanos(nanos)),
        _ => Value::Time(IecDuration::from_nanos(nanos)),
    }
}

pub fn binary_op(
    op: BinaryOp,
    left: &Value,
    right: &Value,
    result: Option<&Type>,
) -> Result<Value, FaultKind> {
    match op {
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
            arithmetic(op, left, right, result)
        }
        BinaryOp::Pow => power(left, right, result),
        BinaryOp::Eq => Ok(Value::Bool(values_equal(left, right)?)),
        BinaryOp::NotEq => Ok(Value::Bool(!values_equal(left, right)?)),
        BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
            let ordering = compare(left, right)?;
            Ok(Value::Bool(match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::LtEq => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            }))
        }
        // And/Or are short-circuited by the engine; Xor has no short form.
        BinaryOp::And | BinaryOp::Or | BinaryOp::Xor => {
            let (l, r) = (bool_of(left)?, bool_of(right)?);
            Ok(Value::Bool(match op {
                BinaryOp::And => l && r,
                BinaryOp::Or => l || r,
                _ => l ^ r,
            }))
        }
        BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor => {
            let l = left.as_int().ok_or(FaultKind::TypeConfusion)? as u64;
            let r = right.as_int().ok_or(FaultKind::TypeConfusion)? as u64;
            let v = match op {
                BinaryOp::BitAnd => l & r,
                BinaryOp::BitOr => l | r,
                _ => l ^ r,
            };
            Ok(fit_int(result, v as i64))
        }
    }
}

fn arithmetic(
    op: BinaryOp,
    left: &Value,
    right: &Value,
    result: Option<&Type>,
) -> Result<Value, FaultKind> {
    if let (Some(l), Some(r)) = (left.as_duration(), right.as_duration()) {
        let (l, r) = (l.as_nanos(), r.as_nanos());
        let v = match op {
            BinaryOp::Add => l.wrapping_add(r),
            BinaryOp::Sub => l.wrapping_sub(r),
            _ => return Err(FaultKind::TypeConfusion),
        };
        return Ok(fit_duration(result, v));
    }
    let float_result = result
        .and_then(Type::elementary)
        .is_some_and(|e| e.is_float())
        || left.is_float()
        || right.is_float();
    if float_result {
        let l = as_number(left).ok_or(FaultKind::TypeConfusion)?;
        let r = as_number(right).ok_or(FaultKind::TypeConfusion)?;
        let v = match op {
            BinaryOp::Add => l + r,
            BinaryOp::Sub => l - r,
            BinaryOp::Mul => l * r,
            BinaryOp::Div => {
                if r == 0.0 {
                    return Err(FaultKind::DivisionByZero);
                }
                l / r
            }
            _ => {
                if r == 0.0 {
                    return Err(FaultKind::DivisionByZero);
                }
                l % r
            }
        };
        return Ok(fit_float(result, v));
    }
    let l = left.as_int().ok_or(FaultKind::TypeConfusion)?;
    let r = right.as_int().ok_or(FaultKind::TypeConfusion)?;
    let v = match op {
        BinaryOp::Add => l.wrapping_add(r),
        BinaryOp::Sub => l.wrapping_sub(r),
        BinaryOp::Mul => l.wrapping_mul(r),
        BinaryOp::Div => {
            if r == 0 {
                return Err(FaultKind::DivisionByZero);
            }
            l.wrapping_div(r)
        }
        _ => {
            if r == 0 {
                return Err(FaultKind::DivisionByZero);
            }
            l.wrapping_rem(r)
        }
    };
    Ok(fit_int(result, v))
}

fn power(left: &Value, right: &Value, result: Option<&Type>) -> Result<Value, FaultKind> {
    if left.is_float() || right.is_float() {
        let l = as_number(left).ok_or(FaultKind::TypeConfusion)?;
        let r = as_number(right).ok_or(FaultKind::TypeConfusion)?;
        return Ok(fit_float(result, l.powf(r)));
    }
    let l = left.as_int().ok_or(FaultKind::TypeConfusion)?;
    let r = right.as_int().ok_or(FaultKind::TypeConfusion)?;
    if r < 0 {
        return Err(FaultKind::InvalidOperand);
    }
    let mut acc: i64 = 1;
    for _ in 0..r {
        acc = acc.wrapping_mul(l);
    }
    Ok(fit_int(result, acc))
}

pub fn unary_op(op: UnaryOp, operand: &Value, result: Option<&Type>) -> Result<Value, FaultKind> {
    match op {
        UnaryOp::Not => Ok(Value::Bool(!bool_of(operand)?)),
        UnaryOp::Neg => {
            if let Some(d) = operand.as_duration() {
                return Ok(fit_duration(result, d.as_nanos().wrapping_neg()));
            }
            if operand.is_float() {
                let v = operand.as_float().ok_or(FaultKind::TypeConfusion)?;
                return Ok(fit_float(result, -v));
            }
            let v = operand.as_int().ok_or(FaultKind::TypeConfusion)?;
            Ok(fit_int(result, v.wrapping_neg()))
        }
        UnaryOp::BitNot => {
            let v = operand.as_int().ok_or(FaultKind::TypeConfusion)? as u64;
            Ok(fit_int(result, !v as i64))
        }
    }
}

fn bool_of(v: &Value) -> Result<bool, FaultKind> {
    v.as_bool().ok_or(FaultKind::TypeConfusion)
}

fn values_equal(left: &Value, right: &Value) -> Result<bool, FaultKind> {
    match (left, right) {
        (Value::Bool(l), Value::Bool(r)) => Ok(l == r),
        (Value::String(l), Value::String(r)) | (Value::WString(l), Value::WString(r)) => {
            Ok(l == r)
        }
        (Value::Enum { value: l, .. }, Value::Enum { value: r, .. }) => Ok(l == r),
        _ => compare(left, right).map(|o| o.is_eq()),
    }
}

fn compare(left: &Value, right: &Value) -> Result<std::cmp::Ordering, FaultKind> {
    use std::cmp::Ordering;
    if let (Some(l), Some(r)) = (left.as_duration(), right.as_duration()) {
        return Ok(l.as_nanos().cmp(&r.as_nanos()));
    }
    if left.is_float() || right.is_float() {
        let l = as_number(left).ok_or(FaultKind::TypeConfusion)?;
        let r = as_number(right).ok_or(FaultKind::TypeConfusion)?;
        return l.partial_cmp(&r).ok_or(FaultKind::TypeConfusion);
    }
    if let (Some(l), Some(r)) = (left.as_int(), right.as_int()) {
        return Ok(l.cmp(&r));
    }
    match (left, right) {
        (Value::String(l), Value::String(r)) | (Value::WString(l), Value::WString(r)) => {
            Ok(l.cmp(r))
        }
        (Value::Date(l), Value::Date(r)) => Ok(l.cmp(r)),
        (Value::TimeOfDay(l), Value::TimeOfDay(r)) => Ok(l.cmp(r)),
        (Value::DateTime(l), Value::DateTime(r)) => Ok(l.cmp(r)),
        (Value::WChar(l), Value::WChar(r)) => Ok(l.cmp(r)),
        _ => Err(FaultKind::TypeConfusion),
    }
}

/// Standard functions and explicit conversions, dispatched by the upper
/// case name the lowerer produced.
pub fn call_std(name: &str, args: &[Value], result: Option<&Type>) -> Result<Value, FaultKind> {
    if let Ok(target) = name.parse::<ElementaryType>() {
        let [operand] = args else {
            return Err(FaultKind::TypeConfusion);
        };
        return operand.convert_to(target).ok_or(FaultKind::TypeConfusion);
    }
    match (name, args) {
        ("ABS", [v]) => {
            if v.is_float() {
                let f = v.as_float().ok_or(FaultKind::TypeConfusion)?;
                Ok(fit_float(result, f.abs()))
            } else {
                let i = v.as_int().ok_or(FaultKind::TypeConfusion)?;
                Ok(fit_int(result, i.wrapping_abs()))
            }
        }
        ("SQRT", [v]) => {
            let f = v.as_float().ok_or(FaultKind::TypeConfusion)?;
            Ok(fit_float(result, f.sqrt()))
        }
        ("MIN", [l, r]) => {
            let keep_left = compare(l, r)?.is_le();
            pick(result, if keep_left { l } else { r })
        }
        ("MAX", [l, r]) => {
            let keep_left = compare(l, r)?.is_ge();
            pick(result, if keep_left { l } else { r })
        }
        ("LIMIT", [lo, v, hi]) => {
            let v = if compare(v, lo)?.is_lt() {
                lo
            } else if compare(v, hi)?.is_gt() {
                hi
            } else {
                v
            };
            pick(result, v)
        }
        _ => Err(FaultKind::UnknownPou),
    }
}

/// Re-fit a picked operand to the annotated result type.
fn pick(result: Option<&Type>, v: &Value) -> Result<Value, FaultKind> {
    match result.and_then(Type::elementary) {
        Some(e) if e.is_float() => {
            let f = as_number(v).ok_or(FaultKind::TypeConfusion)?;
            Ok(fit_float(result, f))
        }
        Some(e) if e.is_integer() => {
            let i = v.as_int().ok_or(FaultKind::TypeConfusion)?;
            Ok(fit_int(result, i))
        }
        _ => Ok(v.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_division_truncates() {
        let v = binary_op(
            BinaryOp::Div,
            &Value::DInt(7),
            &Value::DInt(2),
            Some(&Type::DINT),
        )
        .unwrap();
        assert_eq!(v, Value::DInt(3));
    }

    #[test]
    fn division_by_zero_faults() {
        assert_eq!(
            binary_op(BinaryOp::Div, &Value::DInt(1), &Value::DInt(0), None),
            Err(FaultKind::DivisionByZero)
        );
    }

    #[test]
    fn mixed_arithmetic_widens() {
        let v = binary_op(
            BinaryOp::Add,
            &Value::DInt(1),
            &Value::LReal(0.5),
            Some(&Type::LREAL),
        )
        .unwrap();
        assert_eq!(v, Value::LReal(1.5));
    }

    #[test]
    fn duration_compare() {
        let l = Value::Time(IecDuration::from_seconds(1));
        let r = Value::Time(IecDuration::from_millis(1500));
        assert_eq!(
            binary_op(BinaryOp::Lt, &l, &r, Some(&Type::BOOL)).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn conversion_truncates() {
        let v = call_std("INT", &[Value::LReal(3.9)], Some(&Type::INT)).unwrap();
        assert_eq!(v, Value::Int(3));
    }
}
