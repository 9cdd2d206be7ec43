//! The IEC 61131-3 type system: elementary types, type constructors, and
//! user-defined structures and enumerations.

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("empty array dimension {lo}..{hi}")]
    EmptyDimension { lo: i64, hi: i64 },
    #[error("duplicate field '{field}' in struct '{name}'")]
    DuplicateField { name: String, field: String },
    #[error("duplicate variant '{variant}' in enum '{name}'")]
    DuplicateVariant { name: String, variant: String },
    #[error("duplicate variant value {value} in enum '{name}'")]
    DuplicateVariantValue { name: String, value: i64 },
    #[error("enum '{name}' has no variants")]
    EmptyEnum { name: String },
}

/// Elementary (primitive) IEC types.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
)]
pub enum ElementaryType {
    #[strum(serialize = "BOOL")]
    Bool,
    #[strum(serialize = "SINT")]
    SInt,
    #[strum(serialize = "INT")]
    Int,
    #[strum(serialize = "DINT")]
    DInt,
    #[strum(serialize = "LINT")]
    LInt,
    #[strum(serialize = "USINT")]
    USInt,
    #[strum(serialize = "UINT")]
    UInt,
    #[strum(serialize = "UDINT")]
    UDInt,
    #[strum(serialize = "ULINT")]
    ULInt,
    #[strum(serialize = "REAL")]
    Real,
    #[strum(serialize = "LREAL")]
    LReal,
    #[strum(serialize = "BYTE")]
    Byte,
    #[strum(serialize = "WORD")]
    Word,
    #[strum(serialize = "DWORD")]
    DWord,
    #[strum(serialize = "LWORD")]
    LWord,
    #[strum(serialize = "TIME")]
    Time,
    #[strum(serialize = "LTIME")]
    LTime,
    #[strum(serialize = "DATE")]
    Date,
    #[strum(serialize = "TOD")]
    TimeOfDay,
    #[strum(serialize = "DT")]
    DateTime,
    #[strum(serialize = "CHAR")]
    Char,
    #[strum(serialize = "WCHAR")]
    WChar,
}

impl ElementaryType {
    pub fn is_signed_int(&self) -> bool {
        matches!(self, Self::SInt | Self::Int | Self::DInt | Self::LInt)
    }

    pub fn is_unsigned_int(&self) -> bool {
        matches!(self, Self::USInt | Self::UInt | Self::UDInt | Self::ULInt)
    }

    pub fn is_integer(&self) -> bool {
        self.is_signed_int() || self.is_unsigned_int()
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Self::Real | Self::LReal)
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integer() || self.is_float()
    }

    pub fn is_bit_string(&self) -> bool {
        matches!(self, Self::Byte | Self::Word | Self::DWord | Self::LWord)
    }

    pub fn is_duration(&self) -> bool {
        matches!(self, Self::Time | Self::LTime)
    }

    /// Bit width of integer and bit-string types.
    pub fn bits(&self) -> Option<u32> {
        match self {
            Self::SInt | Self::USInt | Self::Byte => Some(8),
            Self::Int | Self::UInt | Self::Word => Some(16),
            Self::DInt | Self::UDInt | Self::DWord => Some(32),
            Self::LInt | Self::ULInt | Self::LWord => Some(64),
            _ => None,
        }
    }

    /// Inclusive value range of integer types.
    pub fn int_range(&self) -> Option<(i128, i128)> {
        match self {
            Self::SInt => Some((i8::MIN as i128, i8::MAX as i128)),
            Self::Int => Some((i16::MIN as i128, i16::MAX as i128)),
            Self::DInt => Some((i32::MIN as i128, i32::MAX as i128)),
            Self::LInt => Some((i64::MIN as i128, i64::MAX as i128)),
            Self::USInt => Some((0, u8::MAX as i128)),
            Self::UInt => Some((0, u16::MAX as i128)),
            Self::UDInt => Some((0, u32::MAX as i128)),
            Self::ULInt => Some((0, u64::MAX as i128)),
            _ => None,
        }
    }
}

/// One inclusive array dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimension {
    pub lo: i64,
    pub hi: i64,
}

impl Dimension {
    pub fn new(lo: i64, hi: i64) -> Result<Self, TypeError> {
        if lo > hi {
            return Err(TypeError::EmptyDimension { lo, hi });
        }
        Ok(Self { lo, hi })
    }

    pub fn len(&self) -> usize {
        (self.hi - self.lo + 1) as usize
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, index: i64) -> bool {
        index >= self.lo && index <= self.hi
    }
}

/// A type expression. Composite kinds reference user types by name; the
/// definitions live in the owning project's `data_types`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Type {
    Elementary(ElementaryType),
    String { max_len: u32 },
    WString { max_len: u32 },
    Array { element: Box<Type>, dims: Vec<Dimension> },
    Pointer(Box<Type>),
    Reference(Box<Type>),
    Struct(String),
    Enum(String),
    /// A function-block instance type, builtin (TON, CTU, ...) or user-defined.
    Fb(String),
}

impl Type {
    pub const BOOL: Type = Type::Elementary(ElementaryType::Bool);
    pub const INT: Type = Type::Elementary(ElementaryType::Int);
    pub const DINT: Type = Type::Elementary(ElementaryType::DInt);
    pub const LINT: Type = Type::Elementary(ElementaryType::LInt);
    pub const REAL: Type = Type::Elementary(ElementaryType::Real);
    pub const LREAL: Type = Type::Elementary(ElementaryType::LReal);
    pub const TIME: Type = Type::Elementary(ElementaryType::Time);

    pub fn array(element: Type, dims: Vec<Dimension>) -> Type {
        Type::Array {
            element: Box::new(element),
            dims,
        }
    }

    pub fn elementary(&self) -> Option<ElementaryType> {
        match self {
            Type::Elementary(e) => Some(*e),
            _ => None,
        }
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self, Type::Elementary(ElementaryType::Bool))
    }

    pub fn is_numeric(&self) -> bool {
        self.elementary().is_some_and(|e| e.is_numeric())
    }

    pub fn is_integer(&self) -> bool {
        self.elementary().is_some_and(|e| e.is_integer())
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Elementary(e) => write!(f, "{}", e),
            Type::String { max_len } => write!(f, "STRING({})", max_len),
            Type::WString { max_len } => write!(f, "WSTRING({})", max_len),
            Type::Array { element, dims } => {
                write!(f, "ARRAY[")?;
                for (i, d) in dims.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}..{}", d.lo, d.hi)?;
                }
                write!(f, "] OF {}", element)
            }
            Type::Pointer(t) => write!(f, "POINTER TO {}", t),
            Type::Reference(t) => write!(f, "REFERENCE TO {}", t),
            Type::Struct(name) | Type::Enum(name) | Type::Fb(name) => write!(f, "{}", name),
        }
    }
}

// ── User-defined types ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructField {
    pub name: String,
    pub ty: Type,
    pub default: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructType {
    pub name: String,
    pub fields: Vec<StructField>,
}

impl StructType {
    pub fn field(&self, name: &str) -> Option<&StructField> {
        self.fields.iter().find(|fd| fd.name == name)
    }

    pub fn validate(&self) -> Result<(), TypeError> {
        let mut seen = HashMap::new();
        for fd in &self.fields {
            if seen.insert(fd.name.as_str(), ()).is_some() {
                return Err(TypeError::DuplicateField {
                    name: self.name.clone(),
                    field: fd.name.clone(),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumVariant {
    pub name: String,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumType {
    pub name: String,
    pub variants: Vec<EnumVariant>,
}

impl EnumType {
    pub fn variant(&self, name: &str) -> Option<&EnumVariant> {
        self.variants.iter().find(|v| v.name == name)
    }

    /// The default value of an enum is its first declared variant.
    pub fn default_variant(&self) -> Option<&EnumVariant> {
        self.variants.first()
    }

    pub fn validate(&self) -> Result<(), TypeError> {
        if self.variants.is_empty() {
            return Err(TypeError::EmptyEnum {
                name: self.name.clone(),
            });
        }
        let mut names = HashMap::new();
        let mut values = HashMap::new();
        for v in &self.variants {
            if names.insert(v.name.as_str(), ()).is_some() {
                return Err(TypeError::DuplicateVariant {
                    name: self.name.clone(),
                    variant: v.name.clone(),
                });
            }
            if values.insert(v.value, ()).is_some() {
                return Err(TypeError::DuplicateVariantValue {
                    name: self.name.clone(),
                    value: v.value,
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UserType {
    Struct(StructType),
    Enum(EnumType),
}

impl UserType {
    pub fn name(&self) -> &str {
        match self {
            UserType::Struct(s) => &s.name,
            UserType::Enum(e) => &e.name,
        }
    }
}

/// Borrowed name → definition lookup over a project's user types.
#[derive(Debug, Clone, Default)]
pub struct TypeTable<'a> {
    structs: HashMap<&'a str, &'a StructType>,
    enums: HashMap<&'a str, &'a EnumType>,
}

impl<'a> TypeTable<'a> {
    pub fn new(types: &'a [UserType]) -> Self {
        let mut table = Self::default();
        for t in types {
            match t {
                UserType::Struct(s) => {
                    table.structs.insert(s.name.as_str(), s);
                }
                UserType::Enum(e) => {
                    table.enums.insert(e.name.as_str(), e);
                }
            }
        }
        table
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn structure(&self, name: &str) -> Option<&'a StructType> {
        self.structs.get(name).copied()
    }

    pub fn enumeration(&self, name: &str) -> Option<&'a EnumType> {
        self.enums.get(name).copied()
    }
}

// ── Assignability ──

fn int_rank(e: ElementaryType) -> Option<u32> {
    if e.is_integer() {
        e.bits()
    } else {
        None
    }
}

fn elementary_assignable(to: ElementaryType, from: ElementaryType) -> bool {
    use ElementaryType::*;
    if to == from {
        return true;
    }
    // Integer widening within a signedness, and unsigned into strictly wider signed.
    if from.is_signed_int() && to.is_signed_int() {
        return int_rank(from) < int_rank(to);
    }
    if from.is_unsigned_int() && to.is_unsigned_int() {
        return int_rank(from) < int_rank(to);
    }
    if from.is_unsigned_int() && to.is_signed_int() {
        return int_rank(from) < int_rank(to);
    }
    // Any integer widens into either float; REAL widens into LREAL.
    if from.is_integer() && to.is_float() {
        return true;
    }
    if from == Real && to == LReal {
        return true;
    }
    // Bit-string widening.
    if from.is_bit_string() && to.is_bit_string() {
        return from.bits() < to.bits();
    }
    // Short duration into long.
    if from == Time && to == LTime {
        return true;
    }
    if from == Char && to == WChar {
        return true;
    }
    false
}

/// Implicit assignment compatibility: widening only. Narrowing requires an
/// explicit conversion call.
pub fn assignable(to: &Type, from: &Type) -> bool {
    match (to, from) {
        (Type::Elementary(t), Type::Elementary(f)) => elementary_assignable(*t, *f),
        (Type::String { max_len: t }, Type::String { max_len: f }) => f <= t,
        (Type::WString { max_len: t }, Type::WString { max_len: f }) => f <= t,
        (
            Type::Array {
                element: te,
                dims: td,
            },
            Type::Array {
                element: fe,
                dims: fd,
            },
        ) => td == fd && te == fe,
        (Type::Pointer(t), Type::Pointer(f)) => t == f,
        (Type::Reference(t), Type::Reference(f)) => t == f,
        (Type::Struct(t), Type::Struct(f)) => t == f,
        (Type::Enum(t), Type::Enum(f)) => t == f,
        (Type::Fb(t), Type::Fb(f)) => t == f,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widening_accepted() {
        assert!(assignable(&Type::LINT, &Type::DINT));
        assert!(assignable(&Type::DINT, &Type::INT));
        assert!(assignable(&Type::LREAL, &Type::REAL));
        assert!(assignable(&Type::REAL, &Type::DINT));
        assert!(assignable(
            &Type::Elementary(ElementaryType::LTime),
            &Type::TIME
        ));
        assert!(assignable(
            &Type::Elementary(ElementaryType::DInt),
            &Type::Elementary(ElementaryType::UInt)
        ));
        assert!(assignable(
            &Type::Elementary(ElementaryType::Word),
            &Type::Elementary(ElementaryType::Byte)
        ));
    }

    #[test]
    fn narrowing_rejected() {
        assert!(!assignable(&Type::INT, &Type::DINT));
        assert!(!assignable(&Type::DINT, &Type::REAL));
        assert!(!assignable(&Type::REAL, &Type::LREAL));
        assert!(!assignable(
            &Type::Elementary(ElementaryType::UInt),
            &Type::Elementary(ElementaryType::Int)
        ));
        assert!(!assignable(
            &Type::TIME,
            &Type::Elementary(ElementaryType::LTime)
        ));
    }

    #[test]
    fn bool_context_is_exact() {
        assert!(!assignable(&Type::BOOL, &Type::INT));
        assert!(!assignable(
            &Type::BOOL,
            &Type::Elementary(ElementaryType::Byte)
        ));
        assert!(assignable(&Type::BOOL, &Type::BOOL));
    }

    #[test]
    fn one_element_dimension_accepted() {
        let d = Dimension::new(3, 3).unwrap();
        assert_eq!(d.len(), 1);
    }

    #[test]
    fn inverted_dimension_rejected() {
        assert_eq!(
            Dimension::new(4, 2),
            Err(TypeError::EmptyDimension { lo: 4, hi: 2 })
        );
    }

    #[test]
    fn enum_validation() {
        let e = EnumType {
            name: "Mode".into(),
            variants: vec![
                EnumVariant {
                    name: "IDLE".into(),
                    value: 0,
                },
                EnumVariant {
                    name: "RUN".into(),
                    value: 1,
                },
            ],
        };
        assert!(e.validate().is_ok());

        let dup = EnumType {
            name: "Mode".into(),
            variants: vec![
                EnumVariant {
                    name: "IDLE".into(),
                    value: 0,
                },
                EnumVariant {
                    name: "RUN".into(),
                    value: 0,
                },
            ],
        };
        assert!(matches!(
            dup.validate(),
            Err(TypeError::DuplicateVariantValue { .. })
        ));
    }
}
