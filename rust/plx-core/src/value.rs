//! Runtime and compile-time constant values, one variant per IEC type kind.

use crate::time::IecDuration;
use crate::types::{ElementaryType, Type, TypeTable};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValueError {
    #[error("unknown user type '{0}'")]
    UnknownType(String),
    #[error("no default value for type {0}")]
    NoDefault(String),
}

/// A typed value. Every IR literal and every simulator slot holds one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    SInt(i8),
    Int(i16),
    DInt(i32),
    LInt(i64),
    USInt(u8),
    UInt(u16),
    UDInt(u32),
    ULInt(u64),
    Real(f32),
    LReal(f64),
    Byte(u8),
    Word(u16),
    DWord(u32),
    LWord(u64),
    Time(IecDuration),
    LTime(IecDuration),
    Date(NaiveDate),
    TimeOfDay(NaiveTime),
    DateTime(NaiveDateTime),
    Char(u8),
    WChar(char),
    String(String),
    WString(String),
    Array(Vec<Value>),
    /// Struct values keep field order; names mirror the declaring type.
    Struct(Vec<(String, Value)>),
    Enum {
        type_name: String,
        variant: String,
        value: i64,
    },
}

impl Value {
    pub fn elementary_type(&self) -> Option<ElementaryType> {
        use ElementaryType as E;
        match self {
            Value::Bool(_) => Some(E::Bool),
            Value::SInt(_) => Some(E::SInt),
            Value::Int(_) => Some(E::Int),
            Value::DInt(_) => Some(E::DInt),
            Value::LInt(_) => Some(E::LInt),
            Value::USInt(_) => Some(E::USInt),
            Value::UInt(_) => Some(E::UInt),
            Value::UDInt(_) => Some(E::UDInt),
            Value::ULInt(_) => Some(E::ULInt),
            Value::Real(_) => Some(E::Real),
            Value::LReal(_) => Some(E::LReal),
            Value::Byte(_) => Some(E::Byte),
            Value::Word(_) => Some(E::Word),
            Value::DWord(_) => Some(E::DWord),
            Value::LWord(_) => Some(E::LWord),
            Value::Time(_) => Some(E::Time),
            Value::LTime(_) => Some(E::LTime),
            Value::Date(_) => Some(E::Date),
            Value::TimeOfDay(_) => Some(E::TimeOfDay),
            Value::DateTime(_) => Some(E::DateTime),
            Value::Char(_) => Some(E::Char),
            Value::WChar(_) => Some(E::WChar),
            _ => None,
        }
    }

    /// The type this value inhabits, where it can be named without a table.
    pub fn ty(&self) -> Option<Type> {
        match self {
            Value::String(s) => Some(Type::String {
                max_len: s.len() as u32,
            }),
            Value::WString(s) => Some(Type::WString {
                max_len: s.chars().count() as u32,
            }),
            Value::Enum { type_name, .. } => Some(Type::Enum(type_name.clone())),
            Value::Array(_) | Value::Struct(_) => None,
            other => other.elementary_type().map(Type::Elementary),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer view of integer, bit-string, char, and enum values.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::SInt(v) => Some(*v as i64),
            Value::Int(v) => Some(*v as i64),
            Value::DInt(v) => Some(*v as i64),
            Value::LInt(v) => Some(*v),
            Value::USInt(v) => Some(*v as i64),
            Value::UInt(v) => Some(*v as i64),
            Value::UDInt(v) => Some(*v as i64),
            Value::ULInt(v) => i64::try_from(*v).ok(),
            Value::Byte(v) => Some(*v as i64),
            Value::Word(v) => Some(*v as i64),
            Value::DWord(v) => Some(*v as i64),
            Value::LWord(v) => i64::try_from(*v).ok(),
            Value::Char(v) => Some(*v as i64),
            Value::Enum { value, .. } => Some(*value),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Real(v) => Some(*v as f64),
            Value::LReal(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_duration(&self) -> Option<IecDuration> {
        match self {
            Value::Time(d) | Value::LTime(d) => Some(*d),
            _ => None,
        }
    }

    pub fn is_integer(&self) -> bool {
        self.elementary_type().is_some_and(|e| e.is_integer())
    }

    pub fn is_float(&self) -> bool {
        self.elementary_type().is_some_and(|e| e.is_float())
    }

    /// Build an integer value of the given elementary type, if `v` fits.
    pub fn int_of(e: ElementaryType, v: i128) -> Option<Value> {
        let (lo, hi) = e.int_range()?;
        if v < lo || v > hi {
            return None;
        }
        Some(match e {
            ElementaryType::SInt => Value::SInt(v as i8),
            ElementaryType::Int => Value::Int(v as i16),
            ElementaryType::DInt => Value::DInt(v as i32),
            ElementaryType::LInt => Value::LInt(v as i64),
            ElementaryType::USInt => Value::USInt(v as u8),
            ElementaryType::UInt => Value::UInt(v as u16),
            ElementaryType::UDInt => Value::UDInt(v as u32),
            ElementaryType::ULInt => Value::ULInt(v as u64),
            _ => unreachable!("int_range is Some only for integer types"),
        })
    }

    /// The declared-initial default: zero / false / empty.
    pub fn default_for(ty: &Type, table: &TypeTable<'_>) -> Result<Value, ValueError> {
        use ElementaryType as E;
        Ok(match ty {
            Type::Elementary(e) => match e {
                E::Bool => Value::Bool(false),
                E::SInt => Value::SInt(0),
                E::Int => Value::Int(0),
                E::DInt => Value::DInt(0),
                E::LInt => Value::LInt(0),
                E::USInt => Value::USInt(0),
                E::UInt => Value::UInt(0),
                E::UDInt => Value::UDInt(0),
                E::ULInt => Value::ULInt(0),
                E::Real => Value::Real(0.0),
                E::LReal => Value::LReal(0.0),
                E::Byte => Value::Byte(0),
                E::Word => Value::Word(0),
                E::DWord => Value::DWord(0),
                E::LWord => Value::LWord(0),
                E::Time => Value::Time(IecDuration::ZERO),
                E::LTime => Value::LTime(IecDuration::ZERO),
                E::Date => Value::Date(NaiveDate::default()),
                E::TimeOfDay => Value::TimeOfDay(NaiveTime::MIN),
                E::DateTime => Value::DateTime(NaiveDateTime::default()),
                E::Char => Value::Char(0),
                E::WChar => Value::WChar('\0'),
            },
            Type::String { .. } => Value::String(String::new()),
            Type::WString { .. } => Value::WString(String::new()),
            Type::Array { element, dims } => {
                let len: usize = dims.iter().map(|d| d.len()).product();
                let elem = Value::default_for(element, table)?;
                Value::Array(vec![elem; len])
            }
            // Pointers and references default to the null address.
            Type::Pointer(_) | Type::Reference(_) => Value::LWord(0),
            Type::Struct(name) => {
                let def = table
                    .structure(name)
                    .ok_or_else(|| ValueError::UnknownType(name.clone()))?;
                let mut fields = Vec::with_capacity(def.fields.len());
                for fd in &def.fields {
                    let v = match &fd.default {
                        Some(v) => v.clone(),
                        None => Value::default_for(&fd.ty, table)?,
                    };
                    fields.push((fd.name.clone(), v));
                }
                Value::Struct(fields)
            }
            Type::Enum(name) => {
                let def = table
                    .enumeration(name)
                    .ok_or_else(|| ValueError::UnknownType(name.clone()))?;
                let variant = def
                    .default_variant()
                    .ok_or_else(|| ValueError::NoDefault(name.clone()))?;
                Value::Enum {
                    type_name: name.clone(),
                    variant: variant.name.clone(),
                    value: variant.value,
                }
            }
            Type::Fb(name) => return Err(ValueError::NoDefault(name.clone())),
        })
    }

    /// Implicit coercion into `ty`: identity, widening, and range-fit for
    /// integer constants. Returns `None` when the coercion would narrow.
    pub fn coerce_to(&self, ty: &Type) -> Option<Value> {
        if self.ty().as_ref() == Some(ty) {
            return Some(self.clone());
        }
        let target = match ty {
            Type::Elementary(e) => *e,
            Type::String { max_len } => {
                if let Value::String(s) = self {
                    return (s.len() as u32 <= *max_len).then(|| self.clone());
                }
                return None;
            }
            Type::WString { max_len } => {
                if let Value::WString(s) = self {
                    return (s.chars().count() as u32 <= *max_len).then(|| self.clone());
                }
                return None;
            }
            Type::Enum(name) => {
                if let Value::Enum { type_name, .. } = self {
                    return (type_name == name).then(|| self.clone());
                }
                return None;
            }
            _ => return None,
        };
        use ElementaryType as E;
        match (self, target) {
            (Value::Bool(_), E::Bool) => Some(self.clone()),
            (v, t) if t.is_integer() && v.is_integer() => {
                Value::int_of(t, v.as_int()? as i128)
            }
            (v, E::Real) if v.is_integer() => Some(Value::Real(v.as_int()? as f32)),
            (v, E::LReal) if v.is_integer() => Some(Value::LReal(v.as_int()? as f64)),
            (Value::Real(v), E::LReal) => Some(Value::LReal(*v as f64)),
            (Value::Byte(v), E::Word) => Some(Value::Word(*v as u16)),
            (Value::Byte(v), E::DWord) => Some(Value::DWord(*v as u32)),
            (Value::Byte(v), E::LWord) => Some(Value::LWord(*v as u64)),
            (Value::Word(v), E::DWord) => Some(Value::DWord(*v as u32)),
            (Value::Word(v), E::LWord) => Some(Value::LWord(*v as u64)),
            (Value::DWord(v), E::LWord) => Some(Value::LWord(*v as u64)),
            (Value::Time(d), E::LTime) => Some(Value::LTime(*d)),
            (Value::Char(c), E::WChar) => Some(Value::WChar(*c as char)),
            _ => None,
        }
    }

    /// Explicit conversion into an elementary type; the sanctioned narrowing
    /// path. Integer overflow wraps; float to integer truncates toward zero
    /// with saturation at the bounds.
    pub fn convert_to(&self, target: ElementaryType) -> Option<Value> {
        use ElementaryType as E;
        let via_i64 = |v: i64| -> Option<Value> {
            Some(match target {
                E::SInt => Value::SInt(v as i8),
                E::Int => Value::Int(v as i16),
                E::DInt => Value::DInt(v as i32),
                E::LInt => Value::LInt(v),
                E::USInt => Value::USInt(v as u8),
                E::UInt => Value::UInt(v as u16),
                E::UDInt => Value::UDInt(v as u32),
                E::ULInt => Value::ULInt(v as u64),
                E::Byte => Value::Byte(v as u8),
                E::Word => Value::Word(v as u16),
                E::DWord => Value::DWord(v as u32),
                E::LWord => Value::LWord(v as u64),
                E::Real => Value::Real(v as f32),
                E::LReal => Value::LReal(v as f64),
                _ => return None,
            })
        };
        match self {
            v if v.is_integer() => via_i64(v.as_int()?),
            Value::Byte(_) | Value::Word(_) | Value::DWord(_) | Value::LWord(_) => {
                via_i64(self.as_int()?)
            }
            Value::Real(f) => match target {
                E::Real => Some(Value::Real(*f)),
                E::LReal => Some(Value::LReal(*f as f64)),
                _ => via_i64(*f as i64),
            },
            Value::LReal(f) => match target {
                E::Real => Some(Value::Real(*f as f32)),
                E::LReal => Some(Value::LReal(*f)),
                _ => via_i64(*f as i64),
            },
            Value::Enum { value, .. } => via_i64(*value),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    /// Literal rendering in structured-text form.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            Value::SInt(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::DInt(v) => write!(f, "{}", v),
            Value::LInt(v) => write!(f, "{}", v),
            Value::USInt(v) => write!(f, "{}", v),
            Value::UInt(v) => write!(f, "{}", v),
            Value::UDInt(v) => write!(f, "{}", v),
            Value::ULInt(v) => write!(f, "{}", v),
            Value::Real(v) => write!(f, "{:?}", v),
            Value::LReal(v) => write!(f, "{:?}", v),
            Value::Byte(v) => write!(f, "16#{:02X}", v),
            Value::Word(v) => write!(f, "16#{:04X}", v),
            Value::DWord(v) => write!(f, "16#{:08X}", v),
            Value::LWord(v) => write!(f, "16#{:016X}", v),
            Value::Time(d) => write!(f, "{}", d),
            Value::LTime(d) => write!(f, "L{}", d),
            Value::Date(d) => write!(f, "D#{}", d),
            Value::TimeOfDay(t) => write!(f, "TOD#{}", t),
            Value::DateTime(dt) => write!(f, "DT#{}", dt),
            Value::Char(c) => write!(f, "'{}'", *c as char),
            Value::WChar(c) => write!(f, "\"{}\"", c),
            Value::String(s) => write!(f, "'{}'", s),
            Value::WString(s) => write!(f, "\"{}\"", s),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
            Value::Struct(fields) => {
                write!(f, "(")?;
                for (i, (name, v)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} := {}", name, v)?;
                }
                write!(f, ")")
            }
            Value::Enum {
                type_name, variant, ..
            } => write!(f, "{}#{}", type_name, variant),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Dimension;

    #[test]
    fn defaults_are_zero() {
        let table = TypeTable::empty();
        assert_eq!(
            Value::default_for(&Type::BOOL, &table).unwrap(),
            Value::Bool(false)
        );
        assert_eq!(
            Value::default_for(&Type::TIME, &table).unwrap(),
            Value::Time(IecDuration::ZERO)
        );
        let arr = Type::array(Type::INT, vec![Dimension::new(1, 3).unwrap()]);
        assert_eq!(
            Value::default_for(&arr, &table).unwrap(),
            Value::Array(vec![Value::Int(0); 3])
        );
    }

    #[test]
    fn literal_fit_coercion() {
        assert_eq!(Value::DInt(5).coerce_to(&Type::INT), Some(Value::Int(5)));
        assert_eq!(Value::DInt(70_000).coerce_to(&Type::INT), None);
        assert_eq!(
            Value::Int(5).coerce_to(&Type::LINT),
            Some(Value::LInt(5))
        );
    }

    #[test]
    fn float_to_int_requires_conversion() {
        assert_eq!(Value::Real(1.5).coerce_to(&Type::DINT), None);
        assert_eq!(
            Value::Real(1.9).convert_to(ElementaryType::DInt),
            Some(Value::DInt(1))
        );
    }

    #[test]
    fn display_forms() {
        assert_eq!(Value::Bool(true).to_string(), "TRUE");
        assert_eq!(Value::Byte(0xAB).to_string(), "16#AB");
        assert_eq!(
            Value::Enum {
                type_name: "Mode".into(),
                variant: "IDLE".into(),
                value: 0
            }
            .to_string(),
            "Mode#IDLE"
        );
    }
}
