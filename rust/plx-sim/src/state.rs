//! Per-instance simulator state: variable slots, nested function-block
//! instances, and initialization from declared initial values.

use crate::fb::StdFbState;
use plx_core::pou::{BlockRole, Pou, PouKind, VarDecl};
use plx_core::project::Project;
use plx_core::stdfb::StdFb;
use plx_core::types::{Dimension, Type, TypeTable};
use plx_core::value::Value;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("unknown type '{0}'")]
    UnknownType(String),
    #[error("unknown function block '{0}'")]
    UnknownFb(String),
    #[error("POU '{0}' not found")]
    UnknownPou(String),
    #[error("'{0}' is not an input")]
    NotAnInput(String),
    #[error("unknown variable '{0}'")]
    UnknownVariable(String),
    #[error("{value} is not assignable to {ty}")]
    Incompatible { value: String, ty: String },
    #[error("initial value of '{0}' does not fit its declared type")]
    BadInitial(String),
    #[error("synthesized instance '{0}' collides across the inheritance chain; flatten before simulating")]
    SynthesizedCollision(String),
    #[error("'{0}' is declared more than once across the inheritance chain")]
    DuplicateVariable(String),
    #[error(transparent)]
    Clock(#[from] crate::clock::NonMonotonicTick),
}

/// Immutable compile artifacts the simulator resolves against.
pub struct SimCtx<'a> {
    pub types: TypeTable<'a>,
    pub pous: HashMap<&'a str, &'a Pou>,
}

impl<'a> SimCtx<'a> {
    pub fn empty() -> Self {
        Self {
            types: TypeTable::empty(),
            pous: HashMap::new(),
        }
    }

    pub fn from_project(project: &'a Project) -> Self {
        Self {
            types: project.type_table(),
            pous: project
                .pous
                .iter()
                .map(|p| (p.name.as_str(), p))
                .collect(),
        }
    }

    pub fn new(types: TypeTable<'a>, pous: impl IntoIterator<Item = &'a Pou>) -> Self {
        Self {
            types,
            pous: pous.into_iter().map(|p| (p.name.as_str(), p)).collect(),
        }
    }

    pub fn pou(&self, name: &str) -> Option<&'a Pou> {
        self.pous.get(name).copied()
    }
}

/// One storage cell. Scalars hold values directly; composites mirror the
/// declared shape so subscripts and field accesses navigate structurally.
#[derive(Debug, Clone)]
pub enum Slot {
    Value(Value),
    Array { dims: Vec<Dimension>, elems: Vec<Slot> },
    Struct(Vec<(String, Slot)>),
    Std(StdFbState),
    Instance(Box<UserInstance>),
}

impl Slot {
    /// Reassemble a plain value from this slot, where one exists.
    pub fn to_value(&self) -> Option<Value> {
        match self {
            Slot::Value(v) => Some(v.clone()),
            Slot::Array { elems, .. } => {
                let values: Option<Vec<Value>> = elems.iter().map(Slot::to_value).collect();
                values.map(Value::Array)
            }
            Slot::Struct(fields) => {
                let values: Option<Vec<(String, Value)>> = fields
                    .iter()
                    .map(|(n, s)| s.to_value().map(|v| (n.clone(), v)))
                    .collect();
                values.map(Value::Struct)
            }
            Slot::Std(_) | Slot::Instance(_) => None,
        }
    }
}

/// Runtime state of one POU instance.
#[derive(Debug, Clone)]
pub struct UserInstance {
    pub type_name: String,
    pub vars: Vec<(String, BlockRole, Slot)>,
    /// Active SFC step, for chart-bodied POUs. `None` until the first scan.
    pub active_step: Option<String>,
}

/// The inheritance chain of a POU, root ancestor first, ending with the
/// POU itself. Missing ancestors and cycles end the walk; project
/// assembly reports those as compile errors.
pub fn ancestry<'p>(pou: &'p Pou, ctx: &SimCtx<'p>) -> Vec<&'p Pou> {
    let mut chain = vec![pou];
    let mut seen: Vec<&str> = vec![pou.name.as_str()];
    let mut cursor = pou.parent.as_deref();
    while let Some(name) = cursor {
        if seen.contains(&name) {
            break;
        }
        let Some(parent) = ctx.pou(name) else { break };
        seen.push(name);
        chain.push(parent);
        cursor = parent.parent.as_deref();
    }
    chain.reverse();
    chain
}

impl UserInstance {
    /// Materialize an instance with the declarations of the whole
    /// inheritance chain, ancestors first, so an unflattened parent body
    /// executes against the same storage.
    pub fn instantiate(pou: &Pou, ctx: &SimCtx<'_>) -> Result<Self, SimError> {
        let mut vars: Vec<(String, BlockRole, Slot)> = Vec::new();
        for ancestor in ancestry(pou, ctx) {
            for (role, decl) in ancestor.vars() {
                if vars.iter().any(|(n, _, _)| n == &decl.name) {
                    if decl.name.starts_with("__") {
                        return Err(SimError::SynthesizedCollision(decl.name.clone()));
                    }
                    return Err(SimError::DuplicateVariable(decl.name.clone()));
                }
                vars.push((decl.name.clone(), role, slot_for(decl, ctx)?));
            }
        }
        Ok(Self {
            type_name: pou.name.clone(),
            vars,
            active_step: None,
        })
    }

    pub fn slot(&self, name: &str) -> Option<&Slot> {
        self.vars
            .iter()
            .find(|(n, _, _)| n == name)
            .map(|(_, _, s)| s)
    }

    pub fn slot_mut(&mut self, name: &str) -> Option<&mut Slot> {
        self.vars
            .iter_mut()
            .find(|(n, _, _)| n == name)
            .map(|(_, _, s)| s)
    }

    pub fn role(&self, name: &str) -> Option<BlockRole> {
        self.vars
            .iter()
            .find(|(n, _, _)| n == name)
            .map(|(_, role, _)| *role)
    }

    /// Re-initialize temp variables, as happens at each scan start.
    pub fn reset_temps(&mut self, pou: &Pou, ctx: &SimCtx<'_>) -> Result<(), SimError> {
        for ancestor in ancestry(pou, ctx) {
            for (role, decl) in ancestor.vars() {
                if role == BlockRole::Temp {
                    if let Some(slot) = self.slot_mut(&decl.name) {
                        *slot = slot_for(decl, ctx)?;
                    }
                }
            }
        }
        Ok(())
    }
}

fn slot_for(decl: &VarDecl, ctx: &SimCtx<'_>) -> Result<Slot, SimError> {
    slot_of_type(&decl.ty, decl.initial.as_ref(), ctx)
        .ok_or_else(|| SimError::BadInitial(decl.name.clone()))
}

fn slot_of_type(ty: &Type, initial: Option<&Value>, ctx: &SimCtx<'_>) -> Option<Slot> {
    match ty {
        Type::Fb(name) => {
            if let Some(std) = StdFb::from_type_name(name) {
                return Some(Slot::Std(StdFbState::new(std)));
            }
            let pou = ctx.pou(name)?;
            if !matches!(pou.kind, PouKind::FunctionBlock) {
                return None;
            }
            let instance = UserInstance::instantiate(pou, ctx).ok()?;
            Some(Slot::Instance(Box::new(instance)))
        }
        Type::Array { element, dims } => {
            let len: usize = dims.iter().map(|d| d.len()).product();
            let elems: Option<Vec<Slot>> = match initial {
                Some(Value::Array(values)) if values.len() == len => values
                    .iter()
                    .map(|v| slot_of_type(element, Some(v), ctx))
                    .collect(),
                Some(_) => None,
                None => (0..len).map(|_| slot_of_type(element, None, ctx)).collect(),
            };
            Some(Slot::Array {
                dims: dims.clone(),
                elems: elems?,
            })
        }
        Type::Struct(name) => {
            let def = ctx.types.structure(name)?;
            let initial_fields: Option<&Vec<(String, Value)>> = match initial {
                Some(Value::Struct(fields)) => Some(fields),
                Some(_) => return None,
                None => None,
            };
            let mut fields = Vec::with_capacity(def.fields.len());
            for fd in &def.fields {
                let given = initial_fields
                    .and_then(|fs| fs.iter().find(|(n, _)| n == &fd.name))
                    .map(|(_, v)| v)
                    .or(fd.default.as_ref());
                fields.push((fd.name.clone(), slot_of_type(&fd.ty, given, ctx)?));
            }
            Some(Slot::Struct(fields))
        }
        _ => {
            let value = match initial {
                Some(v) => v.coerce_to(ty).or_else(|| {
                    // String capacities live on the declared type, not the
                    // literal; accept in-range string initials directly.
                    match (ty, v) {
                        (Type::String { max_len }, Value::String(s))
                            if s.len() as u32 <= *max_len =>
                        {
                            Some(v.clone())
                        }
                        (Type::WString { max_len }, Value::WString(s))
                            if s.chars().count() as u32 <= *max_len =>
                        {
                            Some(v.clone())
                        }
                        _ => None,
                    }
                })?,
                None => Value::default_for(ty, &ctx.types).ok()?,
            };
            Some(Slot::Value(value))
        }
    }
}

/// Store a value into a slot, coercing to the slot's existing shape.
pub fn store(slot: &mut Slot, value: Value) -> Result<(), crate::eval::FaultKind> {
    use crate::eval::FaultKind;
    match slot {
        Slot::Value(existing) => {
            let coerced = match existing {
                Value::String(_) => match value {
                    Value::String(_) => Some(value),
                    _ => None,
                },
                Value::WString(_) => match value {
                    Value::WString(_) => Some(value),
                    _ => None,
                },
                _ => existing
                    .ty()
                    .and_then(|ty| value.coerce_to(&ty))
                    .or_else(|| {
                        // Float slots accept any numeric value; the compiler
                        // has already vetted the assignment.
                        existing
                            .elementary_type()
                            .filter(|e| e.is_float())
                            .and_then(|e| value.convert_to(e))
                    }),
            };
            match coerced {
                Some(v) => {
                    *existing = v;
                    Ok(())
                }
                None => Err(FaultKind::TypeConfusion),
            }
        }
        Slot::Array { elems, .. } => match value {
            Value::Array(values) if values.len() == elems.len() => {
                for (slot, v) in elems.iter_mut().zip(values) {
                    store(slot, v)?;
                }
                Ok(())
            }
            _ => Err(FaultKind::TypeConfusion),
        },
        Slot::Struct(fields) => match value {
            Value::Struct(values) => {
                for (name, v) in values {
                    let Some((_, slot)) = fields.iter_mut().find(|(n, _)| *n == name) else {
                        return Err(FaultKind::TypeConfusion);
                    };
                    store(slot, v)?;
                }
                Ok(())
            }
            _ => Err(FaultKind::TypeConfusion),
        },
        Slot::Std(_) | Slot::Instance(_) => Err(FaultKind::TypeConfusion),
    }
}
