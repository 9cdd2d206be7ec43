//! Signatures of the IEC standard function blocks the compiler can
//! synthesize and the simulator implements natively.

use crate::types::{ElementaryType, Type};
use serde::{Deserialize, Serialize};

const BOOL: Type = Type::Elementary(ElementaryType::Bool);
const TIME: Type = Type::Elementary(ElementaryType::Time);
const INT: Type = Type::Elementary(ElementaryType::Int);

static TIMER_INPUTS: [(&str, Type); 2] = [("IN", BOOL), ("PT", TIME)];
static TIMER_OUTPUTS: [(&str, Type); 2] = [("Q", BOOL), ("ET", TIME)];
static TRIG_INPUTS: [(&str, Type); 1] = [("CLK", BOOL)];
static TRIG_OUTPUTS: [(&str, Type); 1] = [("Q", BOOL)];
static CTU_INPUTS: [(&str, Type); 3] = [("CU", BOOL), ("R", BOOL), ("PV", INT)];
static CTD_INPUTS: [(&str, Type); 3] = [("CD", BOOL), ("LD", BOOL), ("PV", INT)];
static COUNTER_OUTPUTS: [(&str, Type); 2] = [("Q", BOOL), ("CV", INT)];

/// A standard function block kind.
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
pub enum StdFb {
    #[strum(serialize = "TON")]
    Ton,
    #[strum(serialize = "TOF")]
    Tof,
    #[strum(serialize = "TP")]
    Tp,
    #[strum(serialize = "R_TRIG")]
    RTrig,
    #[strum(serialize = "F_TRIG")]
    FTrig,
    #[strum(serialize = "CTU")]
    Ctu,
    #[strum(serialize = "CTD")]
    Ctd,
}

impl StdFb {
    pub fn from_type_name(name: &str) -> Option<StdFb> {
        name.parse().ok()
    }

    /// Named input pins and their types.
    pub fn inputs(&self) -> &'static [(&'static str, Type)] {
        match self {
            StdFb::Ton | StdFb::Tof | StdFb::Tp => &TIMER_INPUTS,
            StdFb::RTrig | StdFb::FTrig => &TRIG_INPUTS,
            StdFb::Ctu => &CTU_INPUTS,
            StdFb::Ctd => &CTD_INPUTS,
        }
    }

    /// Named output pins and their types.
    pub fn outputs(&self) -> &'static [(&'static str, Type)] {
        match self {
            StdFb::Ton | StdFb::Tof | StdFb::Tp => &TIMER_OUTPUTS,
            StdFb::RTrig | StdFb::FTrig => &TRIG_OUTPUTS,
            StdFb::Ctu | StdFb::Ctd => &COUNTER_OUTPUTS,
        }
    }

    pub fn input(&self, name: &str) -> Option<&'static Type> {
        self.inputs()
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, t)| t)
    }

    pub fn output(&self, name: &str) -> Option<&'static Type> {
        self.outputs()
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, t)| t)
    }

    /// Prefix used for synthesized instance names (`__ton_0`, ...).
    pub fn instance_prefix(&self) -> &'static str {
        match self {
            StdFb::Ton => "__ton",
            StdFb::Tof => "__tof",
            StdFb::Tp => "__tp",
            StdFb::RTrig => "__rtrig",
            StdFb::FTrig => "__ftrig",
            StdFb::Ctu => "__ctu",
            StdFb::Ctd => "__ctd",
        }
    }
}
