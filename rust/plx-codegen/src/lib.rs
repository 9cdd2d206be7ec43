//! plx Codegen
//!
//! Vendor lowering contracts: target capability descriptors, project
//! preparation (inheritance flattening where the target lacks EXTENDS),
//! a structured-text renderer for IR bodies, and skeletal emitters for
//! the three vendor document formats.

pub mod l5x;
pub mod simatic;
pub mod st;
pub mod tcpou;

use plx_compiler::{flatten_project, CompileError, CompileErrors, ErrorKind};
use plx_core::project::Project;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum VendorTarget {
    #[strum(serialize = "L5X")]
    RockwellL5x,
    #[strum(serialize = "SimaticML")]
    SiemensSimaticMl,
    #[strum(serialize = "TwinCAT")]
    BeckhoffTwinCat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetCapabilities {
    /// Whether the target accepts function-block inheritance natively.
    pub supports_extends: bool,
    /// Whether the target accepts chart-bodied POUs from this emitter.
    pub supports_sfc: bool,
    pub file_extension: &'static str,
}

impl VendorTarget {
    pub fn capabilities(&self) -> TargetCapabilities {
        match self {
            VendorTarget::RockwellL5x => TargetCapabilities {
                supports_extends: false,
                supports_sfc: false,
                file_extension: "L5X",
            },
            VendorTarget::SiemensSimaticMl => TargetCapabilities {
                supports_extends: false,
                supports_sfc: false,
                file_extension: "xml",
            },
            VendorTarget::BeckhoffTwinCat => TargetCapabilities {
                supports_extends: true,
                supports_sfc: false,
                file_extension: "TcPOU",
            },
        }
    }
}

/// One emitted vendor file.
#[derive(Debug, Clone, PartialEq)]
pub struct VendorDocument {
    pub file_name: String,
    pub xml: String,
}

/// Contract every vendor back-end implements over a validated project.
pub trait VendorEmitter {
    fn target(&self) -> VendorTarget;

    /// Emit documents for a project already prepared for this target.
    /// Behavioral constructs the format cannot carry are rejected, never
    /// silently dropped.
    fn emit(&self, project: &Project) -> Result<Vec<VendorDocument>, CompileErrors>;
}

/// Apply the target-mandated IR passes: inheritance flattening for
/// targets without EXTENDS.
pub fn prepare_for_target(
    project: &Project,
    target: VendorTarget,
) -> Result<Project, CompileErrors> {
    if target.capabilities().supports_extends {
        Ok(project.clone())
    } else {
        flatten_project(project)
    }
}

pub fn emitter_for(target: VendorTarget) -> Box<dyn VendorEmitter> {
    match target {
        VendorTarget::RockwellL5x => Box::new(l5x::L5xEmitter),
        VendorTarget::SiemensSimaticMl => Box::new(simatic::SimaticEmitter),
        VendorTarget::BeckhoffTwinCat => Box::new(tcpou::TcPouEmitter),
    }
}

pub(crate) fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}

pub(crate) fn unsupported(target: VendorTarget, what: impl std::fmt::Display) -> CompileErrors {
    CompileError::new(
        ErrorKind::SyntaxUnsupported,
        format!("{} cannot represent {}", target, what),
    )
    .into()
}
