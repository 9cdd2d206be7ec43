//! The persisted, versioned form of a project IR.

use crate::project::Project;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Current document format version. Bumped on any breaking IR change.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("unsupported project document version {found} (expected {FORMAT_VERSION})")]
    Version { found: u32 },
    #[error("malformed project document: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Self-describing wrapper around a serialized project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectDocument {
    pub format_version: u32,
    pub project: Project,
}

impl ProjectDocument {
    pub fn new(project: Project) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            project,
        }
    }

    pub fn to_json(&self) -> Result<String, DocumentError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self, DocumentError> {
        let doc: ProjectDocument = serde_json::from_str(text)?;
        if doc.format_version != FORMAT_VERSION {
            return Err(DocumentError::Version {
                found: doc.format_version,
            });
        }
        Ok(doc)
    }
}
