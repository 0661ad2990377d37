use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A processing tool the service offers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub id: String,
    pub name: String,
}

impl ToolSpec {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCatalog {
    tools: Vec<ToolSpec>,
}

impl Default for ToolCatalog {
    fn default() -> Self {
        Self::new(default_tools())
    }
}

pub fn default_tools() -> Vec<ToolSpec> {
    vec![
        ToolSpec::new("segmentation", "Segmentation"),
        ToolSpec::new("denoise", "Denoising"),
        ToolSpec::new("skull_strip", "Skull Stripping"),
        ToolSpec::new("registration", "Registration"),
    ]
}

impl ToolCatalog {
    pub fn new(tools: Vec<ToolSpec>) -> Self {
        Self { tools }
    }

    /// Resolves the tool the user picked, treating a blank id as no choice.
    pub fn resolve(&self, tool_id: Option<&str>) -> Result<&ToolSpec, ValidationError> {
        let tool_id = tool_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or(ValidationError::NoToolSelected)?;
        self.tools
            .iter()
            .find(|tool| tool.id == tool_id)
            .ok_or_else(|| ValidationError::UnknownTool(tool_id.to_string()))
    }

    pub fn tools(&self) -> &[ToolSpec] {
        &self.tools
    }
}
