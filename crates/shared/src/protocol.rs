use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Per-volume entry of a document snapshot.
///
/// Only the fields the session reasons about are typed; everything else the
/// renderer writes (colormaps, calibration, ...) rides along in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ImageOptions {
    /// Matches by id when the entry carries one, otherwise by name.
    pub fn refers_to(&self, id: &str, name: &str) -> bool {
        match &self.id {
            Some(own) => own == id,
            None => self.name.as_deref() == Some(name),
        }
    }
}

/// Serialized renderer state: the submitted payload of a job and the shape of
/// the scene the processing service returns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    #[serde(rename = "imageOptionsArray", default)]
    pub image_options_array: Vec<ImageOptions>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DocumentSnapshot {
    pub fn new(image_options_array: Vec<ImageOptions>) -> Self {
        Self {
            image_options_array,
            extra: Map::new(),
        }
    }

    pub fn from_json_str(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    pub fn volume_count(&self) -> usize {
        self.image_options_array.len()
    }

    pub fn has_volumes(&self) -> bool {
        !self.image_options_array.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    #[default]
    Axial,
    Coronal,
    Sagittal,
    Multi,
    Render,
}

impl ViewMode {
    pub const ALL: [ViewMode; 5] = [
        ViewMode::Axial,
        ViewMode::Coronal,
        ViewMode::Sagittal,
        ViewMode::Multi,
        ViewMode::Render,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ViewMode::Axial => "axial",
            ViewMode::Coronal => "coronal",
            ViewMode::Sagittal => "sagittal",
            ViewMode::Multi => "multi",
            ViewMode::Render => "render",
        }
    }

    /// Unrecognized names select the axial view instead of failing.
    pub fn parse_or_default(raw: &str) -> Self {
        raw.parse().unwrap_or_default()
    }
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownViewMode(pub String);

impl fmt::Display for UnknownViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown view mode '{}'", self.0)
    }
}

impl std::error::Error for UnknownViewMode {}

impl FromStr for ViewMode {
    type Err = UnknownViewMode;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase();
        ViewMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == normalized)
            .ok_or_else(|| UnknownViewMode(raw.to_string()))
    }
}

/// Renderer-internal orientation code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SliceTypeCode(pub u8);

impl SliceTypeCode {
    pub const AXIAL: Self = Self(0);
    pub const CORONAL: Self = Self(1);
    pub const SAGITTAL: Self = Self(2);
    pub const MULTIPLANAR: Self = Self(3);
    pub const RENDER: Self = Self(4);
}
