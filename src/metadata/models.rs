use serde::{Deserialize, Serialize};

/// Album level description of a disc. Every field except `disc_id` may be missing.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub disc_id: String,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub year: Option<String>,
    #[serde(default)]
    pub album: Option<String>,
    #[serde(default)]
    pub album_art: Option<String>,
    /// Titles in disc order, empty when unknown.
    #[serde(default)]
    pub tracks: Vec<String>,
}

impl Metadata {
    pub fn empty(disc_id: impl Into<String>) -> Self {
        Self {
            disc_id: disc_id.into(),
            ..Self::default()
        }
    }

    #[allow(dead_code)]
    pub fn to_record(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }

    #[allow(dead_code)]
    pub fn from_record(record: serde_json::Value) -> serde_json::Result<Self> {
        serde_json::from_value(record)
    }
}
