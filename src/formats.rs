use serde::{Deserialize, Serialize};

/// One row of the seed CSV produced by the upstream URL-discovery step.
/// Older files may omit columns, so every field defaults to empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedRow {
    #[serde(default)]
    pub census_subdivision_id: String,
    #[serde(default)]
    pub municipality_name: String,
    #[serde(default, rename = "type")]
    pub municipality_type: String,
    #[serde(default)]
    pub province_id: String,
    #[serde(default)]
    pub province: String,
    /// Query used by the discovery step; carried through but unused here.
    #[serde(default)]
    pub search_terms: String,
    #[serde(default)]
    pub page_url: String,
}

/// Master ledger row. One per successful download, never rewritten.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterRecord {
    pub census_subdivision_id: String,
    pub municipality: String,
    pub province_id: String,
    pub province: String,
    #[serde(rename = "type")]
    pub municipality_type: String,
    pub year: Option<i32>,
    pub source_page_url: String,
    pub document_url: String,
    pub document_path: String,
}

/// Status ledger row, upserted per municipality run. `downloaded` is
/// recounted from the filesystem on every update, not incremented.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusRecord {
    pub census_subdivision_id: String,
    pub municipality_name: String,
    #[serde(rename = "type")]
    pub municipality_type: String,
    pub province_id: String,
    pub province: String,
    pub status: String,
    pub downloaded: usize,
    pub found: usize,
    pub years: usize,
    pub needs_reparse: String,
    pub notes: String,
    pub last_updated: String,
    pub page_url: String,
}
