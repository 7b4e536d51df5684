use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ApiError {
    pub fn new(error: impl Into<String>, detail: Option<String>) -> Self {
        Self {
            error: error.into(),
            detail,
        }
    }
}

/// Body of `POST /api/csv`: already-flattened rows to export as-is.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatRowsRequest {
    #[serde(default)]
    pub flat_rows: Option<Vec<Map<String, Value>>>,
}

#[derive(Debug, Deserialize)]
pub struct ArtifactQuery {
    #[serde(default)]
    pub url: String,
}
