//! Engine image models

use serde::{Deserialize, Serialize};

/// Image known to the local engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageInfo {
    pub id: String,
    pub tag: String,
    /// Creation time, Unix epoch seconds
    pub created: i64,
    pub size: i64,
}
