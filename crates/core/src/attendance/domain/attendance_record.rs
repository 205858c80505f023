use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::detection::domain::detection::Emotion;

/// One attendance event. Append-only.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub persistent_id: u32,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub emotion: Emotion,
}

/// One administrative action, attributed to the admin who performed it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditLogRecord {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub user: String,
    pub action: String,
    pub details: String,
}
