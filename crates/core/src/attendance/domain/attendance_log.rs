use chrono::{DateTime, Utc};

use super::attendance_record::AttendanceRecord;
use crate::detection::domain::detection::Emotion;
use crate::identity::directory_service::DirectoryError;

/// Write access to the persisted attendance log.
pub trait AttendanceLog {
    /// Appends one record and returns the full updated log.
    fn log_attendance(
        &mut self,
        persistent_id: u32,
        emotion: Emotion,
        at: DateTime<Utc>,
    ) -> Result<Vec<AttendanceRecord>, DirectoryError>;
}
