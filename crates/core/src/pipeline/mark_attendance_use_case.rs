use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::attendance::domain::attendance_log::AttendanceLog;
use crate::attendance::domain::attendance_record::AttendanceRecord;
use crate::capture::domain::frame_source::{CaptureError, FrameSource};
use crate::detection::domain::detection_service::{DetectionError, DetectionService};
use crate::identity::directory_service::{DirectoryError, DirectoryService};
use crate::identity::domain::identity_linker::IdentityDirectory;

#[derive(Error, Debug)]
pub enum MarkAttendanceError {
    #[error("student {0} is not registered")]
    UnknownStudent(String),
    #[error("account {0} is blocked")]
    Blocked(String),
    #[error("no face is linked to {0} yet")]
    NotLinked(String),
    #[error("Could not detect a face. Please ensure you are clearly visible.")]
    NoFaceDetected,
    #[error("Please wait a moment before marking attendance again.")]
    TooFrequent,
    #[error(transparent)]
    Detection(DetectionError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

impl From<DetectionError> for MarkAttendanceError {
    fn from(e: DetectionError) -> Self {
        match e {
            DetectionError::RateLimited => MarkAttendanceError::TooFrequent,
            other => MarkAttendanceError::Detection(other),
        }
    }
}

/// Student self-service attendance: any detected face in one frame counts
/// for the student's linked persistent id. Not debounced.
pub struct MarkAttendanceUseCase {
    source: Box<dyn FrameSource>,
    detector: Box<dyn DetectionService>,
}

impl MarkAttendanceUseCase {
    pub fn new(source: Box<dyn FrameSource>, detector: Box<dyn DetectionService>) -> Self {
        Self { source, detector }
    }

    pub fn execute(
        &mut self,
        roll_number: &str,
        directory: &mut DirectoryService,
        now: DateTime<Utc>,
    ) -> Result<AttendanceRecord, MarkAttendanceError> {
        let student = directory
            .student(roll_number)
            .ok_or_else(|| MarkAttendanceError::UnknownStudent(roll_number.to_string()))?;
        if student.is_blocked {
            return Err(MarkAttendanceError::Blocked(roll_number.to_string()));
        }
        let persistent_id = directory
            .persistent_id_for(roll_number)
            .ok_or_else(|| MarkAttendanceError::NotLinked(roll_number.to_string()))?;

        let frame = self.source.capture_once()?;
        let batch = self.detector.detect(&frame)?;
        let face = batch
            .faces
            .first()
            .ok_or(MarkAttendanceError::NoFaceDetected)?;

        let emotion = face.emotion;

        directory.log_attendance(persistent_id, emotion, now)?;
        log::info!("Attendance marked for {roll_number} (face {persistent_id})");
        Ok(AttendanceRecord {
            persistent_id,
            timestamp: now,
            emotion,
        })
    }
}
