use thiserror::Error;

use crate::capture::domain::frame_source::{CaptureError, FrameSource};
use crate::detection::domain::detection_service::{DetectionError, DetectionService};
use crate::detection::domain::recognition_service::RecognitionService;
use crate::identity::directory_service::DirectoryService;
use crate::identity::domain::person::{AccountKind, Person};
use crate::shared::config::EngineConfig;

#[derive(Error, Debug)]
pub enum LoginError {
    #[error("No face detected. Please ensure you are clearly visible.")]
    NoFaceDetected,
    #[error("Please move closer to the camera.")]
    MoveCloser,
    #[error("No {0}s with profile photos are registered.")]
    NoProfiles(AccountKind),
    #[error("Face not recognized. Please try again in a well-lit area.")]
    NotRecognized,
    #[error("Match found but user data could not be retrieved.")]
    UserDataMissing,
    #[error("Face recognized, but it belongs to a {found}. Please use the {found} login.")]
    WrongAccountKind { found: AccountKind },
    #[error("Login failed: account for {0} is blocked.")]
    Blocked(String),
    #[error("You are trying too frequently. Please wait a moment before trying again.")]
    TooFrequent,
    #[error(transparent)]
    Detection(DetectionError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
}

impl From<DetectionError> for LoginError {
    fn from(e: DetectionError) -> Self {
        match e {
            DetectionError::RateLimited => LoginError::TooFrequent,
            other => LoginError::Detection(other),
        }
    }
}

/// Logs a person in by matching one camera frame against the reference
/// photos of every account of the requested kind.
pub struct FaceLoginUseCase {
    source: Box<dyn FrameSource>,
    detector: Box<dyn DetectionService>,
    recognizer: Box<dyn RecognitionService>,
    threshold: f64,
    min_face_fraction: f64,
}

impl FaceLoginUseCase {
    pub fn new(
        source: Box<dyn FrameSource>,
        detector: Box<dyn DetectionService>,
        recognizer: Box<dyn RecognitionService>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            source,
            detector,
            recognizer,
            threshold: config.recognition_threshold,
            min_face_fraction: config.min_login_face_fraction,
        }
    }

    pub fn execute(
        &mut self,
        kind: AccountKind,
        directory: &DirectoryService,
    ) -> Result<Person, LoginError> {
        let probe = self.source.capture_once()?;
        let batch = self.detector.detect(&probe)?;

        let face = batch.faces.first().ok_or(LoginError::NoFaceDetected)?;
        if !face.bounding_box.exceeds(self.min_face_fraction) {
            return Err(LoginError::MoveCloser);
        }

        let candidates = directory.users_with_photos(kind);
        if candidates.is_empty() {
            return Err(LoginError::NoProfiles(kind));
        }

        let verdict = self.recognizer.recognize(&probe, &candidates)?;
        log::debug!(
            "Recognition verdict {:?} at {:.2} (threshold {:.2})",
            verdict.matched,
            verdict.confidence,
            self.threshold
        );
        let matched = verdict
            .accepted(self.threshold)
            .ok_or(LoginError::NotRecognized)?;

        let person = directory
            .user_by_id(matched)
            .ok_or(LoginError::UserDataMissing)?;
        if person.kind() != kind {
            return Err(LoginError::WrongAccountKind {
                found: person.kind(),
            });
        }
        if person.is_blocked() {
            return Err(LoginError::Blocked(person.name().to_string()));
        }
        log::info!("{} {} logged in by face", person.kind(), person.id());
        Ok(person)
    }
}
