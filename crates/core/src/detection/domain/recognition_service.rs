use super::detection_service::DetectionError;
use crate::shared::frame::EncodedFrame;

/// A registered person's reference photo, offered as a match candidate.
#[derive(Clone, Debug, PartialEq)]
pub struct ReferencePhoto {
    pub person_id: String,
    pub photo_base64: String,
}

/// Recognition verdict. `matched` is `None` when the service answered UNKNOWN.
#[derive(Clone, Debug, PartialEq)]
pub struct RecognitionMatch {
    pub matched: Option<String>,
    pub confidence: f64,
}

impl RecognitionMatch {
    pub fn unknown() -> Self {
        Self {
            matched: None,
            confidence: 0.0,
        }
    }

    /// The matched id, if the confidence strictly exceeds `threshold`.
    pub fn accepted(&self, threshold: f64) -> Option<&str> {
        match &self.matched {
            Some(id) if self.confidence > threshold => Some(id.as_str()),
            _ => None,
        }
    }
}

/// Domain interface for the login-time probe-vs-references matcher.
pub trait RecognitionService: Send {
    fn recognize(
        &mut self,
        probe: &EncodedFrame,
        candidates: &[ReferencePhoto],
    ) -> Result<RecognitionMatch, DetectionError>;
}
