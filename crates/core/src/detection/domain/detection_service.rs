use thiserror::Error;

use super::detection::DetectionBatch;
use crate::shared::frame::EncodedFrame;

/// The three failure kinds the scheduler reacts to differently.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DetectionError {
    #[error("detection service rate limit exceeded")]
    RateLimited,
    #[error("detection service unreachable: {0}")]
    NetworkUnreachable(String),
    #[error("detection failed: {0}")]
    Failed(String),
}

/// Domain interface for the external face/hand detection service.
///
/// Implementations may keep connection state, hence `&mut self`.
pub trait DetectionService: Send {
    fn detect(&mut self, frame: &EncodedFrame) -> Result<DetectionBatch, DetectionError>;
}
