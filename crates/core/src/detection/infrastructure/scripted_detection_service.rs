use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::detection::domain::detection::DetectionBatch;
use crate::detection::domain::detection_service::{DetectionError, DetectionService};
use crate::shared::frame::EncodedFrame;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptedFailure {
    RateLimited,
    NetworkUnreachable,
    Failed,
}

/// One scripted detector answer.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptStep {
    Batch(DetectionBatch),
    Error(ScriptedFailure),
}

/// Replays a fixed sequence of detector answers, one per call, wrapping
/// around at the end.
///
/// Lets the analyzer run without a live detection service and gives tests
/// exact control over each cycle.
pub struct ScriptedDetectionService {
    steps: Vec<ScriptStep>,
    call_count: usize,
}

impl ScriptedDetectionService {
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self {
            steps,
            call_count: 0,
        }
    }

    /// Loads a JSON array of `{"batch": {...}}` / `{"error": "rate_limited"}` steps.
    pub fn from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let json = fs::read_to_string(path)?;
        let steps: Vec<ScriptStep> = serde_json::from_str(&json)?;
        Ok(Self::new(steps))
    }

    pub fn call_count(&self) -> usize {
        self.call_count
    }
}

impl DetectionService for ScriptedDetectionService {
    fn detect(&mut self, frame: &EncodedFrame) -> Result<DetectionBatch, DetectionError> {
        if self.steps.is_empty() {
            self.call_count += 1;
            return Ok(DetectionBatch::default());
        }
        let step = self.steps[self.call_count % self.steps.len()].clone();
        self.call_count += 1;
        match step {
            ScriptStep::Batch(batch) => Ok(batch),
            ScriptStep::Error(ScriptedFailure::RateLimited) => Err(DetectionError::RateLimited),
            ScriptStep::Error(ScriptedFailure::NetworkUnreachable) => Err(
                DetectionError::NetworkUnreachable(format!(
                    "scripted outage at frame {}",
                    frame.index()
                )),
            ),
            ScriptStep::Error(ScriptedFailure::Failed) => Err(DetectionError::Failed(format!(
                "scripted failure at frame {}",
                frame.index()
            ))),
        }
    }
}
