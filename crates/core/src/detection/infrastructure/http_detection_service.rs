use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::detection::domain::detection::DetectionBatch;
use crate::detection::domain::detection_service::{DetectionError, DetectionService};
use crate::detection::domain::recognition_service::{
    RecognitionMatch, RecognitionService, ReferencePhoto,
};
use crate::shared::frame::EncodedFrame;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const UNKNOWN_PERSON: &str = "UNKNOWN";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RecognizeRequest<'a> {
    probe_base64: String,
    candidates: Vec<Candidate<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Candidate<'a> {
    id: &'a str,
    photo_base64: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecognizeResponse {
    matched_user_id: String,
    confidence: f64,
}

/// Talks to the detection service over HTTP.
///
/// `POST {base}/detect` takes the raw JPEG and returns a [`DetectionBatch`];
/// `POST {base}/recognize` takes a base64 probe plus reference photos.
pub struct HttpDetectionService {
    client: Client,
    base_url: String,
}

impl HttpDetectionService {
    pub fn new(base_url: &str) -> Result<Self, DetectionError> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, DetectionError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DetectionError::Failed(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }
}

impl DetectionService for HttpDetectionService {
    fn detect(&mut self, frame: &EncodedFrame) -> Result<DetectionBatch, DetectionError> {
        let response = self
            .client
            .post(self.endpoint("detect"))
            .header(reqwest::header::CONTENT_TYPE, "image/jpeg")
            .body(frame.data().to_vec())
            .send()
            .map_err(classify_transport)?;

        if let Some(err) = classify_status(response.status()) {
            return Err(err);
        }
        response
            .json::<DetectionBatch>()
            .map_err(|e| DetectionError::Failed(format!("malformed detection response: {e}")))
    }
}

impl RecognitionService for HttpDetectionService {
    fn recognize(
        &mut self,
        probe: &EncodedFrame,
        candidates: &[ReferencePhoto],
    ) -> Result<RecognitionMatch, DetectionError> {
        let request = RecognizeRequest {
            probe_base64: STANDARD.encode(probe.data()),
            candidates: candidates
                .iter()
                .map(|c| Candidate {
                    id: &c.person_id,
                    photo_base64: &c.photo_base64,
                })
                .collect(),
        };

        let response = self
            .client
            .post(self.endpoint("recognize"))
            .json(&request)
            .send()
            .map_err(classify_transport)?;

        if let Some(err) = classify_status(response.status()) {
            return Err(err);
        }
        let body: RecognizeResponse = response
            .json()
            .map_err(|e| DetectionError::Failed(format!("malformed recognition response: {e}")))?;
        Ok(to_match(body))
    }
}

fn to_match(body: RecognizeResponse) -> RecognitionMatch {
    let matched = if body.matched_user_id == UNKNOWN_PERSON {
        None
    } else {
        Some(body.matched_user_id)
    };
    RecognitionMatch {
        matched,
        confidence: body.confidence,
    }
}

/// Maps a non-success HTTP status to a detection error; `None` on success.
fn classify_status(status: StatusCode) -> Option<DetectionError> {
    if status == StatusCode::TOO_MANY_REQUESTS {
        Some(DetectionError::RateLimited)
    } else if status.is_success() {
        None
    } else {
        Some(DetectionError::Failed(format!("detection service returned {status}")))
    }
}

fn classify_transport(err: reqwest::Error) -> DetectionError {
    if err.status() == Some(StatusCode::TOO_MANY_REQUESTS) {
        DetectionError::RateLimited
    } else if err.is_connect() || err.is_timeout() {
        DetectionError::NetworkUnreachable(err.to_string())
    } else {
        DetectionError::Failed(err.to_string())
    }
}
