use serde::{Deserialize, Serialize};

use crate::shared::bounding_box::BoundingBox;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Emotion {
    Happy,
    Sad,
    Angry,
    Surprised,
    Neutral,
    Disgusted,
    Fearful,
}

impl std::fmt::Display for Emotion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Emotion::Happy => "Happy",
            Emotion::Sad => "Sad",
            Emotion::Angry => "Angry",
            Emotion::Surprised => "Surprised",
            Emotion::Neutral => "Neutral",
            Emotion::Disgusted => "Disgusted",
            Emotion::Fearful => "Fearful",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeadPose {
    LookingStraight,
    LookingLeft,
    LookingRight,
    LookingUp,
    LookingDown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandSign {
    ThumbsUp,
    ThumbsDown,
    Peace,
    #[serde(rename = "OK")]
    Ok,
    Fist,
    Wave,
    Pointing,
    HighFive,
    CallMe,
    CrossedFingers,
    Love,
}

/// One face reported by the detection service for a single frame.
///
/// `external_id` is the detector's own label and carries no meaning across
/// frames.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceDetection {
    pub external_id: String,
    pub bounding_box: BoundingBox,
    pub emotion: Emotion,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head_pose: Option<HeadPose>,
}

/// Hand gestures are passed through the cycle untouched.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandDetection {
    pub sign: HandSign,
    pub confidence: f64,
    pub bounding_box: BoundingBox,
}

/// Everything the detection service returned for one frame.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionBatch {
    #[serde(default)]
    pub faces: Vec<FaceDetection>,
    #[serde(default)]
    pub hands: Vec<HandDetection>,
}

impl DetectionBatch {
    pub fn new(faces: Vec<FaceDetection>, hands: Vec<HandDetection>) -> Self {
        Self { faces, hands }
    }
}
