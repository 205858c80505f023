/// Time between capture/analysis ticks.
pub const ANALYSIS_INTERVAL_MS: u64 = 2000;

/// Polling pause after the detector reports a rate limit.
pub const RATE_LIMIT_PAUSE_MS: u64 = 61_000;

/// Minimum spacing between two attendance writes for the same persistent id.
pub const ATTENDANCE_LOG_INTERVAL_SECS: u64 = 5 * 60;

/// A track only claims a detection whose IoU strictly exceeds this.
pub const TRACK_IOU_THRESHOLD: f64 = 0.4;

pub const SESSION_TIMEOUT_SECS: u64 = 5 * 60;
pub const SESSION_WARNING_SECS: u32 = 60;
pub const SESSION_COUNTDOWN_TICK_MS: u64 = 1000;

pub const RECOGNITION_CONFIDENCE_THRESHOLD: f64 = 0.75;
pub const RECOGNITION_THRESHOLD_ENV: &str = "FACE_RECOGNITION_CONFIDENCE_THRESHOLD";

/// Login probes need a face larger than this fraction of the frame in both axes.
pub const MIN_LOGIN_FACE_FRACTION: f64 = 0.25;

pub const JPEG_QUALITY: u8 = 80;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];

pub const APP_DIR_NAME: &str = "FaceAttendance";
