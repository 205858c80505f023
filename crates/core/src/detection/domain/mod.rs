pub mod detection;
pub mod detection_service;
pub mod recognition_service;
