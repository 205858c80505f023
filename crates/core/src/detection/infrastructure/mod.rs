pub mod http_detection_service;
pub mod scripted_detection_service;
