pub mod analysis_cycle;
pub mod capture_scheduler;
pub mod cycle_logger;
pub mod face_login_use_case;
pub mod infrastructure;
pub mod mark_attendance_use_case;
