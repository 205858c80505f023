pub mod attendance_debouncer;
pub mod attendance_log;
pub mod attendance_record;
