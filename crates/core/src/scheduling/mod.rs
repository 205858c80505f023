pub mod activity_signal;
pub mod timers;
