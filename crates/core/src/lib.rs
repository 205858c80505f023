pub mod attendance;
pub mod capture;
pub mod detection;
pub mod identity;
pub mod persistence;
pub mod pipeline;
pub mod scheduling;
pub mod session;
pub mod shared;
pub mod tracking;
