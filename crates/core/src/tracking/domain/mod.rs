pub mod track_matcher;
pub mod track_store;
