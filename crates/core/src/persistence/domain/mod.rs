pub mod persistence_service;
