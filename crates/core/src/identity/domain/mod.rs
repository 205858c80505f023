pub mod identity_linker;
pub mod person;
