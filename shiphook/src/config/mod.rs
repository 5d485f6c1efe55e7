//! Configuration module

pub mod loader;
pub mod settings;
