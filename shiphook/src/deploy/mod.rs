//! Deployment module

pub mod command;
pub mod executor;
pub mod git;
pub mod process;
