//! Shiphook Library
//!
//! A self-hosted webhook that pulls a repository and runs its deploy
//! command when triggered.

pub mod app;
pub mod config;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod logs;
pub mod server;
pub mod utils;
