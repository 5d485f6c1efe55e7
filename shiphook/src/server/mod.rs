//! Webhook listener

pub mod auth;
pub mod handlers;
pub mod response;
pub mod route;
pub mod serve;
pub mod state;
