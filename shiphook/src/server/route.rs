//! Trigger route matching

use axum::http::Method;

/// Matches requests against the single configured trigger endpoint.
///
/// Only `POST` matches. The query string is ignored and one trailing slash
/// on either side is tolerated, so `/deploy` and `/deploy/` are the same
/// endpoint.
#[derive(Debug, Clone)]
pub struct RouteMatcher {
    path: String,
}

impl RouteMatcher {
    pub fn new(trigger_path: &str) -> Self {
        Self {
            path: normalize(trigger_path).to_string(),
        }
    }

    /// The normalized trigger path
    pub fn path(&self) -> &str {
        &self.path
    }

    /// `raw_path` may carry a query string.
    pub fn matches(&self, method: &Method, raw_path: &str) -> bool {
        if *method != Method::POST {
            return false;
        }
        let path = raw_path.split(['?', '#']).next().unwrap_or_default();
        normalize(path) == self.path
    }
}

fn normalize(path: &str) -> &str {
    if path.len() > 1 {
        path.strip_suffix('/').unwrap_or(path)
    } else {
        path
    }
}
