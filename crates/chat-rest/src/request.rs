//! Request descriptors.

use serde_json::Value;

use crate::route::Route;

/// One REST call: a route plus an optional JSON body
#[derive(Debug, Clone, PartialEq)]
pub struct RestRequest {
    pub route: Route,
    pub body: Option<Value>,
    /// Audit log reason sent as `X-Audit-Log-Reason`
    pub reason: Option<String>,
}

impl RestRequest {
    #[must_use]
    pub fn new(route: Route) -> Self {
        Self {
            route,
            body: None,
            reason: None,
        }
    }

    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    #[must_use]
    pub fn bucket_key(&self) -> String {
        self.route.bucket_key()
    }
}

impl From<Route> for RestRequest {
    fn from(route: Route) -> Self {
        Self::new(route)
    }
}
