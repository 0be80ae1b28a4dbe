//! Where the session gets its gateway URL from

use async_trait::async_trait;
use chat_common::ClientResult;
use chat_rest::RequestDispatcher;

/// Supplies the gateway URL; `force_refresh` bypasses any cached value
#[async_trait]
pub trait GatewayUrlSource: Send + Sync {
    async fn gateway_url(&self, force_refresh: bool) -> ClientResult<String>;
}

#[async_trait]
impl GatewayUrlSource for RequestDispatcher {
    async fn gateway_url(&self, force_refresh: bool) -> ClientResult<String> {
        RequestDispatcher::gateway_url(self, force_refresh).await
    }
}

/// A fixed URL
#[derive(Debug, Clone)]
pub struct StaticGatewayUrl(pub String);

#[async_trait]
impl GatewayUrlSource for StaticGatewayUrl {
    async fn gateway_url(&self, _force_refresh: bool) -> ClientResult<String> {
        Ok(self.0.clone())
    }
}
