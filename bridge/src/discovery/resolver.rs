//! Host name resolution

use std::net::IpAddr;

use async_trait::async_trait;

use crate::errors::BridgeError;

#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, host: &str) -> Result<IpAddr, BridgeError>;
}

/// Resolver backed by the operating system, preferring IPv4 addresses
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait]
impl Resolver for SystemResolver {
    async fn resolve(&self, host: &str) -> Result<IpAddr, BridgeError> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(ip);
        }

        let addresses: Vec<IpAddr> = tokio::net::lookup_host((host, 0))
            .await
            .map_err(|e| BridgeError::ResolveError {
                host: host.to_string(),
                reason: e.to_string(),
            })?
            .map(|addr| addr.ip())
            .collect();

        addresses
            .iter()
            .find(|ip| ip.is_ipv4())
            .or_else(|| addresses.first())
            .copied()
            .ok_or_else(|| BridgeError::ResolveError {
                host: host.to_string(),
                reason: "no addresses returned".to_string(),
            })
    }
}
