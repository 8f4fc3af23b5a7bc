// SPDX-License-Identifier: MIT OR Apache-2.0
//! Injectable DNS resolution, so redirect revalidation can be tested
//! without touching a real resolver.

use std::net::IpAddr;

use async_trait::async_trait;

use crate::policy::is_private_ip;

/// Resolves a hostname to the set of addresses it would actually connect
/// to. Production wiring uses the system resolver via `tokio::net`; tests
/// inject a fixed table.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, host: &str) -> std::io::Result<Vec<IpAddr>>;
}

/// System resolver backed by `tokio::net::lookup_host`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

#[async_trait]
impl Resolver for SystemResolver {
    async fn resolve(&self, host: &str) -> std::io::Result<Vec<IpAddr>> {
        let addrs = tokio::net::lookup_host((host, 0)).await?;
        Ok(addrs.map(|a| a.ip()).collect())
    }
}

/// Returns `true` if any resolved address for `host` is private and the
/// policy denies private hosts. Used before connecting and again on every
/// redirect hop, closing the classic DNS-rebinding SSRF gap.
pub async fn any_address_is_private(
    resolver: &dyn Resolver,
    host: &str,
    deny_private: bool,
) -> std::io::Result<bool> {
    if !deny_private {
        return Ok(false);
    }
    let addrs = resolver.resolve(host).await?;
    Ok(addrs.iter().any(is_private_ip))
}
