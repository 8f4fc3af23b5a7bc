// SPDX-License-Identifier: MIT OR Apache-2.0
//! The `EgressFetcher` abstraction (design §6): the kernel drives outbound
//! HTTP through this trait rather than a concrete client, so tests can
//! swap in an in-memory fake.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use ak_error::{AkError, ErrorCode};
use async_trait::async_trait;

use crate::policy::{validate_target, EgressPolicy};
use crate::resolve::{any_address_is_private, Resolver, SystemResolver};

/// A completed, size-capped fetch response.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

#[async_trait]
pub trait EgressFetcher: Send + Sync {
    async fn fetch(&self, policy: &EgressPolicy, url: &str) -> Result<FetchResponse, AkError>;
}

/// Production fetcher: `reqwest` over an SSRF-validated URL, with manual
/// redirect following so every hop is revalidated by DNS lookup before the
/// client is allowed to connect to it.
pub struct ReqwestFetcher {
    client: reqwest::Client,
    resolver: Arc<dyn Resolver>,
    max_redirects: u8,
}

impl ReqwestFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder().redirect(reqwest::redirect::Policy::none()).build().expect("client"),
            resolver: Arc::new(SystemResolver),
            max_redirects: 5,
        }
    }

    pub fn with_resolver(resolver: Arc<dyn Resolver>) -> Self {
        Self {
            client: reqwest::Client::builder().redirect(reqwest::redirect::Policy::none()).build().expect("client"),
            resolver,
            max_redirects: 5,
        }
    }

    async fn revalidate(&self, policy: &EgressPolicy, raw_url: &str) -> Result<url::Url, AkError> {
        let url = validate_target(policy, raw_url)?;
        let host = url.host_str().unwrap_or_default();
        let private = any_address_is_private(self.resolver.as_ref(), host, policy.deny_private)
            .await
            .map_err(|e| {
                AkError::new(ErrorCode::EgressInvalidUrl, "DNS resolution failed")
                    .with_context("host", host.to_string())
                    .with_source(e)
            })?;
        if private {
            return Err(AkError::new(ErrorCode::EgressPrivateIp, "host resolves to a private address")
                .with_context("host", host.to_string()));
        }
        Ok(url)
    }
}

impl Default for ReqwestFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EgressFetcher for ReqwestFetcher {
    async fn fetch(&self, policy: &EgressPolicy, url: &str) -> Result<FetchResponse, AkError> {
        let mut current = self.revalidate(policy, url).await?;
        let mut hops = 0u8;

        loop {
            let response = tokio::time::timeout(
                Duration::from_secs(policy.max_seconds),
                self.client.get(current.clone()).send(),
            )
            .await
            .map_err(|_| AkError::new(ErrorCode::ExecTimeout, "egress fetch timed out").with_context("url", current.to_string()))?
            .map_err(|e| {
                AkError::new(ErrorCode::EgressInvalidUrl, "fetch request failed")
                    .with_context("url", current.to_string())
                    .with_source(e)
            })?;

            if response.status().is_redirection() {
                hops += 1;
                if hops > self.max_redirects {
                    return Err(AkError::new(ErrorCode::EgressInvalidUrl, "too many redirects")
                        .with_context("url", current.to_string()));
                }
                let location = response
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| AkError::new(ErrorCode::EgressInvalidUrl, "redirect with no Location header"))?;
                let next = current.join(location).map_err(|e| {
                    AkError::new(ErrorCode::EgressInvalidUrl, "could not resolve redirect location").with_source(e)
                })?;
                tracing::debug!(target: "ak.egress", from = %current, to = %next, hop = hops, "following revalidated redirect");
                current = self.revalidate(policy, next.as_str()).await?;
                continue;
            }

            let status = response.status().as_u16();
            let headers = response
                .headers()
                .iter()
                .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
                .collect();

            let mut body = Vec::new();
            let mut stream = response;
            while let Some(chunk) = stream.chunk().await.map_err(|e| {
                AkError::new(ErrorCode::EgressInvalidUrl, "failed reading response body").with_source(e)
            })? {
                body.extend_from_slice(&chunk);
                if body.len() as u64 > policy.max_bytes {
                    return Err(AkError::new(ErrorCode::ResourceExhaustion, "response exceeded the egress byte cap")
                        .with_context("max_bytes", policy.max_bytes));
                }
            }

            return Ok(FetchResponse { status, headers, body });
        }
    }
}

/// In-memory fake for tests: maps exact URLs to canned responses, with no
/// real network I/O. DNS revalidation is skipped since there is nothing to
/// resolve.
#[derive(Default)]
pub struct FakeFetcher {
    routes: BTreeMap<String, FetchResponse>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_route(mut self, url: impl Into<String>, response: FetchResponse) -> Self {
        self.routes.insert(url.into(), response);
        self
    }
}

#[async_trait]
impl EgressFetcher for FakeFetcher {
    async fn fetch(&self, policy: &EgressPolicy, url: &str) -> Result<FetchResponse, AkError> {
        validate_target(policy, url)?;
        self.routes
            .get(url)
            .cloned()
            .ok_or_else(|| AkError::new(ErrorCode::EgressInvalidUrl, "no fake route registered").with_context("url", url.to_string()))
    }
}
