// SPDX-License-Identifier: MIT OR Apache-2.0
//! URL validation pipeline (§4.7): parse, enablement, raw-IP/private-range
//! denial, domain-allowlist suffix matching.

use std::net::IpAddr;

use ak_error::{AkError, ErrorCode};
use url::Url;

pub const MAX_BYTES_CAP: u64 = 100 * 1024 * 1024;
pub const MAX_SECONDS_CAP: u64 = 300;

/// A resolved egress policy, derived from the declared policy record.
#[derive(Debug, Clone)]
pub struct EgressPolicy {
    pub enabled: bool,
    pub allow_domains: Vec<String>,
    pub deny_private: bool,
    pub max_bytes: u64,
    pub max_seconds: u64,
}

impl EgressPolicy {
    pub fn new(enabled: bool, allow_domains: Vec<String>, max_bytes: u64, max_seconds: u64) -> Self {
        Self {
            enabled,
            allow_domains,
            deny_private: true,
            max_bytes: max_bytes.min(MAX_BYTES_CAP),
            max_seconds: max_seconds.min(MAX_SECONDS_CAP),
        }
    }

    /// Disable the private-range/loopback denial. Wired to the
    /// `PolicyEnvOverlay::allow_private_hosts` break-glass flag; intended
    /// for local development only, never for a deployed kernel.
    #[must_use]
    pub fn allow_private_hosts(mut self, allow: bool) -> Self {
        self.deny_private = !allow;
        self
    }
}

/// Validate a candidate URL's hostname against the policy, ignoring DNS
/// resolution (step 6, redirect revalidation, is handled by the fetcher).
pub fn validate_target(policy: &EgressPolicy, raw_url: &str) -> Result<Url, AkError> {
    let url = Url::parse(raw_url)
        .map_err(|e| AkError::new(ErrorCode::EgressInvalidUrl, "could not parse URL")
            .with_context("url", raw_url.to_string())
            .with_source(e))?;

    if !policy.enabled {
        return Err(AkError::new(ErrorCode::EgressDisabled, "network egress is disabled"));
    }

    let host = url
        .host_str()
        .ok_or_else(|| AkError::new(ErrorCode::EgressInvalidUrl, "URL has no host").with_context("url", raw_url.to_string()))?;

    if let Ok(ip) = host.parse::<IpAddr>() {
        if policy.deny_private && is_private_ip(&ip) {
            return Err(AkError::new(ErrorCode::EgressPrivateIp, "target resolves to a private address")
                .with_context("host", host.to_string()));
        }
        return Err(AkError::new(ErrorCode::EgressRawIp, "raw IP addresses are not allowed; a DNS name is required")
            .with_context("host", host.to_string()));
    }

    if policy.allow_domains.is_empty() {
        return Err(AkError::new(ErrorCode::EgressNoAllowlist, "no domains are allowlisted for egress"));
    }

    if !host_matches_allowlist(host, &policy.allow_domains) {
        return Err(AkError::new(ErrorCode::EgressNotAllowlisted, "host is not in the egress allowlist")
            .with_context("host", host.to_string()));
    }

    Ok(url)
}

/// `"*"` matches all, `"example.com"` matches exactly or as a dot-suffix,
/// `"*.example.com"` is equivalent to `"example.com"`.
pub fn host_matches_allowlist(host: &str, allow_domains: &[String]) -> bool {
    let host = host.to_lowercase();
    allow_domains.iter().any(|pattern| {
        let pattern = pattern.to_lowercase();
        if pattern == "*" {
            return true;
        }
        let base = pattern.strip_prefix("*.").unwrap_or(&pattern);
        host == base || host.ends_with(&format!(".{base}"))
    })
}

/// RFC1918, 127/8, 169.254/16, ::1, fc00::/7, fe80::/10, plus the IPv4
/// link-local and unspecified ranges a strict SSRF gate also rejects.
pub fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_private()
                || v4.is_loopback()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                || (v6.segments()[0] & 0xfe00) == 0xfc00 // fc00::/7
                || (v6.segments()[0] & 0xffc0) == 0xfe80 // fe80::/10
        }
    }
}
