// SPDX-License-Identifier: MIT OR Apache-2.0
//! Network Egress Policy (design §4.7): SSRF-resistant URL validation,
//! domain allowlisting, and redirect-safe fetching.

#![deny(unsafe_code)]

pub mod fetcher;
pub mod policy;
pub mod resolve;

pub use fetcher::{EgressFetcher, FakeFetcher, FetchResponse, ReqwestFetcher};
pub use policy::{host_matches_allowlist, is_private_ip, validate_target, EgressPolicy, MAX_BYTES_CAP, MAX_SECONDS_CAP};
pub use resolve::{any_address_is_private, Resolver, SystemResolver};
