//! DNS resolver initialization.
//!
//! This module provides the resolver used for reverse DNS (PTR) lookups in
//! WHOIS responses.

use std::sync::Arc;
use std::time::Duration;

use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;

/// Initializes the DNS resolver for reverse lookups.
///
/// Uses the default upstream configuration with short timeouts so a slow PTR
/// lookup cannot hold up a WHOIS response.
pub fn init_resolver() -> Arc<TokioAsyncResolver> {
    let mut opts = ResolverOpts::default();
    opts.timeout = Duration::from_secs(crate::config::DNS_TIMEOUT_SECS);
    opts.attempts = 2;
    opts.ndots = 0;

    Arc::new(TokioAsyncResolver::tokio(ResolverConfig::default(), opts))
}
