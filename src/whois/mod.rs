//! WHOIS and reverse DNS lookups.
//!
//! Registration data comes from RDAP (the JSON successor of WHOIS) through a
//! bootstrap service such as `rdap.org`, which redirects each query to the
//! authoritative registry. IP targets additionally get a PTR lookup.

mod parse;
mod types;

use std::net::IpAddr;
use std::sync::Arc;

use chrono::Utc;
use hickory_resolver::TokioAsyncResolver;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::Client;
use serde::de::DeserializeOwned;
use url::Url;

use crate::config::RDAP_TIMEOUT;
use crate::error_handling::{InitializationError, WhoisError};
use parse::{RdapDomain, RdapIpNetwork};

pub use types::{DomainWhois, IpWhois, WhoisData, WhoisEntity, WhoisEvent};

const RDAP_MEDIA_TYPE: &str = "application/rdap+json";

/// Stateless WHOIS client. Cheap to share behind an `Arc`.
pub struct WhoisService {
    client: Client,
    rdap_base: String,
    resolver: Option<Arc<TokioAsyncResolver>>,
}

impl WhoisService {
    /// Creates a service querying the RDAP server at `rdap_base`.
    ///
    /// Without a resolver, reverse DNS is skipped.
    pub fn new(
        rdap_base: &str,
        resolver: Option<Arc<TokioAsyncResolver>>,
    ) -> Result<Self, InitializationError> {
        Url::parse(rdap_base).map_err(|e| {
            InitializationError::InvalidConfig(format!("invalid RDAP URL {}: {}", rdap_base, e))
        })?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(RDAP_MEDIA_TYPE));
        let client = Client::builder()
            .timeout(RDAP_TIMEOUT)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            rdap_base: rdap_base.trim_end_matches('/').to_string(),
            resolver,
        })
    }

    /// Looks up an IP address or a domain name.
    ///
    /// # Errors
    ///
    /// Returns [`WhoisError::InvalidTarget`] if `target` is neither, or an
    /// RDAP error if the registry lookup fails. A failed PTR lookup only
    /// leaves `reverse_dns` empty.
    pub async fn lookup(&self, target: &str) -> Result<WhoisData, WhoisError> {
        let target = target.trim();
        let lookup_timestamp = Utc::now();

        if let Ok(ip) = target.parse::<IpAddr>() {
            let ip_path = format!("ip/{}", ip);
            let (network, reverse_dns) = tokio::join!(
                self.fetch::<RdapIpNetwork>(&ip_path),
                self.reverse_dns(ip)
            );
            let network = network.inspect_err(|e| {
                log::warn!("IP WHOIS lookup for {} failed: {}", ip, e);
            })?;
            log::info!("IP WHOIS lookup for {} successful", ip);

            return Ok(WhoisData {
                target: target.to_string(),
                lookup_timestamp,
                ip_whois: Some(network.into()),
                domain_whois: None,
                reverse_dns,
            });
        }

        let domain = normalize_domain(target)
            .ok_or_else(|| WhoisError::InvalidTarget(target.to_string()))?;
        let record = self
            .fetch::<RdapDomain>(&format!("domain/{}", domain))
            .await
            .inspect_err(|e| log::warn!("Domain WHOIS lookup for {} failed: {}", domain, e))?;
        log::info!("Domain WHOIS lookup for {} successful", domain);

        Ok(WhoisData {
            target: target.to_string(),
            lookup_timestamp,
            ip_whois: None,
            domain_whois: Some(record.into()),
            reverse_dns: None,
        })
    }

    /// Resolves the PTR name of `ip`, without the trailing dot.
    pub async fn reverse_dns(&self, ip: IpAddr) -> Option<String> {
        let resolver = self.resolver.as_ref()?;
        match resolver.reverse_lookup(ip).await {
            Ok(lookup) => {
                let name = lookup
                    .iter()
                    .next()
                    .map(|name| name.to_string().trim_end_matches('.').to_string());
                if let Some(name) = &name {
                    log::debug!("Reverse DNS for {}: {}", ip, name);
                }
                name
            }
            Err(e) => {
                log::debug!("Reverse DNS for {} failed: {}", ip, e);
                None
            }
        }
    }

    async fn fetch<T: DeserializeOwned>(&self, path: &str) -> Result<T, WhoisError> {
        let url = format!("{}/{}", self.rdap_base, path);
        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(WhoisError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

/// Lowercases `raw` and checks it looks like a domain name (at least two labels).
fn normalize_domain(raw: &str) -> Option<String> {
    let domain = raw.trim_end_matches('.').to_lowercase();
    if domain.len() > 253 || !domain.contains('.') {
        return None;
    }
    let labels_ok = domain.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    });
    labels_ok.then_some(domain)
}
