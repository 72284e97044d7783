//! WHOIS data structures.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Result of a WHOIS lookup for an IP address or a domain.
#[derive(Debug, Clone, Serialize)]
pub struct WhoisData {
    /// The target as requested
    pub target: String,
    /// When the lookup was performed
    pub lookup_timestamp: DateTime<Utc>,
    /// Registration data of the network containing an IP target
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_whois: Option<IpWhois>,
    /// Registration data of a domain target
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain_whois: Option<DomainWhois>,
    /// PTR name of an IP target, if it has one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reverse_dns: Option<String>,
}

/// Network registration summary from RDAP.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IpWhois {
    /// Registry handle (e.g. `NET-8-8-8-0-2`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    /// Network name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Allocation type (e.g. `DIRECT ALLOCATION`)
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub network_type: Option<String>,
    /// Registration country code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    /// First address of the range
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_address: Option<String>,
    /// Last address of the range
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_address: Option<String>,
    /// CIDR blocks covering the range
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cidrs: Vec<String>,
    /// Handle of the parent network
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_handle: Option<String>,
    /// Registration status values
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub status: Vec<String>,
    /// Registrant, abuse and technical contacts
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub entities: Vec<WhoisEntity>,
    /// Registration, last-changed and similar events
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<WhoisEvent>,
}

/// Domain registration summary from RDAP.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DomainWhois {
    /// Domain name as registered
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain_name: Option<String>,
    /// Registry handle
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    /// Sponsoring registrar
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registrar: Option<String>,
    /// Domain creation date
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<DateTime<Utc>>,
    /// Domain expiration date
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<DateTime<Utc>>,
    /// Domain updated date
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_date: Option<DateTime<Utc>>,
    /// Domain status (e.g. `client transfer prohibited`)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub status: Vec<String>,
    /// Delegated nameservers
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub nameservers: Vec<String>,
    /// Contacts listed on the domain
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub entities: Vec<WhoisEntity>,
}

/// A contact attached to a registration.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WhoisEntity {
    /// Registry handle of the contact
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    /// Formatted name from the contact card
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Roles such as `registrant`, `abuse` or `registrar`
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
}

/// A dated registration event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WhoisEvent {
    /// Event action, e.g. `registration`
    pub action: String,
    /// Event date as published
    pub date: String,
}
