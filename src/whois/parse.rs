//! RDAP response parsing and conversion.
//!
//! Only the subset of RFC 9083 objects shown in WHOIS responses is decoded;
//! unknown members are ignored.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use super::types::{DomainWhois, IpWhois, WhoisEntity, WhoisEvent};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RdapIpNetwork {
    handle: Option<String>,
    name: Option<String>,
    #[serde(rename = "type")]
    network_type: Option<String>,
    country: Option<String>,
    start_address: Option<String>,
    end_address: Option<String>,
    parent_handle: Option<String>,
    #[serde(default, rename = "cidr0_cidrs")]
    cidrs: Vec<RdapCidr>,
    #[serde(default)]
    status: Vec<String>,
    #[serde(default)]
    entities: Vec<RdapEntity>,
    #[serde(default)]
    events: Vec<RdapEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RdapDomain {
    handle: Option<String>,
    ldh_name: Option<String>,
    unicode_name: Option<String>,
    #[serde(default)]
    status: Vec<String>,
    #[serde(default)]
    nameservers: Vec<RdapNameserver>,
    #[serde(default)]
    entities: Vec<RdapEntity>,
    #[serde(default)]
    events: Vec<RdapEvent>,
}

#[derive(Debug, Deserialize)]
struct RdapCidr {
    v4prefix: Option<String>,
    v6prefix: Option<String>,
    length: Option<u8>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RdapNameserver {
    ldh_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RdapEntity {
    handle: Option<String>,
    #[serde(default)]
    roles: Vec<String>,
    vcard_array: Option<Value>,
    #[serde(default)]
    entities: Vec<RdapEntity>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RdapEvent {
    event_action: String,
    event_date: String,
}

impl From<RdapIpNetwork> for IpWhois {
    fn from(network: RdapIpNetwork) -> Self {
        IpWhois {
            handle: network.handle,
            name: network.name,
            network_type: network.network_type,
            country: network.country,
            start_address: network.start_address,
            end_address: network.end_address,
            cidrs: network
                .cidrs
                .iter()
                .filter_map(|c| {
                    let prefix = c.v4prefix.as_deref().or(c.v6prefix.as_deref())?;
                    Some(format!("{}/{}", prefix, c.length?))
                })
                .collect(),
            parent_handle: network.parent_handle,
            status: network.status,
            entities: flatten_entities(&network.entities),
            events: network.events.iter().map(convert_event).collect(),
        }
    }
}

impl From<RdapDomain> for DomainWhois {
    fn from(domain: RdapDomain) -> Self {
        let entities = flatten_entities(&domain.entities);
        let registrar = entities
            .iter()
            .find(|e| e.roles.iter().any(|r| r == "registrar"))
            .and_then(|e| e.name.clone().or_else(|| e.handle.clone()));

        let event_date = |action: &str| {
            domain
                .events
                .iter()
                .find(|e| e.event_action == action)
                .and_then(|e| parse_date_string(&e.event_date))
        };

        DomainWhois {
            creation_date: event_date("registration"),
            expiration_date: event_date("expiration"),
            updated_date: event_date("last changed"),
            domain_name: domain.unicode_name.clone().or_else(|| domain.ldh_name.clone()),
            handle: domain.handle.clone(),
            registrar,
            status: domain.status.clone(),
            nameservers: domain
                .nameservers
                .iter()
                .filter_map(|ns| ns.ldh_name.as_deref())
                .map(|name| name.trim_end_matches('.').to_lowercase())
                .collect(),
            entities,
        }
    }
}

/// Entities nest (e.g. the abuse contact inside the registrar); list them flat.
fn flatten_entities(entities: &[RdapEntity]) -> Vec<WhoisEntity> {
    let mut out = Vec::new();
    for entity in entities {
        out.push(WhoisEntity {
            handle: entity.handle.clone(),
            name: entity.vcard_array.as_ref().and_then(vcard_full_name),
            roles: entity.roles.clone(),
        });
        out.extend(flatten_entities(&entity.entities));
    }
    out
}

/// Extracts the `fn` property from a jCard: `["vcard", [["fn", {}, "text", "Name"], ...]]`.
fn vcard_full_name(vcard: &Value) -> Option<String> {
    vcard
        .get(1)?
        .as_array()?
        .iter()
        .find(|property| property.get(0).and_then(Value::as_str) == Some("fn"))?
        .get(3)?
        .as_str()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

fn convert_event(event: &RdapEvent) -> WhoisEvent {
    WhoisEvent {
        action: event.event_action.clone(),
        date: event.event_date.clone(),
    }
}

/// Attempts to parse a date string in various formats
fn parse_date_string(date_str: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(date_str) {
        return Some(dt.with_timezone(&Utc));
    }

    // Some registries omit the offset or the time
    let formats = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d"];
    for format in &formats {
        if let Ok(naive_dt) = chrono::NaiveDateTime::parse_from_str(date_str, format) {
            return Some(naive_dt.and_utc());
        }
        if let Ok(naive_date) = chrono::NaiveDate::parse_from_str(date_str, format) {
            return Some(naive_date.and_hms_opt(0, 0, 0)?.and_utc());
        }
    }

    None
}
