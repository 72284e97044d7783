//! API HTTP handlers.

mod geo;
mod status;
mod whois;

pub use geo::geo_lookup_handler;
pub use status::status_handler;
pub use whois::whois_handler;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::config::UNKNOWN_VERSION_TAG;

/// RFC 3339 timestamp, or `N/A` when unset.
fn format_time(time: Option<DateTime<Utc>>) -> String {
    time.map_or_else(
        || UNKNOWN_VERSION_TAG.to_string(),
        |t| t.to_rfc3339_opts(SecondsFormat::Secs, true),
    )
}
