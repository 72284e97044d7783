//! Localization of database records.
//!
//! MaxMind records carry display names as `"names": {"en": "...", "de": "..."}`.
//! [`localize`] collapses every such map into a single `"name"` for the
//! requested language.

use serde_json::{Map, Value};

const NAMES_FIELD: &str = "names";
const NAME_FIELD: &str = "name";

/// Returns a copy of `record` with every `names` map replaced by one `name`.
///
/// The name is chosen by `lang`, then `fallback`, then the first non-empty
/// entry. If none is usable the field is dropped. Everything else is copied
/// unchanged, recursing into nested maps and sequences.
pub fn localize(record: &Value, lang: &str, fallback: &str) -> Value {
    match record {
        Value::Object(map) => Value::Object(localize_map(map, lang, fallback)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| localize(item, lang, fallback))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn localize_map(map: &Map<String, Value>, lang: &str, fallback: &str) -> Map<String, Value> {
    let mut out = Map::with_capacity(map.len());
    let mut resolved = None;
    for (key, value) in map {
        match (key.as_str(), value) {
            (NAMES_FIELD, Value::Object(names)) => {
                resolved = pick_name(names, lang, fallback);
            }
            _ => {
                out.insert(key.clone(), localize(value, lang, fallback));
            }
        }
    }
    // A resolved name wins over a raw `name` key wherever it appeared
    if let Some(name) = resolved {
        out.insert(NAME_FIELD.to_string(), Value::String(name.to_string()));
    }
    out
}

fn pick_name<'a>(names: &'a Map<String, Value>, lang: &str, fallback: &str) -> Option<&'a str> {
    let usable = |v: &'a Value| v.as_str().filter(|s| !s.is_empty());

    names
        .get(lang)
        .and_then(usable)
        .or_else(|| names.get(fallback).and_then(usable))
        .or_else(|| names.values().find_map(usable))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_requested_language() {
        let record = json!({"names": {"en": "Town", "de": "Stadt"}});
        assert_eq!(localize(&record, "de", "en"), json!({"name": "Stadt"}));
    }

    #[test]
    fn test_fallback_language() {
        let record = json!({"names": {"en": "Town", "de": "Stadt"}});
        assert_eq!(localize(&record, "fr", "en"), json!({"name": "Town"}));
    }

    #[test]
    fn test_any_available_name() {
        let record = json!({"names": {"ru": "Город"}});
        assert_eq!(localize(&record, "fr", "en"), json!({"name": "Город"}));
    }

    #[test]
    fn test_first_entry_in_order() {
        let record = json!({"names": {"ja": "町", "ru": "Город"}});
        assert_eq!(localize(&record, "fr", "en"), json!({"name": "町"}));
    }

    #[test]
    fn test_empty_names_are_skipped_or_dropped() {
        let record = json!({"names": {"de": "", "en": "Town"}});
        assert_eq!(localize(&record, "de", "en"), json!({"name": "Town"}));

        let record = json!({"names": {}, "geoname_id": 42});
        assert_eq!(localize(&record, "de", "en"), json!({"geoname_id": 42}));
    }

    #[test]
    fn test_map_without_names_is_unchanged() {
        let record = json!({"location": {"latitude": 52.5, "longitude": 13.4}, "postal": null});
        assert_eq!(localize(&record, "de", "en"), record);
    }

    #[test]
    fn test_nested_maps_and_sequences() {
        let record = json!({
            "city": {"geoname_id": 1, "names": {"en": "Berlin", "de": "Berlin"}},
            "country": {"iso_code": "DE", "names": {"en": "Germany", "de": "Deutschland"}},
            "subdivisions": [
                {"iso_code": "BE", "names": {"en": "Land Berlin", "de": "Berlin"}}
            ],
            "traits": {"is_anycast": false}
        });

        let localized = localize(&record, "de", "en");
        assert_eq!(
            localized,
            json!({
                "city": {"geoname_id": 1, "name": "Berlin"},
                "country": {"iso_code": "DE", "name": "Deutschland"},
                "subdivisions": [{"iso_code": "BE", "name": "Berlin"}],
                "traits": {"is_anycast": false}
            })
        );
    }

    #[test]
    fn test_unexpected_shapes_pass_through() {
        // "names" that is not a map is left alone
        let record = json!({"names": ["en", "de"]});
        assert_eq!(localize(&record, "de", "en"), record);

        assert_eq!(localize(&json!("scalar"), "de", "en"), json!("scalar"));
        assert_eq!(localize(&Value::Null, "de", "en"), Value::Null);
    }

    #[test]
    fn test_resolved_name_overrides_raw_name_in_any_order() {
        // serde_json keeps insertion order here, so both orders are exercised
        let names_first: Value =
            serde_json::from_str(r#"{"names": {"en": "Town"}, "name": "raw"}"#).unwrap();
        let name_first: Value =
            serde_json::from_str(r#"{"name": "raw", "names": {"en": "Town"}}"#).unwrap();

        assert_eq!(localize(&names_first, "en", "en"), json!({"name": "Town"}));
        assert_eq!(localize(&name_first, "en", "en"), json!({"name": "Town"}));
    }

    #[test]
    fn test_raw_name_kept_when_names_unusable() {
        let record: Value =
            serde_json::from_str(r#"{"names": {"en": ""}, "name": "raw"}"#).unwrap();
        assert_eq!(localize(&record, "en", "en"), json!({"name": "raw"}));
    }
}
