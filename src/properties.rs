//! Tolerant lookup of municipality identity in GeoJSON property bags.
//!
//! Boundary files from different publishers name the same attribute
//! differently (`GEOCODIGO` vs `CD_MUN`, `NOME` vs `NM_MUN`, ...). Each
//! attribute is resolved through an ordered list of candidate keys; the first
//! key holding a non-empty value wins.

use geojson::{Feature, JsonObject, JsonValue};
use serde::Deserialize;

pub const DEFAULT_CODE_KEYS: &[&str] = &["GEOCODIGO", "CD_MUN", "cd_geocmu", "geocodigo", "CD_GEOCMU"];
pub const DEFAULT_NAME_KEYS: &[&str] = &["NOME", "NM_MUN", "nm_mun", "nome"];
pub const DEFAULT_STATE_KEYS: &[&str] = &["UF", "SIGLA_UF", "uf"];

/// Ordered candidate keys for each identity attribute.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PropertyAliases {
    pub code: Vec<String>,
    pub name: Vec<String>,
    pub state: Vec<String>,
}

impl Default for PropertyAliases {
    fn default() -> Self {
        fn owned(keys: &[&str]) -> Vec<String> {
            keys.iter().map(|k| k.to_string()).collect()
        }

        Self {
            code: owned(DEFAULT_CODE_KEYS),
            name: owned(DEFAULT_NAME_KEYS),
            state: owned(DEFAULT_STATE_KEYS),
        }
    }
}

impl PropertyAliases {
    pub fn code(&self, feature: &Feature) -> Option<String> {
        lookup(feature.properties.as_ref()?, &self.code)
    }

    pub fn name(&self, feature: &Feature) -> Option<String> {
        lookup(feature.properties.as_ref()?, &self.name)
    }

    pub fn state(&self, feature: &Feature) -> Option<String> {
        lookup(feature.properties.as_ref()?, &self.state)
    }
}

/// First usable value among `keys`, rendered as a string.
///
/// Null, empty strings, `false` and numeric zero are skipped, so a blank
/// column in one schema falls through to the next alias.
pub fn lookup(properties: &JsonObject, keys: &[String]) -> Option<String> {
    keys.iter()
        .filter_map(|key| properties.get(key))
        .find_map(value_as_string)
}

fn value_as_string(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) if !s.is_empty() => Some(s.clone()),
        JsonValue::Number(n) if n.as_f64() == Some(0.0) => None,
        // Floats print without a trailing `.0` so `3550308.0` joins as `3550308`.
        JsonValue::Number(n) if n.is_f64() => n.as_f64().map(|f| f.to_string()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(true) => Some("true".to_string()),
        _ => None,
    }
}
