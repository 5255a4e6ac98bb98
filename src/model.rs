//! Typed views over the untyped document tree.
//!
//! Stored values are decoded leniently: ids may be numbers or strings, counters
//! may be floats or negative, and sequences may arrive as index-keyed mappings.
//! Anything unusable falls back to the documented default instead of failing.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Map, Value};

pub const DEFAULT_XP_PER_MESSAGE: u64 = 5;
pub const DEFAULT_XP_COOLDOWN: u64 = 60;
pub const DEFAULT_XP_PER_LEVEL: u64 = 100;
pub const DEFAULT_LEVEL_UP_MESSAGE: &str = "Congratulations {user}, you've reached level {level}!";

// =============================================================================
// Value helpers
// =============================================================================

/// Non-negative integer from a number or numeric string.
pub fn as_u64_lenient(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_i64().map(|i| i.max(0) as u64))
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.max(0.0) as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Platform id from a stored value. `0`, `"0"` and `""` mean "not configured".
pub fn id_from_value(value: &Value) -> Option<String> {
    let id = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    if id.is_empty() || id == "0" {
        None
    } else {
        Some(id)
    }
}

/// Ids are written as strings. Platform snowflakes exceed 2^53 and would not
/// survive a double-backed store as numbers; `id_from_value` still reads both.
pub fn id_to_value(id: &str) -> Value {
    Value::String(id.trim().to_string())
}

/// Entries of a mapping, or of a sequence read back with index keys.
fn entries(value: &Value) -> Vec<(String, &Value)> {
    match value {
        Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v)).collect(),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.is_null())
            .map(|(i, v)| (i.to_string(), v))
            .collect(),
        _ => Vec::new(),
    }
}

fn lenient_u64<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    let value = Value::deserialize(d)?;
    Ok(as_u64_lenient(&value).unwrap_or(0))
}

// =============================================================================
// UserRecord
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(default, deserialize_with = "lenient_u64")]
    pub level: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub xp: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub last_message_time: u64,
    /// Keys outside the progression schema, carried through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UserRecord {
    pub fn from_value(value: Value) -> Self {
        serde_json::from_value(value).unwrap_or_default()
    }

    /// The three progression keys as a partial update.
    pub fn progress_update(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("xp".to_string(), json!(self.xp));
        map.insert("level".to_string(), json!(self.level));
        map.insert("last_message_time".to_string(), json!(self.last_message_time));
        map
    }
}

// =============================================================================
// LevelSettings
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct LevelSettings {
    pub enabled: bool,
    pub xp_per_message: u64,
    pub xp_cooldown: u64,
    pub xp_per_level: u64,
    pub level_up_channel: Option<String>,
    pub level_up_message: String,
    pub level_roles: BTreeMap<u64, String>,
}

impl Default for LevelSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            xp_per_message: DEFAULT_XP_PER_MESSAGE,
            xp_cooldown: DEFAULT_XP_COOLDOWN,
            xp_per_level: DEFAULT_XP_PER_LEVEL,
            level_up_channel: None,
            level_up_message: DEFAULT_LEVEL_UP_MESSAGE.to_string(),
            level_roles: BTreeMap::new(),
        }
    }
}

impl LevelSettings {
    /// Decode `data/levels`, field by field. Zero XP rates are malformed and fall back.
    pub fn from_value(value: Option<&Value>) -> Self {
        let d = Self::default();
        let Some(Value::Object(map)) = value else {
            return d;
        };
        let positive = |key: &str, fallback: u64| {
            map.get(key)
                .and_then(as_u64_lenient)
                .filter(|n| *n > 0)
                .unwrap_or(fallback)
        };
        Self {
            enabled: map.get("enabled").and_then(Value::as_bool).unwrap_or(d.enabled),
            xp_per_message: positive("xp_per_message", d.xp_per_message),
            xp_cooldown: map
                .get("xp_cooldown")
                .and_then(as_u64_lenient)
                .unwrap_or(d.xp_cooldown),
            xp_per_level: positive("xp_per_level", d.xp_per_level),
            level_up_channel: map.get("level_up_channel").and_then(id_from_value),
            level_up_message: map
                .get("level_up_message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or(d.level_up_message),
            level_roles: map
                .get("level_roles")
                .map(|roles| {
                    entries(roles)
                        .into_iter()
                        .filter_map(|(k, v)| Some((k.parse().ok()?, id_from_value(v)?)))
                        .collect()
                })
                .unwrap_or_default(),
        }
    }
}

// =============================================================================
// PollRecord
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct PollRecord {
    pub question: String,
    pub options: Vec<String>,
    /// member id -> choice index
    pub votes: BTreeMap<String, u64>,
}

impl PollRecord {
    pub fn new(question: &str, options: Vec<String>) -> Self {
        Self {
            question: question.to_string(),
            options,
            votes: BTreeMap::new(),
        }
    }

    pub fn from_value(value: &Value) -> Self {
        let question = value
            .get("question")
            .and_then(Value::as_str)
            .unwrap_or("Poll")
            .to_string();
        let options = value
            .get("options")
            .map(|opts| {
                let mut indexed: Vec<(usize, String)> = entries(opts)
                    .into_iter()
                    .filter_map(|(k, v)| Some((k.parse().ok()?, v.as_str()?.to_string())))
                    .collect();
                indexed.sort_by_key(|(i, _)| *i);
                indexed.into_iter().map(|(_, o)| o).collect()
            })
            .unwrap_or_default();
        let votes = value
            .get("votes")
            .map(|votes| {
                entries(votes)
                    .into_iter()
                    .filter_map(|(member, choice)| Some((member, as_u64_lenient(choice)?)))
                    .collect()
            })
            .unwrap_or_default();
        Self { question, options, votes }
    }

    /// Stored shape. `votes` is left out: an empty mapping would be dropped anyway.
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("question".to_string(), json!(self.question));
        map.insert("options".to_string(), json!(self.options));
        if !self.votes.is_empty() {
            map.insert("votes".to_string(), json!(self.votes));
        }
        Value::Object(map)
    }
}
