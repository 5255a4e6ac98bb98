//! Default schema templates for community configuration and member records.

use serde_json::{json, Map, Value};

/// Immutable required-keys schema.
///
/// Shared as `Arc<Defaults>` between the reconciler and the engines. A caller
/// that needs a variant takes a modified copy with [`Defaults::with_config_override`].
#[derive(Debug, Clone, PartialEq)]
pub struct Defaults {
    config: Map<String, Value>,
    user: Map<String, Value>,
}

impl Defaults {
    pub fn new(config: Map<String, Value>, user: Map<String, Value>) -> Self {
        Self { config, user }
    }

    pub fn builtin() -> Self {
        let config = json!({
            "levels": {
                "enabled": true,
                "xp_per_message": 5,
                "xp_cooldown": 60,
                "level_up_channel": 0,
                "level_roles": {},
                "xp_per_level": 100,
                "level_up_message": "Congratulations {user}, you've reached level {level}!"
            },
            "create_vc": 0,
            "supporter_role": 0
        });
        let user = json!({
            "level": 0,
            "xp": 0,
            "last_message_time": 0
        });
        Self {
            config: into_map(config),
            user: into_map(user),
        }
    }

    /// Community `data` template.
    pub fn config(&self) -> &Map<String, Value> {
        &self.config
    }

    /// Member record template.
    pub fn user(&self) -> &Map<String, Value> {
        &self.user
    }

    pub fn levels(&self) -> Option<&Value> {
        self.config.get("levels")
    }

    pub fn with_config_override(&self, key: &str, value: Value) -> Self {
        let mut next = self.clone();
        next.config.insert(key.to_string(), value);
        next
    }

    pub fn with_user_override(&self, key: &str, value: Value) -> Self {
        let mut next = self.clone();
        next.user.insert(key.to_string(), value);
        next
    }
}

impl Default for Defaults {
    fn default() -> Self {
        Self::builtin()
    }
}

fn into_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Template entries whose key is absent from `existing`. Present keys are never
/// compared by value, so user-modified and nested values stay untouched.
pub fn missing_keys(template: &Map<String, Value>, existing: &Map<String, Value>) -> Map<String, Value> {
    template
        .iter()
        .filter(|(k, _)| !existing.contains_key(*k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_has_required_keys() {
        let d = Defaults::builtin();
        for key in ["level", "xp", "last_message_time"] {
            assert!(d.user().contains_key(key));
        }
        assert_eq!(d.levels().unwrap()["xp_per_level"], 100);
    }

    #[test]
    fn test_override_is_copy_on_write() {
        let base = Defaults::builtin();
        let variant = base.with_config_override("create_vc", json!(7));
        assert_eq!(base.config()["create_vc"], 0);
        assert_eq!(variant.config()["create_vc"], 7);
    }

    #[test]
    fn test_missing_keys_ignores_present_values() {
        let template = into_map(json!({"a": 1, "b": {"x": 1}, "c": 3}));
        let existing = into_map(json!({"a": 99, "b": {}}));
        let missing = missing_keys(&template, &existing);
        assert_eq!(Value::Object(missing), json!({"c": 3}));
    }
}
