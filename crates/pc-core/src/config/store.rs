//! Layered key/value configuration store
//!
//! Lookups resolve, highest priority first:
//!
//! 1. values from the local startup file
//! 2. an environment variable with the same name as the key
//! 3. the last document fetched from the central server
//! 4. built-in defaults
//!
//! String values coming from any layer are coerced to the type of the key's
//! default, so `HEARTBEAT_INTERVAL="30"` in the environment reads as the
//! number 30 and `UPLOAD_FAILED_REPLAY_ON_START="1"` reads as `true`.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::ConfigError;

/// Looks up an environment override for a key
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Process-wide configuration shared by every loop
pub struct ConfigStore {
    defaults: Map<String, Value>,
    layers: RwLock<Layers>,
    env: EnvLookup,
}

#[derive(Default)]
struct Layers {
    local: Map<String, Value>,
    remote: Map<String, Value>,
}

impl ConfigStore {
    /// Create a store over `defaults` and the local startup values, reading
    /// overrides from the process environment.
    pub fn new(defaults: Map<String, Value>, local: Map<String, Value>) -> Self {
        Self {
            defaults,
            layers: RwLock::new(Layers {
                local,
                remote: Map::new(),
            }),
            env: Arc::new(|key: &str| std::env::var(key).ok()),
        }
    }

    /// Replace the environment lookup
    pub fn with_env(mut self, env: EnvLookup) -> Self {
        self.env = env;
        self
    }

    /// Consistent view for reading several keys.
    ///
    /// The view holds the read lock, so every key read through it sees the
    /// same remote document. Drop it before calling anything that writes.
    pub fn view(&self) -> ConfigView<'_> {
        ConfigView {
            store: self,
            layers: self.layers.read().unwrap_or_else(PoisonError::into_inner),
        }
    }

    /// Resolve a key through all layers
    pub fn get(&self, key: &str) -> Option<Value> {
        self.view().get(key)
    }

    /// Resolve a key and deserialize it
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<T, ConfigError> {
        let value = self
            .get(key)
            .ok_or_else(|| ConfigError::Invalid(format!("{} is not set", key)))?;
        serde_json::from_value(value).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }

    /// Resolve a key as an unsigned integer
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.view().get_u64(key)
    }

    /// Resolve a key as a finite number
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.view().get_f64(key)
    }

    /// Resolve a key as a boolean
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.view().get_bool(key)
    }

    /// Resolve a key as a string; scalars are rendered, containers are not
    pub fn get_str(&self, key: &str) -> Option<String> {
        self.view().get_str(key)
    }

    /// Merge a freshly fetched remote document.
    ///
    /// The whole document is applied under one write lock, so readers see
    /// either none or all of it.
    pub fn merge_remote(&self, document: Map<String, Value>) {
        let mut layers = self.layers.write().unwrap_or_else(PoisonError::into_inner);
        layers.remote.extend(document);
    }

    /// Set a local value, as if it had come from the startup file
    pub fn set_local(&self, key: impl Into<String>, value: Value) {
        let mut layers = self.layers.write().unwrap_or_else(PoisonError::into_inner);
        layers.local.insert(key.into(), value);
    }

    /// Built-in default for a key
    pub fn default_for(&self, key: &str) -> Option<&Value> {
        self.defaults.get(key)
    }

    fn coerce(&self, key: &str, value: Value) -> Value {
        match (self.defaults.get(key), value) {
            (Some(default), Value::String(raw)) => coerce_str(default, raw),
            (_, value) => value,
        }
    }
}

/// Read access to the store under a single lock acquisition
pub struct ConfigView<'a> {
    store: &'a ConfigStore,
    layers: RwLockReadGuard<'a, Layers>,
}

impl ConfigView<'_> {
    /// Resolve a key through all layers
    pub fn get(&self, key: &str) -> Option<Value> {
        if let Some(value) = self.layers.local.get(key).filter(|v| !v.is_null()) {
            return Some(self.store.coerce(key, value.clone()));
        }
        if let Some(raw) = (self.store.env)(key) {
            return Some(self.store.coerce(key, Value::String(raw)));
        }
        match self.layers.remote.get(key).filter(|v| !v.is_null()) {
            Some(value) => Some(self.store.coerce(key, value.clone())),
            None => self.store.defaults.get(key).cloned(),
        }
    }

    /// Resolve a key as an unsigned integer; fractional values are refused
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        match self.get(key)? {
            Value::Number(n) => n.as_u64().or_else(|| {
                n.as_f64()
                    .filter(|f| *f >= 0.0 && f.fract() == 0.0 && *f <= u64::MAX as f64)
                    .map(|f| f as u64)
            }),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Resolve a key as a finite number
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        let value = match self.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        value.filter(|f| f.is_finite())
    }

    /// Resolve a key as a boolean
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key)? {
            Value::Bool(b) => Some(b),
            Value::String(s) => Some(truthy(&s)),
            Value::Number(n) => n.as_u64().map(|n| n != 0),
            _ => None,
        }
    }

    /// Resolve a key as a string; scalars are rendered, containers are not
    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

fn truthy(raw: &str) -> bool {
    matches!(raw, "true" | "True" | "1")
}

/// Convert a textual value to the type of `default`, leaving it a string when
/// it does not parse.
fn coerce_str(default: &Value, raw: String) -> Value {
    match default {
        Value::Bool(_) => Value::Bool(truthy(&raw)),
        Value::Number(n) => {
            let trimmed = raw.trim();
            let parsed = if n.is_f64() {
                trimmed.parse::<f64>().ok().and_then(serde_json::Number::from_f64)
            } else if let Ok(u) = trimmed.parse::<u64>() {
                Some(u.into())
            } else {
                trimmed.parse::<i64>().ok().map(Into::into)
            };
            parsed.map(Value::Number).unwrap_or(Value::String(raw))
        }
        Value::Array(_) | Value::Object(_) => serde_json::from_str(&raw).unwrap_or(Value::String(raw)),
        _ => Value::String(raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> EnvLookup {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Arc::new(move |key: &str| vars.get(key).cloned())
    }

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn store(defaults: Value, local: Value, env: &[(&str, &str)]) -> ConfigStore {
        ConfigStore::new(map(defaults), map(local)).with_env(env_from(env))
    }

    #[test]
    fn test_env_beats_default() {
        let store = store(json!({"TIMEOUT": 60}), json!({}), &[("TIMEOUT", "30")]);
        assert_eq!(store.get("TIMEOUT"), Some(json!(30)));
        assert_eq!(store.get_u64("TIMEOUT"), Some(30));
    }

    #[test]
    fn test_env_beats_remote() {
        let store = store(json!({"TIMEOUT": 60}), json!({}), &[("TIMEOUT", "30")]);
        store.merge_remote(map(json!({"TIMEOUT": 10})));
        assert_eq!(store.get_u64("TIMEOUT"), Some(30));
    }

    #[test]
    fn test_local_beats_env_and_remote() {
        let store = store(json!({"TIMEOUT": 60}), json!({"TIMEOUT": 45}), &[("TIMEOUT", "30")]);
        store.merge_remote(map(json!({"TIMEOUT": 10})));
        assert_eq!(store.get_u64("TIMEOUT"), Some(45));
    }

    #[test]
    fn test_remote_beats_default() {
        let store = store(json!({"TIMEOUT": 60}), json!({}), &[]);
        store.merge_remote(map(json!({"TIMEOUT": 10})));
        assert_eq!(store.get_u64("TIMEOUT"), Some(10));
    }

    #[test]
    fn test_null_local_value_falls_through() {
        let store = store(json!({"TIMEOUT": 60}), json!({"TIMEOUT": null}), &[]);
        assert_eq!(store.get_u64("TIMEOUT"), Some(60));
    }

    #[test]
    fn test_bool_coercion_from_text() {
        let store = store(
            json!({"A": false, "B": false, "C": true, "D": true}),
            json!({}),
            &[("A", "true"), ("B", "1"), ("C", "yes"), ("D", "0")],
        );
        assert_eq!(store.get_bool("A"), Some(true));
        assert_eq!(store.get_bool("B"), Some(true));
        assert_eq!(store.get_bool("C"), Some(false));
        assert_eq!(store.get_bool("D"), Some(false));
    }

    #[test]
    fn test_structured_default_accepts_json_text() {
        let store = store(
            json!({"REPLAY_STORAGE": {"TYPE": "server"}, "ALLOW_SSH_USER": []}),
            json!({}),
            &[
                ("REPLAY_STORAGE", r#"{"TYPE": "s3", "BUCKET": "replays"}"#),
                ("ALLOW_SSH_USER", "not json"),
            ],
        );
        assert_eq!(
            store.get("REPLAY_STORAGE"),
            Some(json!({"TYPE": "s3", "BUCKET": "replays"}))
        );
        assert_eq!(store.get("ALLOW_SSH_USER"), Some(json!("not json")));
    }

    #[test]
    fn test_unparseable_number_stays_text() {
        let store = store(json!({"SSHD_PORT": 2222}), json!({}), &[("SSHD_PORT", "abc")]);
        assert_eq!(store.get("SSHD_PORT"), Some(json!("abc")));
        assert_eq!(store.get_u64("SSHD_PORT"), None);
    }

    #[test]
    fn test_remote_text_is_coerced() {
        let store = store(json!({"SECURITY_MAX_IDLE_TIME": 60}), json!({}), &[]);
        store.merge_remote(map(json!({"SECURITY_MAX_IDLE_TIME": "15"})));
        assert_eq!(store.get("SECURITY_MAX_IDLE_TIME"), Some(json!(15)));
    }

    #[test]
    fn test_unknown_key_without_default() {
        let store = store(json!({}), json!({}), &[]);
        assert_eq!(store.get("NOPE"), None);
        assert!(store.get_as::<String>("NOPE").is_err());
    }

    #[test]
    fn test_get_as_structured() {
        let store = store(json!({"ALLOW_SSH_USER": []}), json!({"ALLOW_SSH_USER": ["root"]}), &[]);
        let users: Vec<String> = store.get_as("ALLOW_SSH_USER").unwrap();
        assert_eq!(users, vec!["root".to_string()]);
    }

    #[test]
    fn test_fractional_numbers() {
        let store = store(json!({"IDLE": 60}), json!({}), &[("PORT", "22.5")]);
        store.merge_remote(map(json!({"IDLE": 0.5, "WHOLE": 30.0})));

        assert_eq!(store.get_u64("IDLE"), None);
        assert_eq!(store.get_f64("IDLE"), Some(0.5));
        assert_eq!(store.get_u64("WHOLE"), Some(30));
        assert_eq!(store.get_u64("PORT"), None);
        assert_eq!(store.get_f64("PORT"), Some(22.5));
    }

    #[test]
    fn test_view_sees_one_document() {
        let store = Arc::new(store(json!({"A": 0, "B": 0}), json!({}), &[]));
        let writer = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for i in 0..2000u64 {
                    store.merge_remote(map(json!({"A": i, "B": i})));
                }
            })
        };

        for _ in 0..2000 {
            let view = store.view();
            assert_eq!(view.get_u64("A"), view.get_u64("B"));
        }
        writer.join().unwrap();
    }

    #[test]
    fn test_merge_remote_keeps_previous_keys() {
        let store = store(json!({}), json!({}), &[]);
        store.merge_remote(map(json!({"A": 1})));
        store.merge_remote(map(json!({"B": 2})));
        assert_eq!(store.get("A"), Some(json!(1)));
        assert_eq!(store.get("B"), Some(json!(2)));
    }
}
