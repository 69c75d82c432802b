use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Loosely typed value from an analyzer's settings map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// String-keyed options handed to an analyzer when it is configured.
///
/// Lookups are typed and forgiving: a key that is missing or holds a value of
/// the wrong kind reads as `None`, and keys no analyzer asks for are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnalyzerSettings {
    values: HashMap<String, SettingValue>,
}

impl AnalyzerSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: SettingValue) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: SettingValue) {
        self.values.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&SettingValue> {
        self.values.get(key)
    }

    pub fn float(&self, key: &str) -> Option<f64> {
        match self.values.get(key)? {
            SettingValue::Float(v) => Some(*v),
            SettingValue::Int(v) => Some(*v as f64),
            SettingValue::Text(s) => s.trim().parse().ok(),
            SettingValue::Bool(_) => None,
        }
    }

    /// Reads a float and keeps it only if it lies in `[0, 1]`.
    pub fn unit_float(&self, key: &str) -> Option<f32> {
        self.float(key)
            .filter(|v| (0.0..=1.0).contains(v))
            .map(|v| v as f32)
    }

    pub fn int(&self, key: &str) -> Option<i64> {
        match self.values.get(key)? {
            SettingValue::Int(v) => Some(*v),
            SettingValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Reads a strictly positive integer as a count.
    pub fn count(&self, key: &str) -> Option<usize> {
        self.int(key).filter(|v| *v > 0).map(|v| v as usize)
    }

    pub fn bool(&self, key: &str) -> Option<bool> {
        match self.values.get(key)? {
            SettingValue::Bool(v) => Some(*v),
            SettingValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_lookups_ignore_mismatched_values() {
        let settings = AnalyzerSettings::new()
            .with("confidence_threshold", SettingValue::Float(0.4))
            .with("max_tracked_objects", SettingValue::Int(3))
            .with("tracking_enabled", SettingValue::Bool(true))
            .with("unrelated", SettingValue::Text("whatever".to_string()));

        assert_eq!(settings.unit_float("confidence_threshold"), Some(0.4));
        assert_eq!(settings.count("max_tracked_objects"), Some(3));
        assert_eq!(settings.bool("tracking_enabled"), Some(true));
        assert_eq!(settings.bool("max_tracked_objects"), None);
        assert_eq!(settings.float("missing"), None);
    }

    #[test]
    fn out_of_range_values_read_as_absent() {
        let settings = AnalyzerSettings::new()
            .with("confidence_threshold", SettingValue::Float(1.5))
            .with("history_size", SettingValue::Int(0));

        assert_eq!(settings.unit_float("confidence_threshold"), None);
        assert_eq!(settings.count("history_size"), None);
    }

    #[test]
    fn deserializes_mixed_value_map() {
        let json = r#"{"confidence_threshold": 0.5, "history_size": 12, "tracking_enabled": false, "mode": "fast"}"#;
        let settings: AnalyzerSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.len(), 4);
        assert_eq!(settings.float("history_size"), Some(12.0));
        assert_eq!(
            settings.get("mode"),
            Some(&SettingValue::Text("fast".to_string()))
        );
    }
}
