//! # Config Override Options
//!
//! [`ConfigOptions`] maps dotted keys (``"model.num_classes"``,
//! ``"data.test.pipeline.1.size"``) to JSON values.
//!
//! Merging expands each key into a nested mapping and merges it into the
//! config tree: mappings merge recursively, other values replace, and an
//! integer key segment indexes an existing list element.

use crate::config::InferenceConfig;
use crate::errors::{InferError, InferResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Dotted-key override options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigOptions {
    entries: BTreeMap<String, Value>,
}

impl ConfigOptions {
    /// Create an empty option set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an override.
    pub fn with<K: Into<String>, V: Into<Value>>(
        mut self,
        key: K,
        value: V,
    ) -> Self {
        self.insert(key, value);
        self
    }

    /// Add an override, replacing any previous value for `key`.
    pub fn insert<K: Into<String>, V: Into<Value>>(
        &mut self,
        key: K,
        value: V,
    ) {
        self.entries.insert(key.into(), value.into());
    }

    /// The number of overrides.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if there are no overrides.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate the overrides in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }

    /// Merge the overrides into a copy of `config`.
    pub fn merge_into(
        &self,
        config: &InferenceConfig,
    ) -> InferResult<InferenceConfig> {
        let mut tree = serde_json::to_value(config)
            .map_err(|err| InferError::config_option("<config>", err.to_string()))?;

        for (key, value) in self.iter() {
            tracing::debug!(key, %value, "merging config option");
            let path: Vec<&str> = key.split('.').collect();
            merge_at(&mut tree, &path, value.clone(), key)?;
        }

        serde_json::from_value(tree).map_err(|err| {
            let keys = self.entries.keys().cloned().collect::<Vec<_>>().join(", ");
            InferError::config_option(keys, err.to_string())
        })
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for ConfigOptions {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut options = Self::new();
        for (k, v) in iter {
            options.insert(k, v);
        }
        options
    }
}

fn merge_at(
    target: &mut Value,
    path: &[&str],
    value: Value,
    key: &str,
) -> InferResult<()> {
    let Some((head, rest)) = path.split_first() else {
        merge_value(target, value);
        return Ok(());
    };

    if target.is_null() {
        *target = Value::Object(Map::new());
    }

    match target {
        Value::Object(map) => {
            let slot = map.entry(head.to_string()).or_insert(Value::Null);
            merge_at(slot, rest, value, key)
        }
        Value::Array(items) => {
            let index: usize = head.parse().map_err(|_| {
                InferError::config_option(key, format!("`{head}` is not a list index"))
            })?;
            let len = items.len();
            let slot = items.get_mut(index).ok_or_else(|| {
                InferError::config_option(
                    key,
                    format!("list index {index} out of range for {len} items"),
                )
            })?;
            merge_at(slot, rest, value, key)
        }
        _ => Err(InferError::config_option(
            key,
            format!("cannot set `{head}` on a non-mapping value"),
        )),
    }
}

fn merge_value(
    target: &mut Value,
    value: Value,
) {
    match (target, value) {
        (Value::Object(existing), Value::Object(update)) => {
            for (k, v) in update {
                merge_value(existing.entry(k).or_insert(Value::Null), v);
            }
        }
        (target, value) => *target = value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{ResizeSize, TransformStage};
    use crate::testing::tiny_inference_config;
    use serde_json::json;

    #[test]
    fn test_options_builder() {
        let options = ConfigOptions::new()
            .with("model.num_classes", 7)
            .with("model.softmax", false);
        assert_eq!(options.len(), 2);
        assert!(!options.is_empty());

        let collected: ConfigOptions = [("model.num_classes", json!(7)), ("model.softmax", json!(false))]
            .into_iter()
            .collect();
        assert_eq!(options, collected);
    }

    #[test]
    fn test_merge_nested_mapping() {
        let config = tiny_inference_config(3);
        let options = ConfigOptions::new().with("model.vit", json!({"n_layers": 3}));

        let merged = options.merge_into(&config).unwrap();
        assert_eq!(merged.model.vit.n_layers, 3);
        // Sibling keys of a merged mapping survive.
        assert_eq!(merged.model.vit.d_model, config.model.vit.d_model);
    }

    #[test]
    fn test_merge_list_index() {
        let config = tiny_inference_config(3);
        assert!(matches!(
            config.test_pipeline()[1],
            TransformStage::Resize { .. }
        ));

        let options = ConfigOptions::new().with("data.test.pipeline.1.size", json!(48));
        let merged = options.merge_into(&config).unwrap();

        match &merged.test_pipeline()[1] {
            TransformStage::Resize { size, .. } => assert_eq!(size, &ResizeSize::Square(48)),
            other => panic!("unexpected stage: {other:?}"),
        }
    }

    #[test]
    fn test_merge_bad_list_index() {
        let config = tiny_inference_config(3);

        let options = ConfigOptions::new().with("data.test.pipeline.99.size", json!(48));
        let err = options.merge_into(&config).unwrap_err();
        match err {
            InferError::ConfigOption { key, message } => {
                assert_eq!(key, "data.test.pipeline.99.size");
                assert!(message.contains("out of range"));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let options = ConfigOptions::new().with("data.test.pipeline.first", json!(1));
        assert!(options.merge_into(&config).is_err());
    }

    #[test]
    fn test_merge_invalid_result() {
        let config = tiny_inference_config(3);
        let options = ConfigOptions::new().with("model.num_classes", "seven");
        assert!(matches!(
            options.merge_into(&config),
            Err(InferError::ConfigOption { .. })
        ));
    }

    #[test]
    fn test_merge_sets_null_field() {
        let config = tiny_inference_config(3);
        assert!(config.model.vit.pretrained.is_none());

        let options = ConfigOptions::new().with("model.vit.pretrained", "weights/vit");
        let merged = options.merge_into(&config).unwrap();
        assert_eq!(merged.model.vit.pretrained.as_deref(), Some("weights/vit"));
    }
}
