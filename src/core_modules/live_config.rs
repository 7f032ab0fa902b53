// THEORY:
// The live configuration is the only channel between the tuner and the detection
// pipeline it tunes. Before every trial the controller writes the current value of
// every parameter into it, and the scorer reads whatever keys it cares about. It is
// an ordinary value passed by reference into each scorer call, never global state.

use std::collections::BTreeMap;

/// A key -> scalar table read by the external detection pipeline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiveConfig {
    values: BTreeMap<String, f64>,
}

impl LiveConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: f64) {
        self.values.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied()
    }

    /// Reads `key`, falling back to `default` when the tuner does not manage it.
    pub fn get_or(&self, key: &str, default: f64) -> f64 {
        self.get(key).unwrap_or(default)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for LiveConfig {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        let mut config = Self::new();
        for (k, v) in iter {
            config.set(k, v);
        }
        config
    }
}
