use std::collections::BTreeMap;

/// Configuration defaults. Unknown keys set at runtime are accepted and
/// stored alongside these.
const DEFAULTS: &[(&str, &str)] = &[
    ("heartbeat", "60"),
    ("jobs-history", "604800"),
    ("jobs-history-count", "50000"),
    ("max-worker-age", "86400"),
];

/// Runtime key/value configuration with per-queue overrides.
///
/// A key `k` can be overridden for a single queue by setting `<queue>-<k>`;
/// lookups consult the queue-scoped key first, then the global key, then the
/// built-in default.
#[derive(Debug, Clone, Default)]
pub struct Config {
    values: BTreeMap<String, String>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_string(), value.to_string());
    }

    pub fn unset(&mut self, key: &str) {
        self.values.remove(key);
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.values
            .get(key)
            .cloned()
            .or_else(|| default_for(key).map(str::to_string))
    }

    /// Numeric lookup, falling back to `fallback` on unset or unparseable.
    pub fn get_f64(&self, key: &str, fallback: f64) -> f64 {
        self.get(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(fallback)
    }

    /// Queue-scoped numeric lookup: `<queue>-<key>` wins over `<key>`.
    pub fn get_for_queue(&self, queue: &str, key: &str, fallback: f64) -> f64 {
        let scoped = format!("{queue}-{key}");
        if let Some(v) = self.values.get(&scoped) {
            if let Ok(v) = v.parse() {
                return v;
            }
        }
        self.get_f64(key, fallback)
    }

    pub fn heartbeat(&self, queue: &str) -> f64 {
        self.get_for_queue(queue, "heartbeat", 60.0)
    }

    /// The effective configuration: defaults overlaid with explicit values.
    pub fn all(&self) -> BTreeMap<String, String> {
        let mut map: BTreeMap<String, String> = DEFAULTS
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        for (k, v) in &self.values {
            map.insert(k.clone(), v.clone());
        }
        map
    }
}

fn default_for(key: &str) -> Option<&'static str> {
    DEFAULTS.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}
