use serde_json::{json, Value};

/// A recurring job template. Spawned instances are ordinary jobs with jids
/// `<jid>-<count>`; the template itself never enters a work index.
#[derive(Debug, Clone)]
pub struct RecurringJob {
    pub jid: String,
    pub klass: String,
    pub data: String,
    pub priority: i64,
    pub tags: Vec<String>,
    pub queue: String,
    pub interval: f64,
    pub count: u64,
    pub retries: i64,
}

impl RecurringJob {
    pub fn document(&self) -> Value {
        json!({
            "jid": self.jid,
            "klass": self.klass,
            "state": "recur",
            "type": "interval",
            "queue": self.queue,
            "priority": self.priority,
            "interval": self.interval,
            "retries": self.retries,
            "count": self.count,
            "data": self.data,
            "tags": self.tags,
        })
    }
}
