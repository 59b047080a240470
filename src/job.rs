use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Waiting,
    Scheduled,
    Depends,
    Running,
    Complete,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Complete | JobState::Failed)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Waiting => write!(f, "waiting"),
            JobState::Scheduled => write!(f, "scheduled"),
            JobState::Depends => write!(f, "depends"),
            JobState::Running => write!(f, "running"),
            JobState::Complete => write!(f, "complete"),
            JobState::Failed => write!(f, "failed"),
        }
    }
}

/// One lifecycle stop in a job's history. A fresh entry is appended per put;
/// pop, completion, and failure annotate the latest entry in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub q: String,
    pub put: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub popped: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<f64>,
}

impl HistoryEntry {
    pub fn new(q: &str, put: f64) -> Self {
        Self {
            q: q.to_string(),
            put,
            popped: None,
            worker: None,
            failed: None,
            completed: None,
        }
    }
}

/// The last-failure record kept while a job sits in a failure group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureInfo {
    pub group: String,
    pub message: String,
    pub when: f64,
    pub worker: String,
}

/// A concrete unit of work.
///
/// `data` is an opaque JSON string: validated to parse at the boundary,
/// never interpreted. `queue` and `worker` use the empty string for "none",
/// and `expires == 0` means no live lease.
#[derive(Debug, Clone)]
pub struct Job {
    pub jid: String,
    pub klass: String,
    pub data: String,
    pub priority: i64,
    pub tags: Vec<String>,
    pub state: JobState,
    pub queue: String,
    pub worker: String,
    pub expires: f64,
    pub retries: i64,
    pub remaining: i64,
    pub history: Vec<HistoryEntry>,
    pub failure: Option<FailureInfo>,
    pub dependencies: HashSet<String>,
    pub dependents: HashSet<String>,
}

impl Job {
    /// The put-time of the job's current queue residency, used to build
    /// work-index scores. Falls back to `default` for a job with no history.
    pub fn last_put(&self, default: f64) -> f64 {
        self.history.last().map(|h| h.put).unwrap_or(default)
    }

    /// The client-facing document. Key names are part of the wire contract.
    pub fn document(&self, tracked: bool) -> Value {
        let mut dependencies: Vec<&String> = self.dependencies.iter().collect();
        dependencies.sort();
        let mut dependents: Vec<&String> = self.dependents.iter().collect();
        dependents.sort();
        json!({
            "jid": self.jid,
            "klass": self.klass,
            "state": self.state.to_string(),
            "queue": self.queue,
            "worker": self.worker,
            "tracked": tracked,
            "priority": self.priority,
            "expires": self.expires,
            "retries": self.retries,
            "remaining": self.remaining,
            "data": self.data,
            "tags": self.tags,
            "history": self.history,
            "failure": self.failure.as_ref().map(|f| json!(f)).unwrap_or_else(|| json!({})),
            "dependencies": dependencies,
            "dependents": dependents,
        })
    }
}
