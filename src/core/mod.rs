pub mod cancel;
pub mod dispatch;
pub mod lifecycle;
pub mod put;
pub mod query;
pub mod recur;

use std::collections::{HashMap, HashSet, VecDeque};

use serde_json::json;

use crate::config::Config;
use crate::error::{QuarryError, Result};
use crate::events::EventBus;
use crate::job::{FailureInfo, Job, JobState};
use crate::recurring::RecurringJob;
use crate::stats::{day_bin, QueueDayStats};
use crate::zset::ZSet;

/// Priority-then-FIFO work score: higher priority sorts higher, earlier
/// put-time breaks ties. The 1e10 divisor keeps any realistic timestamp
/// below one priority unit.
pub(crate) fn work_score(priority: i64, put_time: f64) -> f64 {
    priority as f64 - put_time / 1e10
}

/// The five ordered indices of a single queue.
#[derive(Debug, Default)]
pub struct QueueState {
    pub work: ZSet,
    pub locks: ZSet,
    pub scheduled: ZSet,
    pub recur: ZSet,
    pub depends: ZSet,
}

/// The whole keyspace as typed collections. Mutated only under the engine's
/// mutex, one operation at a time.
#[derive(Debug)]
pub struct State {
    pub(crate) config: Config,
    pub(crate) jobs: HashMap<String, Job>,
    pub(crate) recurring: HashMap<String, RecurringJob>,
    pub(crate) queues: HashMap<String, QueueState>,
    /// Queue name -> first-seen time.
    pub(crate) known_queues: ZSet,
    pub(crate) paused: HashSet<String>,
    /// Tracked jid -> tracked-at time.
    pub(crate) tracked: ZSet,
    /// Completed jid -> completed-at time.
    pub(crate) completed: ZSet,
    /// Worker name -> last-seen time.
    pub(crate) workers: ZSet,
    /// Worker name -> held jids scored by lease expiry.
    pub(crate) worker_jobs: HashMap<String, ZSet>,
    /// Tag -> jids scored by tagged-at time.
    pub(crate) tag_index: HashMap<String, ZSet>,
    /// Tag -> use count.
    pub(crate) tag_counts: ZSet,
    /// Failure group -> jids, head = most recently failed.
    pub(crate) failure_groups: HashMap<String, VecDeque<String>>,
    pub(crate) stats: HashMap<(u64, String), QueueDayStats>,
    pub(crate) bus: EventBus,
}

impl State {
    pub fn new() -> Self {
        Self {
            config: Config::new(),
            jobs: HashMap::new(),
            recurring: HashMap::new(),
            queues: HashMap::new(),
            known_queues: ZSet::new(),
            paused: HashSet::new(),
            tracked: ZSet::new(),
            completed: ZSet::new(),
            workers: ZSet::new(),
            worker_jobs: HashMap::new(),
            tag_index: HashMap::new(),
            tag_counts: ZSet::new(),
            failure_groups: HashMap::new(),
            stats: HashMap::new(),
            bus: EventBus::new(),
        }
    }

    pub(crate) fn queue_mut(&mut self, name: &str) -> &mut QueueState {
        self.queues.entry(name.to_string()).or_default()
    }

    /// Create the queue's indices and stamp its first-seen time.
    pub(crate) fn ensure_queue(&mut self, name: &str, now: f64) {
        self.queues.entry(name.to_string()).or_default();
        if !self.known_queues.contains(name) {
            self.known_queues.insert(name, now);
        }
    }

    /// Drop a jid from every index of one queue.
    pub(crate) fn remove_from_queue(&mut self, queue: &str, jid: &str) {
        if let Some(qs) = self.queues.get_mut(queue) {
            qs.work.remove(jid);
            qs.locks.remove(jid);
            qs.scheduled.remove(jid);
            qs.depends.remove(jid);
        }
    }

    pub(crate) fn remove_from_worker(&mut self, worker: &str, jid: &str) {
        if let Some(held) = self.worker_jobs.get_mut(worker) {
            held.remove(jid);
            if held.is_empty() {
                self.worker_jobs.remove(worker);
            }
        }
    }

    pub(crate) fn stats_mut(&mut self, bin: u64, queue: &str) -> &mut QueueDayStats {
        self.stats
            .entry((bin, queue.to_string()))
            .or_default()
    }

    pub(crate) fn is_tracked(&self, jid: &str) -> bool {
        self.tracked.contains(jid)
    }

    pub(crate) fn add_tag_index(&mut self, tag: &str, jid: &str, now: f64) {
        let added = self
            .tag_index
            .entry(tag.to_string())
            .or_default()
            .insert(jid, now);
        if added {
            self.tag_counts.incr(tag, 1.0);
        }
    }

    pub(crate) fn remove_tag_index(&mut self, tag: &str, jid: &str) {
        let mut removed = false;
        if let Some(idx) = self.tag_index.get_mut(tag) {
            removed = idx.remove(jid);
            if idx.is_empty() {
                self.tag_index.remove(tag);
            }
        }
        if removed && self.tag_counts.incr(tag, -1.0) <= 0.0 {
            self.tag_counts.remove(tag);
        }
    }

    pub(crate) fn push_failure(&mut self, group: &str, jid: &str) {
        self.failure_groups
            .entry(group.to_string())
            .or_default()
            .push_front(jid.to_string());
    }

    pub(crate) fn remove_failed_jid(&mut self, group: &str, jid: &str) {
        if let Some(list) = self.failure_groups.get_mut(group) {
            list.retain(|j| j != jid);
            if list.is_empty() {
                self.failure_groups.remove(group);
            }
        }
    }

    /// Shared failure transition: used by `fail`, retry exhaustion, and
    /// lock-expiry exhaustion. The caller has already detached the job from
    /// its worker's held set.
    pub(crate) fn mark_failed(
        &mut self,
        now: f64,
        jid: &str,
        group: &str,
        message: &str,
        worker: &str,
    ) {
        let Some(job) = self.jobs.get_mut(jid) else {
            return;
        };
        let queue = job.queue.clone();
        job.state = JobState::Failed;
        job.worker.clear();
        job.expires = 0.0;
        if let Some(last) = job.history.last_mut() {
            last.failed = Some(now);
        }
        job.failure = Some(FailureInfo {
            group: group.to_string(),
            message: message.to_string(),
            when: now,
            worker: worker.to_string(),
        });
        self.remove_from_queue(&queue, jid);
        self.push_failure(group, jid);
        let stats = self.stats_mut(day_bin(now), &queue);
        stats.failed += 1;
        stats.failures += 1;
        tracing::info!(jid, group, queue = %queue, "Job failed");
        self.bus.log(json!({
            "jid": jid,
            "event": "failed",
            "queue": queue,
            "group": group,
            "worker": worker,
            "message": message,
        }));
        if self.is_tracked(jid) {
            self.bus.notify("failed", jid);
        }
    }

    /// A dependent lost one prerequisite; release it to the work index if
    /// that was the last one.
    pub(crate) fn release_if_unblocked(&mut self, now: f64, jid: &str) {
        let Some(job) = self.jobs.get_mut(jid) else {
            return;
        };
        if !job.dependencies.is_empty() || job.state != JobState::Depends {
            return;
        }
        job.state = JobState::Waiting;
        let queue = job.queue.clone();
        let priority = job.priority;
        let qs = self.queue_mut(&queue);
        qs.depends.remove(jid);
        qs.work.insert(jid, work_score(priority, now));
    }

    pub(crate) fn job(&self, jid: &str) -> Result<&Job> {
        self.jobs
            .get(jid)
            .ok_or_else(|| QuarryError::JobNotFound(jid.to_string()))
    }

    pub(crate) fn job_mut(&mut self, jid: &str) -> Result<&mut Job> {
        self.jobs
            .get_mut(jid)
            .ok_or_else(|| QuarryError::JobNotFound(jid.to_string()))
    }

    /// Fencing checks shared by `complete`, `fail`, `retry`, `heartbeat`.
    pub(crate) fn check_running(job: &Job, worker: &str) -> Result<()> {
        if job.state != JobState::Running {
            return Err(QuarryError::JobNotRunning {
                jid: job.jid.clone(),
                state: job.state.to_string(),
            });
        }
        if job.worker != worker {
            return Err(QuarryError::WorkerMismatch {
                jid: job.jid.clone(),
                actual: job.worker.clone(),
                claimed: worker.to_string(),
            });
        }
        Ok(())
    }
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate an opaque payload string as JSON without interpreting it.
pub(crate) fn check_json(name: &str, raw: &str) -> Result<()> {
    serde_json::from_str::<serde_json::Value>(raw)
        .map(|_| ())
        .map_err(|e| QuarryError::invalid(name, format!("not valid JSON: {e}")))
}

pub(crate) fn check_now(now: f64) -> Result<()> {
    if now.is_finite() {
        Ok(())
    } else {
        Err(QuarryError::InvalidNow(now.to_string()))
    }
}
