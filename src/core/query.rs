use serde_json::{json, Map, Value};

use crate::error::{QuarryError, Result};
use crate::stats::day_bin;

use super::State;

/// A tag-index operation.
#[derive(Debug, Clone)]
pub enum TagOp {
    Add { jid: String, tags: Vec<String> },
    Remove { jid: String, tags: Vec<String> },
    Get { tag: String, offset: usize, count: usize },
    Top { offset: usize, count: usize },
}

impl State {
    /// The full client-facing document for one job.
    pub fn get(&self, jid: &str) -> Result<Value> {
        let job = self.job(jid)?;
        Ok(job.document(self.is_tracked(jid)))
    }

    /// Page through jids by state. `complete` pages the global completed
    /// set (newest first); the rest page one queue's index.
    pub fn jobs(
        &self,
        now: f64,
        state: &str,
        queue: &str,
        offset: usize,
        count: usize,
    ) -> Result<Vec<String>> {
        if state == "complete" {
            return Ok(self.completed.rev_range(offset, count));
        }
        let Some(qs) = self.queues.get(queue) else {
            return Ok(Vec::new());
        };
        match state {
            // A lease expiring exactly at `now` counts as stalled, matching
            // the reclamation cutoff.
            "running" => Ok(qs
                .locks
                .members()
                .into_iter()
                .filter(|jid| qs.locks.score(jid).map_or(false, |s| s > now))
                .skip(offset)
                .take(count)
                .collect()),
            "stalled" => Ok(qs
                .locks
                .range_by_score(now, offset + count)
                .into_iter()
                .skip(offset)
                .take(count)
                .collect()),
            "scheduled" => Ok(qs.scheduled.range(offset, count)),
            "depends" => Ok(qs.depends.range(offset, count)),
            "recurring" => Ok(qs.recur.range(offset, count)),
            other => Err(QuarryError::invalid(
                "state",
                format!("cannot list jobs in state {other}"),
            )),
        }
    }

    /// Counts for one queue or, with no name, every known queue by name.
    pub fn queues_info(&self, now: f64, queue: Option<&str>) -> Value {
        match queue {
            Some(name) => self.queue_counts(now, name),
            None => {
                let mut names = self.known_queues.members();
                names.sort();
                Value::Array(names.iter().map(|n| self.queue_counts(now, n)).collect())
            }
        }
    }

    fn queue_counts(&self, now: f64, name: &str) -> Value {
        let empty = super::QueueState::default();
        let qs = self.queues.get(name).unwrap_or(&empty);
        let stalled = qs.locks.range_by_score(now, usize::MAX).len();
        json!({
            "name": name,
            "paused": self.paused.contains(name),
            "waiting": qs.work.len(),
            "running": qs.locks.len() - stalled,
            "stalled": stalled,
            "scheduled": qs.scheduled.len(),
            "depends": qs.depends.len(),
            "recurring": qs.recur.len(),
        })
    }

    /// The worker registry: held/stalled counts for every live worker, or
    /// the jid lists for one worker. Ages out workers idle longer than
    /// `max-worker-age`.
    pub fn workers_info(&mut self, now: f64, worker: Option<&str>) -> Value {
        let age = self.config.get_f64("max-worker-age", 86400.0);
        self.workers.remove_range_by_score(now - age);
        match worker {
            Some(name) => {
                let (jobs, stalled) = self.worker_job_lists(now, name);
                json!({"jobs": jobs, "stalled": stalled})
            }
            None => {
                let workers: Vec<Value> = self
                    .workers
                    .rev_range(0, usize::MAX)
                    .into_iter()
                    .map(|name| {
                        let (jobs, stalled) = self.worker_job_lists(now, &name);
                        json!({
                            "name": name,
                            "jobs": jobs.len(),
                            "stalled": stalled.len(),
                        })
                    })
                    .collect();
                Value::Array(workers)
            }
        }
    }

    fn worker_job_lists(&self, now: f64, worker: &str) -> (Vec<String>, Vec<String>) {
        match self.worker_jobs.get(worker) {
            Some(held) => {
                let stalled = held.range_by_score(now, usize::MAX);
                let jobs = held
                    .members()
                    .into_iter()
                    .filter(|jid| held.score(jid).map_or(false, |s| s > now))
                    .collect();
                (jobs, stalled)
            }
            None => (Vec::new(), Vec::new()),
        }
    }

    /// Failure-group overview, or one group's page (most recent first).
    pub fn failed_info(&self, group: Option<&str>, start: usize, limit: usize) -> Value {
        match group {
            Some(name) => {
                let list = self.failure_groups.get(name);
                let total = list.map(|l| l.len()).unwrap_or(0);
                let jobs: Vec<&String> = list
                    .map(|l| l.iter().skip(start).take(limit).collect())
                    .unwrap_or_default();
                json!({"total": total, "jobs": jobs})
            }
            None => {
                let mut groups: Vec<(&String, usize)> = self
                    .failure_groups
                    .iter()
                    .map(|(group, list)| (group, list.len()))
                    .collect();
                groups.sort();
                let mut map = Map::new();
                for (group, len) in groups {
                    map.insert(group.clone(), json!(len));
                }
                Value::Object(map)
            }
        }
    }

    /// Statistics document for one queue on the day containing `date`.
    pub fn stats_info(&self, date: f64, queue: &str) -> Value {
        match self.stats.get(&(day_bin(date), queue.to_string())) {
            Some(stats) => stats.document(),
            None => crate::stats::QueueDayStats::default().document(),
        }
    }

    pub fn length(&self, queue: &str) -> usize {
        match self.queues.get(queue) {
            Some(qs) => qs.work.len() + qs.locks.len() + qs.scheduled.len(),
            None => 0,
        }
    }

    pub fn pause(&mut self, queues: &[&str]) -> usize {
        let mut changed = 0;
        for queue in queues {
            if self.paused.insert(queue.to_string()) {
                changed += 1;
            }
        }
        changed
    }

    pub fn unpause(&mut self, queues: &[&str]) -> usize {
        let mut changed = 0;
        for queue in queues {
            if self.paused.remove(*queue) {
                changed += 1;
            }
        }
        changed
    }

    /// Start publishing lifecycle events for a job. Returns true if the jid
    /// was not already tracked.
    pub fn track(&mut self, now: f64, jid: &str) -> Result<bool> {
        self.job(jid)?;
        let added = self.tracked.insert(jid, now);
        if added {
            self.bus.notify("track", jid);
        }
        Ok(added)
    }

    pub fn untrack(&mut self, jid: &str) -> Result<bool> {
        let removed = self.tracked.remove(jid);
        if removed {
            self.bus.notify("untrack", jid);
        }
        Ok(removed)
    }

    /// All tracked jobs: live ones as documents, vanished ones as jids.
    pub fn tracked_info(&self) -> Value {
        let mut jobs = Vec::new();
        let mut expired = Vec::new();
        for jid in self.tracked.members() {
            match self.jobs.get(&jid) {
                Some(job) => jobs.push(job.document(true)),
                None => expired.push(jid),
            }
        }
        json!({"jobs": jobs, "expired": expired})
    }

    pub fn tag(&mut self, now: f64, op: TagOp) -> Result<Value> {
        match op {
            TagOp::Add { jid, tags } => {
                self.job(&jid)?;
                for tag in &tags {
                    let job = self.job(&jid)?;
                    if !job.tags.contains(tag) {
                        self.job_mut(&jid)?.tags.push(tag.clone());
                        self.add_tag_index(tag, &jid, now);
                    }
                }
                Ok(json!(self.job(&jid)?.tags))
            }
            TagOp::Remove { jid, tags } => {
                self.job(&jid)?;
                for tag in &tags {
                    let had = self.job(&jid)?.tags.contains(tag);
                    if had {
                        self.job_mut(&jid)?.tags.retain(|t| t != tag);
                        self.remove_tag_index(tag, &jid);
                    }
                }
                Ok(json!(self.job(&jid)?.tags))
            }
            TagOp::Get { tag, offset, count } => {
                let (total, jobs) = match self.tag_index.get(&tag) {
                    Some(idx) => (idx.len(), idx.range(offset, count)),
                    None => (0, Vec::new()),
                };
                Ok(json!({"total": total, "jobs": jobs}))
            }
            TagOp::Top { offset, count } => {
                // Only tags in active use on more than one job are "top".
                Ok(json!(self.tag_counts.rev_range_by_score(2.0, offset, count)))
            }
        }
    }
}
