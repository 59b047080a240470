use std::collections::HashSet;

use serde_json::json;

use crate::error::{QuarryError, Result};
use crate::job::{HistoryEntry, JobState};
use crate::stats::day_bin;

use super::{check_json, work_score, State};

/// Optional `complete` parameters: advance the job into `next` rather than
/// finishing it, with an optional delay or fresh dependencies.
#[derive(Debug, Default, Clone)]
pub struct CompleteOptions {
    pub next: Option<String>,
    pub delay: f64,
    pub depends: Vec<String>,
}

impl State {
    /// Finish a running job, either terminally or by advancing it into the
    /// next queue of a chain. Returns the resulting state name.
    pub fn complete(
        &mut self,
        now: f64,
        jid: &str,
        worker: &str,
        queue: &str,
        data: Option<&str>,
        opts: CompleteOptions,
    ) -> Result<String> {
        if let Some(data) = data {
            check_json("data", data)?;
        }
        if !opts.delay.is_finite() || opts.delay < 0.0 {
            return Err(QuarryError::invalid("delay", "must be a non-negative number"));
        }
        if opts.next.is_none() && (opts.delay > 0.0 || !opts.depends.is_empty()) {
            return Err(QuarryError::invalid(
                "next",
                "delay and depends require a next queue",
            ));
        }
        if opts.delay > 0.0 && !opts.depends.is_empty() {
            return Err(QuarryError::Conflict(
                "delay and depends cannot be used together".to_string(),
            ));
        }
        {
            let job = self.job(jid)?;
            Self::check_running(job, worker)?;
            if job.queue != queue {
                return Err(QuarryError::QueueMismatch {
                    jid: jid.to_string(),
                    actual: job.queue.clone(),
                    claimed: queue.to_string(),
                });
            }
        }

        self.remove_from_worker(worker, jid);
        self.queue_mut(queue).locks.remove(jid);

        let job = self.job_mut(jid)?;
        if let Some(data) = data {
            job.data = data.to_string();
        }
        job.worker.clear();
        job.expires = 0.0;
        let mut run_sample = None;
        if let Some(last) = job.history.last_mut() {
            last.completed = Some(now);
            run_sample = last.popped.map(|popped| now - popped);
        }
        if let Some(run) = run_sample {
            self.stats_mut(day_bin(now), queue).run.record(run);
        }

        let result = match opts.next {
            Some(ref next) => {
                let pending = self.link_dependencies(jid, &opts.depends)?;
                let job = self.job_mut(jid)?;
                job.queue = next.clone();
                // Placement resets the retry budget, as a put would.
                job.remaining = job.retries;
                job.history.push(HistoryEntry::new(next, now));
                let priority = job.priority;
                let state = if opts.delay > 0.0 {
                    JobState::Scheduled
                } else if !pending.is_empty() {
                    JobState::Depends
                } else {
                    JobState::Waiting
                };
                job.state = state;
                let qs = self.queue_mut(next);
                match state {
                    JobState::Scheduled => qs.scheduled.insert(jid, now + opts.delay),
                    JobState::Depends => qs.depends.insert(jid, now),
                    _ => qs.work.insert(jid, work_score(priority, now)),
                };
                self.ensure_queue(next, now);
                tracing::debug!(jid, from = queue, to = %next, "Job advanced");
                self.bus.log(json!({
                    "jid": jid,
                    "event": "advanced",
                    "queue": queue,
                    "to": next,
                }));
                state.to_string()
            }
            None => {
                let job = self.job_mut(jid)?;
                job.state = JobState::Complete;
                job.queue = String::new();
                self.completed.insert(jid, now);
                self.prune_completed(now);
                tracing::debug!(jid, queue, "Job completed");
                self.bus
                    .log(json!({"jid": jid, "event": "completed", "queue": queue}));
                if self.is_tracked(jid) {
                    self.bus.notify("completed", jid);
                }
                JobState::Complete.to_string()
            }
        };

        // The work itself is done either way, so dependents are released.
        let dependents = std::mem::take(&mut self.job_mut(jid)?.dependents);
        for dependent in dependents {
            if let Some(other) = self.jobs.get_mut(&dependent) {
                other.dependencies.remove(jid);
            }
            self.release_if_unblocked(now, &dependent);
        }
        Ok(result)
    }

    /// Mark a running job failed under a failure group.
    pub fn fail(
        &mut self,
        now: f64,
        jid: &str,
        worker: &str,
        group: &str,
        message: &str,
        data: Option<&str>,
    ) -> Result<String> {
        if group.is_empty() {
            return Err(QuarryError::invalid("group", "must not be empty"));
        }
        if let Some(data) = data {
            check_json("data", data)?;
        }
        {
            let job = self.job(jid)?;
            Self::check_running(job, worker)?;
        }
        let job = self.job_mut(jid)?;
        if let Some(data) = data {
            job.data = data.to_string();
        }
        self.remove_from_worker(worker, jid);
        self.mark_failed(now, jid, group, message, worker);
        Ok(jid.to_string())
    }

    /// Hand a running job back for another attempt, optionally delayed.
    /// Returns the retries remaining, -1 when this exhausted the budget.
    pub fn retry(
        &mut self,
        now: f64,
        jid: &str,
        queue: &str,
        worker: &str,
        delay: f64,
    ) -> Result<i64> {
        if !delay.is_finite() || delay < 0.0 {
            return Err(QuarryError::invalid("delay", "must be a non-negative number"));
        }
        {
            let job = self.job(jid)?;
            Self::check_running(job, worker)?;
            if job.queue != queue {
                return Err(QuarryError::QueueMismatch {
                    jid: jid.to_string(),
                    actual: job.queue.clone(),
                    claimed: queue.to_string(),
                });
            }
        }

        self.remove_from_worker(worker, jid);
        self.queue_mut(queue).locks.remove(jid);
        let job = self.job_mut(jid)?;
        job.remaining -= 1;
        let remaining = job.remaining;
        if remaining < 0 {
            self.mark_failed(
                now,
                jid,
                &format!("failed-retries-{queue}"),
                &format!("Job exhausted retries in queue \"{queue}\""),
                worker,
            );
        } else {
            job.worker.clear();
            job.expires = 0.0;
            let priority = job.priority;
            if delay > 0.0 {
                job.state = JobState::Scheduled;
                self.queue_mut(queue).scheduled.insert(jid, now + delay);
            } else {
                job.state = JobState::Waiting;
                self.queue_mut(queue).work.insert(jid, work_score(priority, now));
            }
            self.bus.log(json!({
                "jid": jid,
                "event": "retry",
                "queue": queue,
                "worker": worker,
                "delay": delay,
            }));
        }
        Ok(remaining)
    }

    /// Extend a running job's lease. Returns the new expiry.
    pub fn heartbeat(
        &mut self,
        now: f64,
        jid: &str,
        worker: &str,
        data: Option<&str>,
    ) -> Result<f64> {
        if let Some(data) = data {
            check_json("data", data)?;
        }
        {
            let job = self.job(jid)?;
            Self::check_running(job, worker)?;
        }
        let heartbeat = {
            let queue = self.job(jid)?.queue.clone();
            self.config.heartbeat(&queue)
        };
        let expires = now + heartbeat;
        let job = self.job_mut(jid)?;
        if let Some(data) = data {
            job.data = data.to_string();
        }
        job.expires = expires;
        let queue = job.queue.clone();
        self.workers.insert(worker, now);
        self.worker_jobs
            .entry(worker.to_string())
            .or_default()
            .insert(jid, expires);
        self.queue_mut(&queue).locks.insert(jid, expires);
        Ok(expires)
    }

    /// Add dependency edges from `jid` to each still-pending prerequisite.
    /// Returns the prerequisites that actually became edges.
    fn link_dependencies(&mut self, jid: &str, depends: &[String]) -> Result<HashSet<String>> {
        let mut pending = HashSet::new();
        for dep in depends {
            if dep == jid {
                continue;
            }
            if let Some(other) = self.jobs.get_mut(dep) {
                if other.state != JobState::Complete {
                    other.dependents.insert(jid.to_string());
                    pending.insert(dep.clone());
                }
            }
        }
        if !pending.is_empty() {
            self.job_mut(jid)?
                .dependencies
                .extend(pending.iter().cloned());
        }
        Ok(pending)
    }

    /// Enforce completed-set retention: drop entries past the history
    /// window or beyond the count cap, deleting their records and tag
    /// index entries.
    fn prune_completed(&mut self, now: f64) {
        let window = self.config.get_f64("jobs-history", 604800.0);
        let cap = self.config.get_f64("jobs-history-count", 50000.0).max(0.0) as usize;
        let mut doomed = self.completed.remove_range_by_score(now - window);
        if self.completed.len() > cap {
            let excess = self.completed.len() - cap;
            doomed.extend(self.completed.remove_lowest(excess));
        }
        for jid in doomed {
            if let Some(job) = self.jobs.remove(&jid) {
                for tag in &job.tags {
                    self.remove_tag_index(tag, &jid);
                }
            }
        }
    }
}
