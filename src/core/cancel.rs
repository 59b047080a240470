use std::collections::HashSet;

use serde_json::json;

use crate::error::{QuarryError, Result};
use crate::job::{HistoryEntry, JobState};

use super::{work_score, State};

impl State {
    /// Remove jobs (or recurring templates) outright. The whole batch is
    /// validated before anything is touched: a running job, or a job with a
    /// live dependent outside the batch, rejects the entire call.
    pub fn cancel(&mut self, now: f64, jids: &[&str]) -> Result<usize> {
        let batch: HashSet<&str> = jids.iter().copied().collect();
        for &jid in jids {
            if let Some(job) = self.jobs.get(jid) {
                if job.state == JobState::Running {
                    return Err(QuarryError::InvalidTransition {
                        jid: jid.to_string(),
                        reason: "cannot cancel a running job".to_string(),
                    });
                }
                for dependent in &job.dependents {
                    let live = self
                        .jobs
                        .get(dependent)
                        .map_or(false, |d| d.state != JobState::Complete);
                    if live && !batch.contains(dependent.as_str()) {
                        return Err(QuarryError::InvalidTransition {
                            jid: jid.to_string(),
                            reason: format!("job {dependent} still depends on it"),
                        });
                    }
                }
            } else if !self.recurring.contains_key(jid) {
                return Err(QuarryError::JobNotFound(jid.to_string()));
            }
        }

        let mut removed = 0;
        for &jid in jids {
            if let Some(job) = self.jobs.remove(jid) {
                for dependent in &job.dependents {
                    if let Some(other) = self.jobs.get_mut(dependent) {
                        other.dependencies.remove(jid);
                    }
                    self.release_if_unblocked(now, dependent);
                }
                for prerequisite in &job.dependencies {
                    if let Some(other) = self.jobs.get_mut(prerequisite) {
                        other.dependents.remove(jid);
                    }
                }
                if !job.queue.is_empty() {
                    self.remove_from_queue(&job.queue, jid);
                }
                if !job.worker.is_empty() {
                    self.remove_from_worker(&job.worker, jid);
                }
                for tag in &job.tags {
                    self.remove_tag_index(tag, jid);
                }
                if self.tracked.remove(jid) {
                    self.bus.notify("canceled", jid);
                }
                self.completed.remove(jid);
                if job.state == JobState::Failed {
                    if let Some(failure) = &job.failure {
                        self.remove_failed_jid(&failure.group, jid);
                    }
                }
                tracing::info!(jid, queue = %job.queue, "Job canceled");
                self.bus
                    .log(json!({"jid": jid, "event": "canceled", "queue": job.queue}));
                removed += 1;
            } else if let Some(template) = self.recurring.remove(jid) {
                self.queue_mut(&template.queue).recur.remove(jid);
                tracing::info!(jid, queue = %template.queue, "Recurring job canceled");
                self.bus
                    .log(json!({"jid": jid, "event": "canceled", "queue": template.queue}));
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Move up to `count` of the oldest jobs out of a failure group and back
    /// into `queue` as fresh waiting jobs with a full retry budget.
    pub fn unfail(&mut self, now: f64, queue: &str, group: &str, count: usize) -> Result<usize> {
        if queue.is_empty() {
            return Err(QuarryError::invalid("queue", "must not be empty"));
        }
        if group.is_empty() {
            return Err(QuarryError::invalid("group", "must not be empty"));
        }
        if count == 0 {
            return Err(QuarryError::invalid("count", "must be positive"));
        }
        let mut doomed = Vec::new();
        if let Some(list) = self.failure_groups.get_mut(group) {
            for _ in 0..count {
                match list.pop_back() {
                    Some(jid) => doomed.push(jid),
                    None => break,
                }
            }
            if list.is_empty() {
                self.failure_groups.remove(group);
            }
        }
        if doomed.is_empty() {
            return Ok(0);
        }

        self.ensure_queue(queue, now);
        let mut moved = 0;
        for jid in doomed {
            let Some(job) = self.jobs.get_mut(&jid) else {
                continue;
            };
            job.state = JobState::Waiting;
            job.remaining = job.retries;
            job.worker.clear();
            job.expires = 0.0;
            job.queue = queue.to_string();
            job.failure = None;
            job.history.push(HistoryEntry::new(queue, now));
            let priority = job.priority;
            self.queue_mut(queue)
                .work
                .insert(&jid, work_score(priority, now));
            moved += 1;
        }
        tracing::info!(group, queue, moved, "Unfailed jobs");
        Ok(moved)
    }
}
