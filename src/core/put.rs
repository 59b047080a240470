use std::collections::HashSet;

use serde_json::json;

use crate::error::{QuarryError, Result};
use crate::job::{HistoryEntry, Job, JobState};
use crate::stats::day_bin;

use super::{check_json, work_score, State};

/// Optional `put` parameters. Explicit values win over the values carried by
/// an existing record, which win over the defaults.
#[derive(Debug, Default, Clone)]
pub struct PutOptions {
    pub priority: Option<i64>,
    pub tags: Option<Vec<String>>,
    pub retries: Option<i64>,
    pub depends: Option<Vec<String>>,
}

/// A requested change to a job's dependency set.
#[derive(Debug, Clone)]
pub enum DependsChange {
    On(Vec<String>),
    Off(Vec<String>),
    OffAll,
}

impl State {
    /// Enqueue a job, re-queueing and resetting it if the jid already exists.
    pub fn put(
        &mut self,
        now: f64,
        queue: &str,
        jid: &str,
        klass: &str,
        data: &str,
        delay: f64,
        opts: PutOptions,
    ) -> Result<String> {
        if queue.is_empty() {
            return Err(QuarryError::invalid("queue", "must not be empty"));
        }
        if jid.is_empty() {
            return Err(QuarryError::invalid("jid", "must not be empty"));
        }
        if klass.is_empty() {
            return Err(QuarryError::invalid("klass", "must not be empty"));
        }
        check_json("data", data)?;
        if !delay.is_finite() || delay < 0.0 {
            return Err(QuarryError::invalid("delay", "must be a non-negative number"));
        }
        let depends = opts.depends.unwrap_or_default();
        if delay > 0.0 && !depends.is_empty() {
            return Err(QuarryError::Conflict(
                "delay and depends cannot be used together".to_string(),
            ));
        }
        if let Some(retries) = opts.retries {
            if retries < 0 {
                return Err(QuarryError::invalid("retries", "must be non-negative"));
            }
        }

        let old = self.jobs.get(jid);
        let priority = opts
            .priority
            .or_else(|| old.map(|j| j.priority))
            .unwrap_or(0);
        let tags = opts
            .tags
            .or_else(|| old.map(|j| j.tags.clone()))
            .unwrap_or_default();
        let retries = opts
            .retries
            .or_else(|| old.map(|j| j.retries))
            .unwrap_or(5);

        let old_queue = old.map(|j| j.queue.clone()).unwrap_or_default();
        let old_worker = old.map(|j| j.worker.clone()).unwrap_or_default();
        let old_state = old.map(|j| j.state);
        let old_failure = old.and_then(|j| j.failure.clone());
        let old_tags = old.map(|j| j.tags.clone()).unwrap_or_default();
        let old_deps: Vec<String> = old
            .map(|j| j.dependencies.iter().cloned().collect())
            .unwrap_or_default();
        let old_dependents = old.map(|j| j.dependents.clone()).unwrap_or_default();
        let mut history = old.map(|j| j.history.clone()).unwrap_or_default();

        tracing::debug!(jid, queue, "Putting job");
        self.bus.log(json!({"jid": jid, "event": "put", "queue": queue}));

        if !old_queue.is_empty() {
            self.remove_from_queue(&old_queue, jid);
        }
        if !old_worker.is_empty() {
            self.remove_from_worker(&old_worker, jid);
            self.bus.publish(
                &old_worker,
                json!({"jid": jid, "event": "put", "queue": queue}),
            );
        }
        if old_state == Some(JobState::Complete) {
            self.completed.remove(jid);
        }
        for dep in &old_deps {
            if let Some(other) = self.jobs.get_mut(dep) {
                other.dependents.remove(jid);
            }
        }
        if old_state == Some(JobState::Failed) {
            if let Some(failure) = &old_failure {
                self.remove_failed_jid(&failure.group, jid);
                self.stats_mut(day_bin(failure.when), &old_queue).failed -= 1;
            }
        }

        for tag in &old_tags {
            if !tags.contains(tag) {
                self.remove_tag_index(tag, jid);
            }
        }
        for tag in &tags {
            if !old_tags.contains(tag) {
                self.add_tag_index(tag, jid, now);
            }
        }

        history.push(HistoryEntry::new(queue, now));
        let state = if delay > 0.0 {
            JobState::Scheduled
        } else {
            JobState::Waiting
        };
        self.jobs.insert(
            jid.to_string(),
            Job {
                jid: jid.to_string(),
                klass: klass.to_string(),
                data: data.to_string(),
                priority,
                tags,
                state,
                queue: queue.to_string(),
                worker: String::new(),
                expires: 0.0,
                retries,
                remaining: retries,
                history,
                failure: None,
                dependencies: HashSet::new(),
                dependents: old_dependents,
            },
        );

        let mut pending = HashSet::new();
        for dep in depends {
            if dep == jid {
                continue;
            }
            if let Some(other) = self.jobs.get_mut(&dep) {
                if other.state != JobState::Complete {
                    other.dependents.insert(jid.to_string());
                    pending.insert(dep);
                }
            }
        }

        let blocked = !pending.is_empty();
        if let Some(job) = self.jobs.get_mut(jid) {
            job.dependencies = pending;
            if blocked {
                job.state = JobState::Depends;
            }
        }

        let qs = self.queue_mut(queue);
        if delay > 0.0 {
            qs.scheduled.insert(jid, now + delay);
        } else if blocked {
            qs.depends.insert(jid, now);
        } else {
            qs.work.insert(jid, work_score(priority, now));
        }
        self.ensure_queue(queue, now);

        if self.is_tracked(jid) {
            self.bus.notify("put", jid);
        }
        Ok(jid.to_string())
    }

    /// Change a job's priority, rewriting its work-index score in place so
    /// the encoded put-time tiebreaker survives.
    pub fn priority(&mut self, jid: &str, priority: i64) -> Result<i64> {
        let job = self.job(jid)?;
        let old_priority = job.priority;
        let queue = job.queue.clone();
        if let Some(qs) = self.queues.get_mut(&queue) {
            if let Some(score) = qs.work.score(jid) {
                qs.work.insert(jid, score + (priority - old_priority) as f64);
            }
        }
        self.job_mut(jid)?.priority = priority;
        Ok(priority)
    }

    /// Add or remove dependency edges on a not-yet-running job.
    pub fn depends(&mut self, now: f64, jid: &str, change: DependsChange) -> Result<usize> {
        let job = self.job(jid)?;
        if !matches!(
            job.state,
            JobState::Depends | JobState::Waiting | JobState::Scheduled
        ) {
            return Err(QuarryError::InvalidTransition {
                jid: jid.to_string(),
                reason: format!("cannot edit dependencies in state {}", job.state),
            });
        }

        match change {
            DependsChange::On(deps) => {
                for dep in deps {
                    if dep == jid {
                        continue;
                    }
                    let pending = match self.jobs.get_mut(&dep) {
                        Some(other) if other.state != JobState::Complete => {
                            other.dependents.insert(jid.to_string());
                            true
                        }
                        _ => false,
                    };
                    if pending {
                        self.job_mut(jid)?.dependencies.insert(dep);
                    }
                }
                let job = self.job(jid)?;
                if job.state == JobState::Waiting && !job.dependencies.is_empty() {
                    let queue = job.queue.clone();
                    self.job_mut(jid)?.state = JobState::Depends;
                    let qs = self.queue_mut(&queue);
                    qs.work.remove(jid);
                    qs.depends.insert(jid, now);
                }
            }
            DependsChange::Off(deps) => self.remove_dependencies(now, jid, deps)?,
            DependsChange::OffAll => {
                let all: Vec<String> = self.job(jid)?.dependencies.iter().cloned().collect();
                self.remove_dependencies(now, jid, all)?;
            }
        }
        Ok(self.job(jid)?.dependencies.len())
    }

    fn remove_dependencies(&mut self, now: f64, jid: &str, deps: Vec<String>) -> Result<()> {
        for dep in deps {
            if self.job_mut(jid)?.dependencies.remove(&dep) {
                if let Some(other) = self.jobs.get_mut(&dep) {
                    other.dependents.remove(jid);
                }
            }
        }
        self.release_if_unblocked(now, jid);
        Ok(())
    }
}
