use std::collections::HashSet;

use serde_json::{json, Value};

use crate::error::{QuarryError, Result};
use crate::job::{HistoryEntry, Job, JobState};
use crate::stats::day_bin;

use super::{work_score, State};

impl State {
    /// Inspect the jobs the next pops would return. Performs the same
    /// lock-expiry reclamation, recurring instantiation, and scheduled
    /// promotion as `pop`, but installs no leases.
    pub fn peek(&mut self, now: f64, queue: &str, count: usize) -> Result<Vec<Value>> {
        let jids = self.select(now, queue, count);
        Ok(jids
            .iter()
            .filter_map(|jid| {
                let tracked = self.is_tracked(jid);
                self.jobs.get(jid).map(|j| j.document(tracked))
            })
            .collect())
    }

    /// Lease up to `count` jobs to `worker`. Returns the leased jids in
    /// dispatch order: reclaimed stalled jobs first, then by priority.
    pub fn pop(&mut self, now: f64, queue: &str, worker: &str, count: usize) -> Result<Vec<String>> {
        if worker.is_empty() {
            return Err(QuarryError::invalid("worker", "must not be empty"));
        }
        if self.paused.contains(queue) {
            return Ok(Vec::new());
        }
        self.workers.insert(worker, now);
        let jids = self.select(now, queue, count);
        for jid in &jids {
            self.lease(now, queue, worker, jid);
        }
        Ok(jids)
    }

    /// Steps 3-6 of dispatch: reclaim, spawn, promote, select.
    fn select(&mut self, now: f64, queue: &str, count: usize) -> Vec<String> {
        let mut candidates = self.reclaim_expired_locks(now, queue, count);
        if candidates.len() < count {
            self.spawn_due_recurring(now, queue, count - candidates.len());
        }
        if candidates.len() < count {
            self.promote_scheduled(now, queue, count - candidates.len());
        }
        if candidates.len() < count {
            let need = count - candidates.len();
            let reclaimed: HashSet<&String> = candidates.iter().collect();
            let chosen: Vec<String> = match self.queues.get(queue) {
                Some(qs) => qs
                    .work
                    .rev_range(0, need + reclaimed.len())
                    .into_iter()
                    .filter(|jid| !reclaimed.contains(jid))
                    .take(need)
                    .collect(),
                None => Vec::new(),
            };
            candidates.extend(chosen);
        }
        candidates
    }

    /// Reclaim jobs whose lease expired. Survivors return to the work index
    /// (and are reported as dispatch candidates); jobs out of retries fail
    /// into `failed-retries-<queue>`.
    fn reclaim_expired_locks(&mut self, now: f64, queue: &str, count: usize) -> Vec<String> {
        let expired = match self.queues.get(queue) {
            Some(qs) => qs.locks.range_by_score(now, count),
            None => return Vec::new(),
        };
        let mut survivors = Vec::new();
        for jid in expired {
            let Some(job) = self.jobs.get_mut(&jid) else {
                self.queue_mut(queue).locks.remove(&jid);
                continue;
            };
            let old_worker = std::mem::take(&mut job.worker);
            job.expires = 0.0;
            job.remaining -= 1;
            let exhausted = job.remaining < 0;
            let priority = job.priority;
            let put_time = job.last_put(now);

            self.remove_from_worker(&old_worker, &jid);
            self.bus.publish(
                &old_worker,
                json!({"jid": jid, "event": "lock_lost", "worker": old_worker}),
            );
            self.bus.log(json!({
                "jid": jid,
                "event": "lock_lost",
                "queue": queue,
                "worker": old_worker,
            }));

            if exhausted {
                self.mark_failed(
                    now,
                    &jid,
                    &format!("failed-retries-{queue}"),
                    &format!("Job exhausted retries in queue \"{queue}\""),
                    &old_worker,
                );
            } else {
                if let Some(job) = self.jobs.get_mut(&jid) {
                    job.state = JobState::Waiting;
                }
                let qs = self.queue_mut(queue);
                qs.locks.remove(&jid);
                qs.work.insert(&jid, work_score(priority, put_time));
                if self.is_tracked(&jid) {
                    self.bus.notify("stalled", &jid);
                }
                survivors.push(jid);
            }
        }
        if !survivors.is_empty() {
            self.stats_mut(day_bin(now), queue).retries += survivors.len() as u64;
        }
        survivors
    }

    /// Instantiate due recurring templates, at most `need` spawns in total.
    fn spawn_due_recurring(&mut self, now: f64, queue: &str, need: usize) {
        let due = match self.queues.get(queue) {
            Some(qs) => qs.recur.range_by_score(now, need),
            None => return,
        };
        let mut moved = 0;
        for tjid in due {
            if moved >= need {
                break;
            }
            let Some(mut score) = self
                .queues
                .get(queue)
                .and_then(|qs| qs.recur.score(&tjid))
            else {
                continue;
            };
            let Some(template) = self.recurring.get(&tjid).cloned() else {
                self.queue_mut(queue).recur.remove(&tjid);
                continue;
            };
            let mut count = template.count;
            while score <= now && moved < need {
                count += 1;
                let spawn_jid = format!("{tjid}-{count}");
                for tag in &template.tags {
                    self.add_tag_index(tag, &spawn_jid, now);
                }
                self.jobs.insert(
                    spawn_jid.clone(),
                    Job {
                        jid: spawn_jid.clone(),
                        klass: template.klass.clone(),
                        data: template.data.clone(),
                        priority: template.priority,
                        tags: template.tags.clone(),
                        state: JobState::Waiting,
                        queue: queue.to_string(),
                        worker: String::new(),
                        expires: 0.0,
                        retries: template.retries,
                        remaining: template.retries,
                        // The spawn inherits its scheduled time as put-time,
                        // so wait statistics reflect scheduling lateness.
                        history: vec![HistoryEntry::new(queue, score)],
                        failure: None,
                        dependencies: HashSet::new(),
                        dependents: HashSet::new(),
                    },
                );
                self.queue_mut(queue)
                    .work
                    .insert(&spawn_jid, work_score(template.priority, score));
                tracing::debug!(template = %tjid, jid = %spawn_jid, "Spawned recurring job");
                score += template.interval;
                moved += 1;
            }
            self.queue_mut(queue).recur.insert(&tjid, score);
            if let Some(template) = self.recurring.get_mut(&tjid) {
                template.count = count;
            }
        }
    }

    /// Move ripe scheduled jobs into the work index (or the depends index
    /// when prerequisites are still pending).
    fn promote_scheduled(&mut self, now: f64, queue: &str, need: usize) {
        let due = match self.queues.get(queue) {
            Some(qs) => qs.scheduled.range_by_score(now, need),
            None => return,
        };
        for jid in due {
            let ready_at = self
                .queues
                .get(queue)
                .and_then(|qs| qs.scheduled.score(&jid))
                .unwrap_or(now);
            let Some(job) = self.jobs.get_mut(&jid) else {
                self.queue_mut(queue).scheduled.remove(&jid);
                continue;
            };
            let blocked = !job.dependencies.is_empty();
            let priority = job.priority;
            job.state = if blocked {
                JobState::Depends
            } else {
                JobState::Waiting
            };
            let qs = self.queue_mut(queue);
            qs.scheduled.remove(&jid);
            if blocked {
                qs.depends.insert(&jid, now);
            } else {
                qs.work.insert(&jid, work_score(priority, ready_at));
            }
        }
    }

    /// Install a lease: the popped job becomes `running`, owned by `worker`
    /// until `now + heartbeat`.
    fn lease(&mut self, now: f64, queue: &str, worker: &str, jid: &str) {
        let expires = now + self.config.heartbeat(queue);
        let Some(job) = self.jobs.get_mut(jid) else {
            return;
        };
        job.state = JobState::Running;
        job.worker = worker.to_string();
        job.expires = expires;
        let wait = now - job.last_put(now);
        if let Some(last) = job.history.last_mut() {
            last.worker = Some(worker.to_string());
            last.popped = Some(now);
        }
        self.worker_jobs
            .entry(worker.to_string())
            .or_default()
            .insert(jid, expires);
        let qs = self.queue_mut(queue);
        qs.locks.insert(jid, expires);
        qs.work.remove(jid);
        self.stats_mut(day_bin(now), queue).wait.record(wait);
        tracing::debug!(jid, queue, worker, "Job popped");
        self.bus.log(json!({
            "jid": jid,
            "event": "popped",
            "queue": queue,
            "worker": worker,
        }));
        if self.is_tracked(jid) {
            self.bus.notify("popped", jid);
        }
    }
}
