use serde_json::Value;

use crate::error::{QuarryError, Result};
use crate::recurring::RecurringJob;

use super::{check_json, State};

/// Optional `recur` parameters, mirroring the job-side defaults.
#[derive(Debug, Default, Clone)]
pub struct RecurOptions {
    pub priority: Option<i64>,
    pub tags: Option<Vec<String>>,
    pub retries: Option<i64>,
}

impl State {
    /// Register (or refresh) a recurring template. Re-registering an
    /// existing jid overwrites its fields but keeps the spawn counter, and
    /// resets the next-due time to `now + offset`.
    #[allow(clippy::too_many_arguments)]
    pub fn recur(
        &mut self,
        now: f64,
        queue: &str,
        jid: &str,
        klass: &str,
        data: &str,
        spec: &str,
        interval: f64,
        offset: f64,
        opts: RecurOptions,
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
        if spec != "interval" {
            return Err(QuarryError::UnknownSchedule(spec.to_string()));
        }
        if !interval.is_finite() || interval <= 0.0 {
            return Err(QuarryError::RecurInvalidInterval(interval));
        }
        if !offset.is_finite() || offset < 0.0 {
            return Err(QuarryError::invalid("offset", "must be a non-negative number"));
        }

        let count = self.recurring.get(jid).map(|t| t.count).unwrap_or(0);
        let old_queue = self.recurring.get(jid).map(|t| t.queue.clone());
        if let Some(old_queue) = old_queue {
            if old_queue != queue {
                self.queue_mut(&old_queue).recur.remove(jid);
            }
        }
        self.recurring.insert(
            jid.to_string(),
            RecurringJob {
                jid: jid.to_string(),
                klass: klass.to_string(),
                data: data.to_string(),
                priority: opts.priority.unwrap_or(0),
                tags: opts.tags.unwrap_or_default(),
                queue: queue.to_string(),
                interval,
                count,
                retries: opts.retries.unwrap_or(5),
            },
        );
        self.ensure_queue(queue, now);
        self.queue_mut(queue).recur.insert(jid, now + offset);
        tracing::debug!(jid, queue, interval, "Recurring job registered");
        Ok(jid.to_string())
    }

    /// Delete a recurring template. Already-spawned instances live on.
    pub fn unrecur(&mut self, jid: &str) -> Result<String> {
        let template = self
            .recurring
            .remove(jid)
            .ok_or_else(|| QuarryError::JobNotFound(jid.to_string()))?;
        self.queue_mut(&template.queue).recur.remove(jid);
        Ok(jid.to_string())
    }

    pub fn recur_get(&self, jid: &str) -> Result<Value> {
        self.recurring
            .get(jid)
            .map(|t| t.document())
            .ok_or_else(|| QuarryError::JobNotFound(jid.to_string()))
    }

    /// Apply key/value updates to a template. A queue change carries the
    /// next-due time over to the new queue's recur index.
    pub fn recur_update(&mut self, now: f64, jid: &str, updates: &[(String, String)]) -> Result<String> {
        if !self.recurring.contains_key(jid) {
            return Err(QuarryError::JobNotFound(jid.to_string()));
        }
        for (key, value) in updates {
            match key.as_str() {
                "priority" => {
                    let priority = parse_i64(key, value)?;
                    self.template_mut(jid)?.priority = priority;
                }
                "interval" => {
                    let interval: f64 = value
                        .parse()
                        .map_err(|_| QuarryError::invalid(key, "must be a number"))?;
                    if !interval.is_finite() || interval <= 0.0 {
                        return Err(QuarryError::RecurInvalidInterval(interval));
                    }
                    self.template_mut(jid)?.interval = interval;
                }
                "retries" => {
                    let retries = parse_i64(key, value)?;
                    if retries < 0 {
                        return Err(QuarryError::invalid(key, "must be non-negative"));
                    }
                    self.template_mut(jid)?.retries = retries;
                }
                "data" => {
                    check_json(key, value)?;
                    self.template_mut(jid)?.data = value.clone();
                }
                "klass" => {
                    if value.is_empty() {
                        return Err(QuarryError::invalid(key, "must not be empty"));
                    }
                    self.template_mut(jid)?.klass = value.clone();
                }
                "queue" => {
                    if value.is_empty() {
                        return Err(QuarryError::invalid(key, "must not be empty"));
                    }
                    let old_queue = self.template_mut(jid)?.queue.clone();
                    if old_queue != *value {
                        let due = self
                            .queues
                            .get(&old_queue)
                            .and_then(|qs| qs.recur.score(jid))
                            .unwrap_or(now);
                        self.queue_mut(&old_queue).recur.remove(jid);
                        self.template_mut(jid)?.queue = value.clone();
                        self.ensure_queue(value, now);
                        self.queue_mut(value).recur.insert(jid, due);
                    }
                }
                _ => {
                    return Err(QuarryError::invalid(key, "not an updatable recurring field"));
                }
            }
        }
        Ok(jid.to_string())
    }

    /// Add tags to a template; future spawns inherit them.
    pub fn recur_tag(&mut self, jid: &str, tags: &[&str]) -> Result<Value> {
        let template = self.template_mut(jid)?;
        for tag in tags {
            if !template.tags.iter().any(|t| t == tag) {
                template.tags.push(tag.to_string());
            }
        }
        Ok(serde_json::json!(template.tags))
    }

    pub fn recur_untag(&mut self, jid: &str, tags: &[&str]) -> Result<Value> {
        let template = self.template_mut(jid)?;
        template.tags.retain(|t| !tags.iter().any(|x| x == t));
        Ok(serde_json::json!(template.tags))
    }

    fn template_mut(&mut self, jid: &str) -> Result<&mut RecurringJob> {
        self.recurring
            .get_mut(jid)
            .ok_or_else(|| QuarryError::JobNotFound(jid.to_string()))
    }
}

fn parse_i64(name: &str, value: &str) -> Result<i64> {
    value
        .parse()
        .map_err(|_| QuarryError::invalid(name, "must be an integer"))
}
