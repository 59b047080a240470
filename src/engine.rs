use std::sync::mpsc::Receiver;

use parking_lot::Mutex;
use serde_json::Value;

use crate::core::lifecycle::CompleteOptions;
use crate::core::put::{DependsChange, PutOptions};
use crate::core::query::TagOp;
use crate::core::recur::RecurOptions;
use crate::core::{check_now, State};
use crate::error::Result;
use crate::events::Event;

/// The execution core. Every public operation takes the store mutex once
/// and runs to completion under it, so operations are atomic with respect
/// to each other and a returned error implies no partial writes.
///
/// `now` is always caller-supplied epoch seconds; the engine never reads
/// host time.
#[derive(Default)]
pub struct Engine {
    state: Mutex<State>,
}

impl Engine {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::new()),
        }
    }

    /// Receive every published event (all channels) from this engine.
    pub fn subscribe(&self) -> Receiver<Event> {
        self.state.lock().bus.subscribe()
    }

    pub fn put(
        &self,
        now: f64,
        queue: &str,
        jid: &str,
        klass: &str,
        data: &str,
        delay: f64,
        opts: PutOptions,
    ) -> Result<String> {
        check_now(now)?;
        self.state.lock().put(now, queue, jid, klass, data, delay, opts)
    }

    pub fn pop(&self, now: f64, queue: &str, worker: &str, count: usize) -> Result<Vec<String>> {
        check_now(now)?;
        self.state.lock().pop(now, queue, worker, count)
    }

    pub fn peek(&self, now: f64, queue: &str, count: usize) -> Result<Vec<Value>> {
        check_now(now)?;
        self.state.lock().peek(now, queue, count)
    }

    pub fn complete(
        &self,
        now: f64,
        jid: &str,
        worker: &str,
        queue: &str,
        data: Option<&str>,
        opts: CompleteOptions,
    ) -> Result<String> {
        check_now(now)?;
        self.state.lock().complete(now, jid, worker, queue, data, opts)
    }

    pub fn fail(
        &self,
        now: f64,
        jid: &str,
        worker: &str,
        group: &str,
        message: &str,
        data: Option<&str>,
    ) -> Result<String> {
        check_now(now)?;
        self.state.lock().fail(now, jid, worker, group, message, data)
    }

    pub fn retry(&self, now: f64, jid: &str, queue: &str, worker: &str, delay: f64) -> Result<i64> {
        check_now(now)?;
        self.state.lock().retry(now, jid, queue, worker, delay)
    }

    pub fn heartbeat(&self, now: f64, jid: &str, worker: &str, data: Option<&str>) -> Result<f64> {
        check_now(now)?;
        self.state.lock().heartbeat(now, jid, worker, data)
    }

    pub fn cancel(&self, now: f64, jids: &[&str]) -> Result<usize> {
        check_now(now)?;
        self.state.lock().cancel(now, jids)
    }

    pub fn depends(&self, now: f64, jid: &str, change: DependsChange) -> Result<usize> {
        check_now(now)?;
        self.state.lock().depends(now, jid, change)
    }

    pub fn priority(&self, jid: &str, priority: i64) -> Result<i64> {
        self.state.lock().priority(jid, priority)
    }

    pub fn unfail(&self, now: f64, queue: &str, group: &str, count: usize) -> Result<usize> {
        check_now(now)?;
        self.state.lock().unfail(now, queue, group, count)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn recur(
        &self,
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
        check_now(now)?;
        self.state
            .lock()
            .recur(now, queue, jid, klass, data, spec, interval, offset, opts)
    }

    pub fn unrecur(&self, jid: &str) -> Result<String> {
        self.state.lock().unrecur(jid)
    }

    pub fn recur_get(&self, jid: &str) -> Result<Value> {
        self.state.lock().recur_get(jid)
    }

    pub fn recur_update(&self, now: f64, jid: &str, updates: &[(String, String)]) -> Result<String> {
        check_now(now)?;
        self.state.lock().recur_update(now, jid, updates)
    }

    pub fn recur_tag(&self, jid: &str, tags: &[&str]) -> Result<Value> {
        self.state.lock().recur_tag(jid, tags)
    }

    pub fn recur_untag(&self, jid: &str, tags: &[&str]) -> Result<Value> {
        self.state.lock().recur_untag(jid, tags)
    }

    pub fn get(&self, jid: &str) -> Result<Value> {
        self.state.lock().get(jid)
    }

    pub fn jobs(
        &self,
        now: f64,
        state: &str,
        queue: &str,
        offset: usize,
        count: usize,
    ) -> Result<Vec<String>> {
        check_now(now)?;
        self.state.lock().jobs(now, state, queue, offset, count)
    }

    pub fn queues_info(&self, now: f64, queue: Option<&str>) -> Result<Value> {
        check_now(now)?;
        Ok(self.state.lock().queues_info(now, queue))
    }

    pub fn workers_info(&self, now: f64, worker: Option<&str>) -> Result<Value> {
        check_now(now)?;
        Ok(self.state.lock().workers_info(now, worker))
    }

    pub fn failed_info(&self, group: Option<&str>, start: usize, limit: usize) -> Value {
        self.state.lock().failed_info(group, start, limit)
    }

    pub fn stats_info(&self, date: f64, queue: &str) -> Value {
        self.state.lock().stats_info(date, queue)
    }

    pub fn length(&self, queue: &str) -> usize {
        self.state.lock().length(queue)
    }

    pub fn pause(&self, queues: &[&str]) -> usize {
        self.state.lock().pause(queues)
    }

    pub fn unpause(&self, queues: &[&str]) -> usize {
        self.state.lock().unpause(queues)
    }

    pub fn track(&self, now: f64, jid: &str) -> Result<bool> {
        check_now(now)?;
        self.state.lock().track(now, jid)
    }

    pub fn untrack(&self, jid: &str) -> Result<bool> {
        self.state.lock().untrack(jid)
    }

    pub fn tracked_info(&self) -> Value {
        self.state.lock().tracked_info()
    }

    pub fn tag(&self, now: f64, op: TagOp) -> Result<Value> {
        check_now(now)?;
        self.state.lock().tag(now, op)
    }

    pub fn config_get(&self, key: Option<&str>) -> Value {
        let state = self.state.lock();
        match key {
            Some(key) => state
                .config
                .get(key)
                .map(Value::String)
                .unwrap_or(Value::Null),
            None => serde_json::json!(state.config.all()),
        }
    }

    pub fn config_set(&self, key: &str, value: &str) {
        self.state.lock().config.set(key, value);
    }

    pub fn config_unset(&self, key: &str) {
        self.state.lock().config.unset(key);
    }
}
