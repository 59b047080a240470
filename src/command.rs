//! String-command facade.
//!
//! Maps a `(command_name, now, positional_args...)` tuple onto the typed
//! engine API. Argument layouts (after `now`, which is always `args[0]`):
//!
//! ```text
//! put        queue jid klass data delay [priority n|tags json|retries n|depends json]...
//! pop        queue worker count
//! peek       queue count
//! complete   jid worker queue data [next q|delay n|depends json]...
//! fail       jid worker group message [data]
//! retry      jid queue worker [delay]
//! heartbeat  jid worker [data]
//! depends    jid on|off all|<jid>...
//! cancel     jid...
//! unfail     queue group [count]
//! recur      queue jid klass data interval n offset [priority n|tags json|retries n]...
//! recur.update jid <field value>...
//! tag        add|remove jid tag... | get tag [offset [count]] | top [offset [count]]
//! track      [track|untrack jid]
//! jobs       complete [offset [count]] | <state> queue [offset [count]]
//! stats      queue date
//! ```
//!
//! Returns are strings: JSON documents for structured results, bare
//! scalars (jid, integer) otherwise.

use serde_json::json;

use crate::core::lifecycle::CompleteOptions;
use crate::core::put::{DependsChange, PutOptions};
use crate::core::query::TagOp;
use crate::core::recur::RecurOptions;
use crate::engine::Engine;
use crate::error::{QuarryError, Result};

impl Engine {
    /// Dispatch one command. `args[0]` must be a numeric `now`.
    pub fn command(&self, name: &str, args: &[&str]) -> Result<String> {
        let now = parse_now(args)?;
        let args = &args[1..];
        match name {
            "put" => {
                let opts = put_options(&args[5.min(args.len())..])?;
                self.put(
                    now,
                    arg(args, 0, "queue")?,
                    arg(args, 1, "jid")?,
                    arg(args, 2, "klass")?,
                    arg(args, 3, "data")?,
                    num_f64("delay", arg(args, 4, "delay")?)?,
                    opts,
                )
            }
            "pop" => {
                let jids = self.pop(
                    now,
                    arg(args, 0, "queue")?,
                    arg(args, 1, "worker")?,
                    num_usize("count", arg(args, 2, "count")?)?,
                )?;
                Ok(json!(jids).to_string())
            }
            "peek" => {
                let docs = self.peek(
                    now,
                    arg(args, 0, "queue")?,
                    num_usize("count", arg(args, 1, "count")?)?,
                )?;
                Ok(json!(docs).to_string())
            }
            "complete" => {
                let opts = complete_options(&args[4.min(args.len())..])?;
                self.complete(
                    now,
                    arg(args, 0, "jid")?,
                    arg(args, 1, "worker")?,
                    arg(args, 2, "queue")?,
                    Some(arg(args, 3, "data")?),
                    opts,
                )
            }
            "fail" => self.fail(
                now,
                arg(args, 0, "jid")?,
                arg(args, 1, "worker")?,
                arg(args, 2, "group")?,
                arg(args, 3, "message")?,
                args.get(4).copied(),
            ),
            "retry" => {
                let delay = match args.get(3) {
                    Some(raw) => num_f64("delay", raw)?,
                    None => 0.0,
                };
                let remaining = self.retry(
                    now,
                    arg(args, 0, "jid")?,
                    arg(args, 1, "queue")?,
                    arg(args, 2, "worker")?,
                    delay,
                )?;
                Ok(remaining.to_string())
            }
            "heartbeat" => {
                let expires = self.heartbeat(
                    now,
                    arg(args, 0, "jid")?,
                    arg(args, 1, "worker")?,
                    args.get(2).copied(),
                )?;
                Ok(expires.to_string())
            }
            "depends" => {
                let jid = arg(args, 0, "jid")?;
                let rest: Vec<String> = args[2.min(args.len())..]
                    .iter()
                    .map(|s| s.to_string())
                    .collect();
                let change = match arg(args, 1, "command")? {
                    "on" => DependsChange::On(rest),
                    "off" if rest.first().map(String::as_str) == Some("all") => {
                        DependsChange::OffAll
                    }
                    "off" => DependsChange::Off(rest),
                    other => {
                        return Err(QuarryError::invalid(
                            "command",
                            format!("expected on or off, got {other}"),
                        ))
                    }
                };
                let remaining = self.depends(now, jid, change)?;
                Ok(remaining.to_string())
            }
            "cancel" => {
                if args.is_empty() {
                    return Err(QuarryError::invalid("jid", "expected at least one jid"));
                }
                Ok(self.cancel(now, args)?.to_string())
            }
            "unfail" => {
                let count = match args.get(2) {
                    Some(raw) => num_usize("count", raw)?,
                    None => 25,
                };
                let moved = self.unfail(now, arg(args, 0, "queue")?, arg(args, 1, "group")?, count)?;
                Ok(moved.to_string())
            }
            "priority" => {
                let priority = self.priority(
                    arg(args, 0, "jid")?,
                    num_i64("priority", arg(args, 1, "priority")?)?,
                )?;
                Ok(priority.to_string())
            }
            "pause" => {
                if args.is_empty() {
                    return Err(QuarryError::invalid("queue", "expected at least one queue"));
                }
                Ok(self.pause(args).to_string())
            }
            "unpause" => {
                if args.is_empty() {
                    return Err(QuarryError::invalid("queue", "expected at least one queue"));
                }
                Ok(self.unpause(args).to_string())
            }
            "recur" => {
                let opts = recur_options(&args[7.min(args.len())..])?;
                self.recur(
                    now,
                    arg(args, 0, "queue")?,
                    arg(args, 1, "jid")?,
                    arg(args, 2, "klass")?,
                    arg(args, 3, "data")?,
                    arg(args, 4, "spec")?,
                    num_f64("interval", arg(args, 5, "interval")?)?,
                    num_f64("offset", arg(args, 6, "offset")?)?,
                    opts,
                )
            }
            "unrecur" => self.unrecur(arg(args, 0, "jid")?),
            "recur.get" => {
                let doc = self.recur_get(arg(args, 0, "jid")?)?;
                Ok(doc.to_string())
            }
            "recur.update" => {
                let updates = pairs(&args[1.min(args.len())..])?;
                self.recur_update(now, arg(args, 0, "jid")?, &updates)
            }
            "recur.tag" => {
                let tags = self.recur_tag(arg(args, 0, "jid")?, &args[1.min(args.len())..])?;
                Ok(tags.to_string())
            }
            "recur.untag" => {
                let tags = self.recur_untag(arg(args, 0, "jid")?, &args[1.min(args.len())..])?;
                Ok(tags.to_string())
            }
            "get" => {
                let doc = self.get(arg(args, 0, "jid")?)?;
                Ok(doc.to_string())
            }
            "jobs" => {
                let state = arg(args, 0, "state")?;
                let (queue, first_opt) = if state == "complete" {
                    ("", 1)
                } else {
                    (arg(args, 1, "queue")?, 2)
                };
                let offset = match args.get(first_opt) {
                    Some(raw) => num_usize("offset", raw)?,
                    None => 0,
                };
                let count = match args.get(first_opt + 1) {
                    Some(raw) => num_usize("count", raw)?,
                    None => 25,
                };
                let jids = self.jobs(now, state, queue, offset, count)?;
                Ok(json!(jids).to_string())
            }
            "queues" => {
                let doc = self.queues_info(now, args.first().copied())?;
                Ok(doc.to_string())
            }
            "workers" => {
                let doc = self.workers_info(now, args.first().copied())?;
                Ok(doc.to_string())
            }
            "failed" => {
                let start = match args.get(1) {
                    Some(raw) => num_usize("start", raw)?,
                    None => 0,
                };
                let limit = match args.get(2) {
                    Some(raw) => num_usize("limit", raw)?,
                    None => 25,
                };
                Ok(self
                    .failed_info(args.first().copied(), start, limit)
                    .to_string())
            }
            "stats" => {
                let queue = arg(args, 0, "queue")?;
                let date = num_f64("date", arg(args, 1, "date")?)?;
                Ok(self.stats_info(date, queue).to_string())
            }
            "track" => match args.first() {
                None => Ok(self.tracked_info().to_string()),
                Some(&"track") => {
                    let added = self.track(now, arg(args, 1, "jid")?)?;
                    Ok(if added { "1" } else { "0" }.to_string())
                }
                Some(&"untrack") => {
                    let removed = self.untrack(arg(args, 1, "jid")?)?;
                    Ok(if removed { "1" } else { "0" }.to_string())
                }
                Some(other) => Err(QuarryError::invalid(
                    "command",
                    format!("expected track or untrack, got {other}"),
                )),
            },
            "tag" => {
                let op = tag_op(args)?;
                Ok(self.tag(now, op)?.to_string())
            }
            "length" => Ok(self.length(arg(args, 0, "queue")?).to_string()),
            "config.get" => match self.config_get(args.first().copied()) {
                serde_json::Value::String(value) => Ok(value),
                other => Ok(other.to_string()),
            },
            "config.set" => {
                self.config_set(arg(args, 0, "key")?, arg(args, 1, "value")?);
                Ok(String::new())
            }
            "config.unset" => {
                self.config_unset(arg(args, 0, "key")?);
                Ok(String::new())
            }
            other => Err(QuarryError::UnknownCommand(other.to_string())),
        }
    }
}

fn parse_now(args: &[&str]) -> Result<f64> {
    let raw = args
        .first()
        .ok_or_else(|| QuarryError::InvalidNow("missing".to_string()))?;
    let now: f64 = raw
        .parse()
        .map_err(|_| QuarryError::InvalidNow(raw.to_string()))?;
    if !now.is_finite() {
        return Err(QuarryError::InvalidNow(raw.to_string()));
    }
    Ok(now)
}

fn arg<'a>(args: &[&'a str], idx: usize, name: &str) -> Result<&'a str> {
    args.get(idx)
        .copied()
        .ok_or_else(|| QuarryError::invalid(name, "missing"))
}

fn num_f64(name: &str, raw: &str) -> Result<f64> {
    let value: f64 = raw
        .parse()
        .map_err(|_| QuarryError::invalid(name, format!("not a number: {raw}")))?;
    if !value.is_finite() {
        return Err(QuarryError::invalid(name, format!("not finite: {raw}")));
    }
    Ok(value)
}

fn num_i64(name: &str, raw: &str) -> Result<i64> {
    raw.parse()
        .map_err(|_| QuarryError::invalid(name, format!("not an integer: {raw}")))
}

fn num_usize(name: &str, raw: &str) -> Result<usize> {
    raw.parse()
        .map_err(|_| QuarryError::invalid(name, format!("not a non-negative integer: {raw}")))
}

fn json_strings(name: &str, raw: &str) -> Result<Vec<String>> {
    serde_json::from_str(raw)
        .map_err(|e| QuarryError::invalid(name, format!("not a JSON array of strings: {e}")))
}

/// Trailing `key value` option pairs.
fn pairs(args: &[&str]) -> Result<Vec<(String, String)>> {
    if args.len() % 2 != 0 {
        return Err(QuarryError::invalid(
            "options",
            "expected key/value pairs",
        ));
    }
    Ok(args
        .chunks(2)
        .map(|pair| (pair[0].to_string(), pair[1].to_string()))
        .collect())
}

fn put_options(args: &[&str]) -> Result<PutOptions> {
    let mut opts = PutOptions::default();
    for (key, value) in pairs(args)? {
        match key.as_str() {
            "priority" => opts.priority = Some(num_i64(&key, &value)?),
            "retries" => opts.retries = Some(num_i64(&key, &value)?),
            "tags" => opts.tags = Some(json_strings(&key, &value)?),
            "depends" => opts.depends = Some(json_strings(&key, &value)?),
            other => return Err(QuarryError::invalid(other, "not a put option")),
        }
    }
    Ok(opts)
}

fn complete_options(args: &[&str]) -> Result<CompleteOptions> {
    let mut opts = CompleteOptions::default();
    for (key, value) in pairs(args)? {
        match key.as_str() {
            "next" => opts.next = Some(value),
            "delay" => opts.delay = num_f64(&key, &value)?,
            "depends" => opts.depends = json_strings(&key, &value)?,
            other => return Err(QuarryError::invalid(other, "not a complete option")),
        }
    }
    Ok(opts)
}

fn recur_options(args: &[&str]) -> Result<RecurOptions> {
    let mut opts = RecurOptions::default();
    for (key, value) in pairs(args)? {
        match key.as_str() {
            "priority" => opts.priority = Some(num_i64(&key, &value)?),
            "retries" => opts.retries = Some(num_i64(&key, &value)?),
            "tags" => opts.tags = Some(json_strings(&key, &value)?),
            other => return Err(QuarryError::invalid(other, "not a recur option")),
        }
    }
    Ok(opts)
}

fn tag_op(args: &[&str]) -> Result<TagOp> {
    match arg(args, 0, "command")? {
        "add" => Ok(TagOp::Add {
            jid: arg(args, 1, "jid")?.to_string(),
            tags: args[2.min(args.len())..]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }),
        "remove" => Ok(TagOp::Remove {
            jid: arg(args, 1, "jid")?.to_string(),
            tags: args[2.min(args.len())..]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }),
        "get" => {
            let offset = match args.get(2) {
                Some(raw) => num_usize("offset", raw)?,
                None => 0,
            };
            let count = match args.get(3) {
                Some(raw) => num_usize("count", raw)?,
                None => 25,
            };
            Ok(TagOp::Get {
                tag: arg(args, 1, "tag")?.to_string(),
                offset,
                count,
            })
        }
        "top" => {
            let offset = match args.get(1) {
                Some(raw) => num_usize("offset", raw)?,
                None => 0,
            };
            let count = match args.get(2) {
                Some(raw) => num_usize("count", raw)?,
                None => 25,
            };
            Ok(TagOp::Top { offset, count })
        }
        other => Err(QuarryError::invalid(
            "command",
            format!("expected add, remove, get, or top, got {other}"),
        )),
    }
}
