use std::collections::HashMap;

use serde_json::{json, Value};

pub const SECONDS_PER_DAY: f64 = 86400.0;

/// Midnight timestamp of the day containing `t`.
pub fn day_bin(t: f64) -> u64 {
    ((t / SECONDS_PER_DAY).floor() as u64) * 86400
}

/// Histogram bucket name for a duration sample in seconds.
///
/// Buckets: `s0..s59`, `m1..m59`, `h1..h23`, `d1..d6`. Samples of seven
/// days or more saturate into `d6`; negative samples clamp to `s0`.
pub fn bucket(x: f64) -> String {
    let x = x.max(0.0);
    if x < 60.0 {
        format!("s{}", x as u64)
    } else if x < 3600.0 {
        format!("m{}", (x / 60.0) as u64)
    } else if x < 86400.0 {
        format!("h{}", (x / 3600.0) as u64)
    } else {
        format!("d{}", ((x / 86400.0) as u64).min(6))
    }
}

/// Online mean/variance (Welford) plus the bucketed histogram for one
/// (stage, day-bin, queue) cell.
#[derive(Debug, Clone, Default)]
pub struct Summary {
    pub total: u64,
    pub mean: f64,
    pub vk: f64,
    histogram: HashMap<String, u64>,
}

impl Summary {
    pub fn record(&mut self, x: f64) {
        if self.total == 0 {
            self.total = 1;
            self.mean = x;
            self.vk = 0.0;
        } else {
            self.total += 1;
            let old = self.mean;
            self.mean += (x - self.mean) / self.total as f64;
            self.vk += (x - self.mean) * (x - old);
        }
        *self.histogram.entry(bucket(x)).or_insert(0) += 1;
    }

    pub fn std(&self) -> f64 {
        if self.total > 1 {
            (self.vk / (self.total - 1) as f64).sqrt()
        } else {
            0.0
        }
    }

    /// Histogram flattened in bucket order: s0..s59, m1..m59, h1..h23,
    /// d1..d6 (148 entries).
    pub fn histogram_vec(&self) -> Vec<u64> {
        let mut out = Vec::with_capacity(148);
        for i in 0..60 {
            out.push(*self.histogram.get(&format!("s{i}")).unwrap_or(&0));
        }
        for i in 1..60 {
            out.push(*self.histogram.get(&format!("m{i}")).unwrap_or(&0));
        }
        for i in 1..24 {
            out.push(*self.histogram.get(&format!("h{i}")).unwrap_or(&0));
        }
        for i in 1..7 {
            out.push(*self.histogram.get(&format!("d{i}")).unwrap_or(&0));
        }
        out
    }

    pub fn document(&self) -> Value {
        json!({
            "count": self.total,
            "mean": self.mean,
            "std": self.std(),
            "histogram": self.histogram_vec(),
        })
    }
}

/// Per-(day-bin, queue) statistics: the wait/run duration summaries and the
/// retry/failure counters. `failed` is a gauge (currently-failed jobs
/// attributed to this day); `failures` only ever grows.
#[derive(Debug, Clone, Default)]
pub struct QueueDayStats {
    pub retries: u64,
    pub failed: i64,
    pub failures: u64,
    pub wait: Summary,
    pub run: Summary,
}

impl QueueDayStats {
    pub fn document(&self) -> Value {
        json!({
            "retries": self.retries,
            "failed": self.failed,
            "failures": self.failures,
            "wait": self.wait.document(),
            "run": self.run.document(),
        })
    }
}
