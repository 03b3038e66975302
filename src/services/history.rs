use crate::models::metrics::{HistorySample, LatencyStatus, TierDuration};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

pub const DEFAULT_RETENTION: Duration = Duration::from_secs(600);

/// Time-ordered tick samples, appended at the tail and aged out at the head.
#[derive(Debug, Default, Clone)]
pub struct HistoryStore {
    samples: VecDeque<HistorySample>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, sample: HistorySample) {
        self.samples.push_back(sample);
    }

    /// Drops samples from the head while the oldest is older than `retention`.
    pub fn trim(&mut self, retention: Duration, now: DateTime<Utc>) {
        while let Some(oldest) = self.samples.front() {
            let expired = match (now - oldest.timestamp).to_std() {
                Ok(age) => age > retention,
                Err(_) => false, // sample is in the future
            };
            if !expired {
                break;
            }
            self.samples.pop_front();
        }
    }

    pub fn snapshot(&self) -> Vec<HistorySample> {
        self.samples.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn latest(&self) -> Option<&HistorySample> {
        self.samples.back()
    }

    /// Evenly strided subsequence of at most `max_points` samples, always
    /// ending with the most recent raw sample.
    pub fn downsample(&self, max_points: usize) -> Vec<HistorySample> {
        let count = self.samples.len();
        if count <= max_points {
            return self.snapshot();
        }
        if max_points == 0 {
            return Vec::new();
        }

        let step = count as f64 / max_points as f64;
        let mut result: Vec<HistorySample> = (0..max_points)
            .map(|i| {
                let index = ((i as f64 * step) as usize).min(count - 1);
                self.samples[index].clone()
            })
            .collect();

        if let (Some(last_raw), Some(last_kept)) = (self.samples.back(), result.last_mut()) {
            if last_kept.timestamp != last_raw.timestamp {
                *last_kept = last_raw.clone();
            }
        }

        result
    }

    /// Wall-clock time per overall tier, longest first.
    ///
    /// Each gap is charged to the earlier sample's tier; the last sample is
    /// charged up to `now`. Fewer than two samples give no breakdown.
    pub fn time_in_each_tier(&self, now: DateTime<Utc>) -> Vec<TierDuration> {
        if self.samples.len() < 2 {
            return Vec::new();
        }

        let mut durations: HashMap<LatencyStatus, f64> = HashMap::new();

        for (current, next) in self.samples.iter().zip(self.samples.iter().skip(1)) {
            *durations.entry(current.overall_status).or_default() += seconds_between(current.timestamp, next.timestamp);
        }

        if let Some(last) = self.samples.back() {
            *durations.entry(last.overall_status).or_default() += seconds_between(last.timestamp, now);
        }

        let mut breakdown: Vec<TierDuration> = durations
            .into_iter()
            .map(|(status, duration_secs)| TierDuration { status, duration_secs })
            .collect();
        breakdown.sort_by(|a, b| {
            b.duration_secs
                .total_cmp(&a.duration_secs)
                .then(a.status.cmp(&b.status))
        });
        breakdown
    }

    pub fn total_duration(&self, now: DateTime<Utc>) -> f64 {
        self.samples
            .front()
            .map(|first| seconds_between(first.timestamp, now))
            .unwrap_or(0.0)
    }
}

fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 1000.0
}
