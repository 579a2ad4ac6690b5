//! Adaptive forgetting curve for episodic memories.
//!
//! ```text
//! stability  = 1 + k1 * ln(1 + access_count)          (+1 access if last hit was in a peak hour)
//! resistance = min(1, connections * k2)
//! rate       = base_rate * type_multiplier / stability * (1 - resistance)
//! decayed    = importance * exp(-rate * age_hours)
//! ```
//!
//! Old memories (older than `recency_age_hours`) that were touched within the
//! last `recency_access_hours` get `recency_boost` applied, capped at the value
//! the curve had when the memory first became "old", so the curve never rises
//! with age. The result is floored at `importance * min_retention`.

use chrono::{DateTime, Timelike, Utc};

use recall_types::config::DecayConfig;
use recall_types::memory::{MemoryRecord, MemoryType};

/// Everything the curve needs about one memory.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecayInputs {
    pub importance: f64,
    pub age_hours: f64,
    pub access_count: u32,
    /// Knowledge-graph connections attributed to this memory.
    pub connections: u32,
    pub hours_since_access: Option<f64>,
    /// Hour of day (0-23) of the last access.
    pub last_access_hour: Option<u32>,
    pub memory_type: Option<MemoryType>,
}

impl DecayInputs {
    pub fn new(importance: f64, age_hours: f64) -> Self {
        Self {
            importance,
            age_hours,
            access_count: 0,
            connections: 0,
            hours_since_access: None,
            last_access_hour: None,
            memory_type: None,
        }
    }

    /// Inputs for a stored record as of `now`.
    pub fn from_record(record: &MemoryRecord, connections: u32, now: DateTime<Utc>) -> Self {
        let since_access = (now - record.last_accessed).num_seconds().max(0) as f64 / 3600.0;
        Self {
            importance: record.importance,
            age_hours: record.age_hours(now),
            access_count: record.access_count,
            connections,
            hours_since_access: Some(since_access),
            last_access_hour: Some(record.last_accessed.hour()),
            memory_type: Some(record.memory_type),
        }
    }
}

/// Stateless evaluator of the forgetting curve.
#[derive(Debug, Clone, Default)]
pub struct DecayCalculator {
    config: DecayConfig,
}

impl DecayCalculator {
    pub fn new(config: DecayConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DecayConfig {
        &self.config
    }

    /// Effective per-hour decay rate for `inputs`.
    pub fn rate(&self, inputs: &DecayInputs) -> f64 {
        let c = &self.config;
        let mut access = inputs.access_count as f64;
        if let Some(hour) = inputs.last_access_hour {
            if c.peak_hours.contains(&hour) {
                access += 1.0;
            }
        }
        let stability = 1.0 + c.access_stability_k * (1.0 + access).ln();
        let resistance = (inputs.connections as f64 * c.relation_resistance_k).min(1.0);
        let type_multiplier = c.type_multipliers.for_type(inputs.memory_type);

        c.base_rate * type_multiplier / stability * (1.0 - resistance)
    }

    /// Decayed importance.
    pub fn decay(&self, inputs: &DecayInputs) -> f64 {
        let c = &self.config;
        let importance = inputs.importance.max(0.0);
        let age = inputs.age_hours.max(0.0);
        let rate = self.rate(inputs);

        let mut decayed = importance * (-rate * age).exp();

        let recently_used = inputs
            .hours_since_access
            .is_some_and(|h| h < c.recency_access_hours);
        if age > c.recency_age_hours && recently_used {
            let at_threshold = importance * (-rate * c.recency_age_hours).exp();
            decayed = (decayed * c.recency_boost).min(at_threshold);
            tracing::trace!(age_days = age / 24.0, "recency boost applied");
        }

        decayed.max(importance * c.min_retention)
    }

    /// Convenience wrapper for stored records.
    pub fn for_record(&self, record: &MemoryRecord, connections: u32, now: DateTime<Utc>) -> f64 {
        self.decay(&DecayInputs::from_record(record, connections, now))
    }
}
