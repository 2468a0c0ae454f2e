use serde::Serialize;

/// Min/max/sum over recorded values.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Spread {
    pub count: u64,
    pub sum: u64,
    pub min: u64,
    pub max: u64,
}

impl Spread {
    pub fn record(&mut self, value: u64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        self.sum += value;
    }
}

/// Counters of one mounted view. Deterministic: no clocks, no hashing order.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SyncMetrics {
    /// Reconcile passes, including empty ones.
    pub batches: u64,
    /// Size of non-empty batches.
    pub batch_size: Spread,
    pub commands_run: u64,
    pub commands_queued: u64,
    pub commands_rejected: u64,
    /// Queued commands run when the engine became ready.
    pub commands_flushed: u64,
    pub echoes_suppressed: u64,
    pub events_dispatched: u64,
    pub events_dropped: u64,
    pub camera_writes_user: u64,
    pub camera_writes_programmatic: u64,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_batch(&mut self, len: usize) {
        self.batches += 1;
        if len > 0 {
            self.batch_size.record(len as u64);
        }
    }

    pub fn commands_issued(&self) -> u64 {
        self.commands_run + self.commands_queued
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
