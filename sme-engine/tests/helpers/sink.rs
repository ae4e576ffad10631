//! Output sink that records what it receives

use sme_engine::media::{BufferedUnit, OutputSink};
use std::sync::{Arc, Mutex};

/// Records delivered timestamps; `None` entries are gaps
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    received: Arc<Mutex<Vec<Option<f64>>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Boxed clone sharing the same record, ready for `set_output_sink`
    pub fn boxed(&self) -> Option<Box<dyn OutputSink>> {
        Some(Box::new(self.clone()))
    }

    pub fn received(&self) -> Vec<Option<f64>> {
        self.received.lock().unwrap().clone()
    }

    /// Timestamps of delivered units, gaps left out
    pub fn timestamps(&self) -> Vec<f64> {
        self.received().into_iter().flatten().collect()
    }

    pub fn gaps(&self) -> usize {
        self.received().iter().filter(|r| r.is_none()).count()
    }

    /// How many times a unit starting at `timestamp` was delivered
    pub fn count_of(&self, timestamp: f64) -> usize {
        self.timestamps()
            .iter()
            .filter(|ts| (**ts - timestamp).abs() < 1e-6)
            .count()
    }

    pub fn clear(&self) {
        self.received.lock().unwrap().clear();
    }
}

impl OutputSink for RecordingSink {
    fn deliver(&mut self, unit: Option<&BufferedUnit>) {
        self.received.lock().unwrap().push(unit.map(|u| u.timestamp));
    }
}
