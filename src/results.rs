//! In-memory observation buffer consumed by the aggregator.
//!
//! Append-only from workers; the aggregator only reads once the scheduler
//! has yielded its `RunResult` — readers wait until the scheduler returns.

use std::sync::{Arc, Mutex};

use crate::observation::Observation;

#[derive(Clone, Default)]
pub struct ResultsBuffer {
    inner: Arc<Mutex<Vec<Observation>>>,
}

impl ResultsBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, o: Observation) {
        self.inner.lock().unwrap().push(o);
    }

    pub fn snapshot(&self) -> Vec<Observation> {
        self.inner.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
