// SPDX-License-Identifier: Apache-2.0

//! Destination for parsed records.

use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::Notify;

use crate::record::Record;

/// Receives records produced by the parser. Implementations must tolerate
/// being called from any task.
pub trait Accumulator: Send + Sync {
    fn add_record(&self, record: Record);
}

/// Keeps every record in memory.
#[derive(Default)]
pub struct CollectingAccumulator {
    records: Mutex<Vec<Record>>,
    notify: Notify,
}

impl CollectingAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the records received so far
    pub fn records(&self) -> Vec<Record> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn len(&self) -> usize {
        match self.records.lock() {
            Ok(records) => records.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Waits until at least `count` records arrived. Returns false on timeout.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // register before checking so a concurrent add is not missed
            notified.as_mut().enable();

            if self.len() >= count {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.len() >= count;
            }
        }
    }
}

impl Accumulator for CollectingAccumulator {
    fn add_record(&self, record: Record) {
        match self.records.lock() {
            Ok(mut records) => records.push(record),
            Err(poisoned) => poisoned.into_inner().push(record),
        }
        self.notify.notify_waiters();
    }
}
