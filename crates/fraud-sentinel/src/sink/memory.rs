use std::sync::Mutex;

use async_trait::async_trait;

use super::{OutputRecord, RecordSink, SinkError};

/// Keeps appended records in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<OutputRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<OutputRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

#[async_trait]
impl RecordSink for MemorySink {
    async fn append(&self, records: &[OutputRecord]) -> Result<(), SinkError> {
        let mut guard = self
            .records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.extend_from_slice(records);
        Ok(())
    }
}
