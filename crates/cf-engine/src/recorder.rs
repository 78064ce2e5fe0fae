//! Run-scoped, append-only log of successful evaluations.

use parking_lot::Mutex;

use cf_types::EvaluationRecord;

/// Shared by `Arc` between the driver and every concurrent evaluation.
///
/// Appends are linearizable; reads are meant for after the algorithm has
/// returned.
#[derive(Debug, Default)]
pub struct EvaluationRecorder {
    records: Mutex<Vec<EvaluationRecord>>,
}

impl EvaluationRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, record: EvaluationRecord) {
        self.records.lock().push(record);
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Copy of everything recorded so far, in completion order.
    pub fn snapshot(&self) -> Vec<EvaluationRecord> {
        self.records.lock().clone()
    }

    /// Take every record, leaving the recorder empty.
    pub fn drain(&self) -> Vec<EvaluationRecord> {
        std::mem::take(&mut *self.records.lock())
    }
}
