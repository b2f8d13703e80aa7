use tracing::error;

use super::notification::ObjectChangeEvent;
use crate::inference::InferenceError;

/// Decides what happens to a file whose batch could not be scored.
pub trait BatchFailurePolicy: Send + Sync + std::fmt::Debug {
    fn on_inference_failure(&self, event: &ObjectChangeEvent, rows: usize, error: &InferenceError);
}

/// Logs the failure and drops the batch. No records are written for the file
/// and it is not retried.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAndDrop;

impl BatchFailurePolicy for LogAndDrop {
    fn on_inference_failure(&self, event: &ObjectChangeEvent, rows: usize, err: &InferenceError) {
        error!(
            uri = %event.uri(),
            rows,
            error = %err,
            "inference failed, dropping batch"
        );
    }
}
