//! Batch gateway — batch subscribe/unsubscribe/broadcast with
//! partial-success semantics: a failure on one channel never aborts the
//! rest of the batch.

use std::collections::HashMap;

/// Result of a batch operation: channels that succeeded, and the reason
/// each failed channel didn't.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOutcome {
    pub succeeded: Vec<String>,
    pub failed: HashMap<String, String>,
}

impl BatchOutcome {
    fn record(&mut self, channel: String, result: Result<(), String>) {
        match result {
            Ok(()) => self.succeeded.push(channel),
            Err(reason) => {
                self.failed.insert(channel, reason);
            }
        }
    }
}

/// Runs `operation` over `items`, capped at `max_batch_size`; items beyond
/// the cap are reported as failed with a capacity reason rather than
/// silently dropped. `key` names each item in the outcome (the channel name
/// for subscribe/unsubscribe/broadcast items alike).
pub async fn run_batch<T, F, Fut>(
    items: Vec<T>,
    max_batch_size: usize,
    key: impl Fn(&T) -> String,
    mut operation: F,
) -> BatchOutcome
where
    F: FnMut(T) -> Fut,
    Fut: std::future::Future<Output = Result<(), String>>,
{
    let mut outcome = BatchOutcome::default();
    for (index, item) in items.into_iter().enumerate() {
        let name = key(&item);
        if index >= max_batch_size {
            outcome.failed.insert(name, "batch size limit exceeded".to_owned());
            continue;
        }
        let result = operation(item).await;
        outcome.record(name, result);
    }
    outcome
}
