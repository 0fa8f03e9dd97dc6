//! Dead-letter sink that records entries in memory.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on a poisoned lock

use order_cache_core::{BoxFuture, DeadLetter, DeadLetterError, DeadLetterSink};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// In-memory [`DeadLetterSink`].
#[derive(Clone, Debug, Default)]
pub struct RecordingDeadLetterSink {
    letters: Arc<Mutex<Vec<DeadLetter>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingDeadLetterSink {
    /// Create an empty sink
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `record` fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Recorded entries, oldest first
    #[must_use]
    pub fn letters(&self) -> Vec<DeadLetter> {
        self.letters.lock().unwrap().clone()
    }

    /// Number of recorded entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.letters.lock().unwrap().len()
    }

    /// Check if nothing was recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DeadLetterSink for RecordingDeadLetterSink {
    fn record<'a>(&'a self, letter: &'a DeadLetter) -> BoxFuture<'a, Result<i64, DeadLetterError>> {
        Box::pin(async move {
            if self.failing.load(Ordering::SeqCst) {
                return Err(DeadLetterError::WriteFailed(
                    "dead letter sink unavailable".to_string(),
                ));
            }
            let mut letters = self.letters.lock().unwrap();
            letters.push(letter.clone());
            Ok(i64::try_from(letters.len()).unwrap_or(i64::MAX))
        })
    }
}
