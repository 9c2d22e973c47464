//! A linker that records how often it was asked to link.

use futures::future::{BoxFuture, FutureExt};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};

use crate::linker::{LinkConfig, LinkError, SchemaLinker};
use crate::source::{ParsedSource, SourceIdentifier};

/// Model produced by [`CountingLinker`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedSchema {
    /// Linked sources, in the order they were handed over
    pub sources: Vec<SourceIdentifier>,
    /// Configuration the model was linked with
    pub config: LinkConfig,
    /// Unique per `link` call
    pub serial: u64,
}

/// Lets a test hold `link` calls until it releases them.
#[derive(Clone)]
pub struct LinkGate {
    permits: Arc<Semaphore>,
    entered: Arc<Notify>,
}

impl LinkGate {
    /// Wait until a `link` call has started.
    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    /// Let `count` held or future `link` calls finish.
    pub fn release(&self, count: usize) {
        self.permits.add_permits(count);
    }
}

/// [`SchemaLinker`] mock that counts calls and can delay, hold or fail them.
pub struct CountingLinker {
    calls: AtomicUsize,
    serial: AtomicU64,
    delay: Option<Duration>,
    gate: Option<LinkGate>,
    failure: Mutex<Option<LinkError>>,
}

impl Default for CountingLinker {
    fn default() -> Self {
        Self::new()
    }
}

impl CountingLinker {
    /// Linker that succeeds immediately.
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            serial: AtomicU64::new(0),
            delay: None,
            gate: None,
            failure: Mutex::new(None),
        }
    }

    /// Linker that sleeps for `delay` inside every call.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new()
        }
    }

    /// Linker whose calls block until released through the returned gate.
    pub fn gated() -> (Self, LinkGate) {
        let gate = LinkGate {
            permits: Arc::new(Semaphore::new(0)),
            entered: Arc::new(Notify::new()),
        };
        let linker = Self {
            gate: Some(gate.clone()),
            ..Self::new()
        };
        (linker, gate)
    }

    /// Make subsequent calls fail with `failure`, or succeed again with `None`.
    pub fn fail_with(&self, failure: Option<LinkError>) {
        if let Ok(mut slot) = self.failure.lock() {
            *slot = failure;
        }
    }

    /// Number of `link` calls so far.
    pub fn link_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SchemaLinker for CountingLinker {
    type Model = LinkedSchema;

    fn link<'a>(
        &'a self,
        sources: Vec<ParsedSource>,
        config: &'a LinkConfig,
    ) -> BoxFuture<'a, Result<LinkedSchema, LinkError>> {
        async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.entered.notify_one();
                if let Ok(permit) = gate.permits.acquire().await {
                    permit.forget();
                }
            }
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            let failure = self.failure.lock().ok().and_then(|slot| slot.clone());
            if let Some(failure) = failure {
                return Err(failure);
            }
            Ok(LinkedSchema {
                sources: sources.iter().map(|s| s.id().clone()).collect(),
                config: config.clone(),
                serial: self.serial.fetch_add(1, Ordering::SeqCst),
            })
        }
        .boxed()
    }
}
