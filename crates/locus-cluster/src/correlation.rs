use std::sync::{Arc, Mutex};

use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::warn;

use locus_broker::Consumer;

/// Lifecycle of one location query.
///
/// `Issued` moves to exactly one of the two terminal states; terminal states
/// never change again.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueryState {
    Issued,
    /// A matching reply named this provider address.
    Resolved(String),
    /// The deadline passed first.
    Expired,
}

impl QueryState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Issued)
    }
}

/// Cancellation scope of one outstanding query.
///
/// Shared by the reply listener and the timeout timer. Whichever of them
/// calls [`settle`] first decides the outcome; the other's call is a no-op.
/// [`close`] cancels the scope's token and releases the reply consumer. The
/// consumer sits in a take-once slot, so it is released exactly once even if
/// both paths reach `close` concurrently.
///
/// [`settle`]: QueryScope::settle
/// [`close`]: QueryScope::close
pub struct QueryScope {
    state: Mutex<QueryState>,
    token: CancellationToken,
    consumer: Mutex<Option<Arc<Consumer>>>,
}

impl QueryScope {
    pub fn new(consumer: Arc<Consumer>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(QueryState::Issued),
            token: CancellationToken::new(),
            consumer: Mutex::new(Some(consumer)),
        })
    }

    pub fn state(&self) -> QueryState {
        self.state.lock().expect("query state lock poisoned").clone()
    }

    /// Move from `Issued` to `outcome`. Returns `true` if this call made the
    /// transition.
    pub fn settle(&self, outcome: QueryState) -> bool {
        debug_assert!(outcome.is_terminal());
        let mut state = self.state.lock().expect("query state lock poisoned");
        if state.is_terminal() {
            return false;
        }
        *state = outcome;
        true
    }

    /// Cancel the scope and release the reply consumer if it is still held.
    pub async fn close(&self) {
        self.token.cancel();
        let consumer = self.consumer.lock().expect("consumer slot lock poisoned").take();
        if let Some(consumer) = consumer {
            if let Err(e) = consumer.release().await {
                warn!(consumer = %consumer.id(), error = %e, "failed to release reply consumer");
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }
}

impl std::fmt::Debug for QueryScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryScope")
            .field("state", &self.state())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
