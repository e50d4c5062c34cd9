//! Shutdown coordination between the termination handler and the consume
//! loop.
//!
//! The handler arms [`ShutdownSignal`] and then waits on the loop's
//! [`CompletionBarrier`]. That ordering is what guarantees the final
//! synchronous commit and resource release happen before process exit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::signal;
use tokio::sync::oneshot;
use tracing::{info, warn};

/// Single-writer, multi-reader termination flag. Set once, never reset.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    requested: Arc<AtomicBool>,
}

impl ShutdownSignal {
    fn new() -> Self {
        Self {
            requested: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

/// One-shot barrier the loop satisfies after its final commit and close.
#[derive(Debug)]
pub struct CompletionBarrier {
    done: oneshot::Sender<()>,
}

impl CompletionBarrier {
    /// Satisfies the barrier. Consuming `self` makes a second completion
    /// unrepresentable.
    pub fn complete(self) {
        // The handler may already be gone if the process is exiting on an
        // error path; nothing left to notify then.
        let _ = self.done.send(());
    }
}

/// Owns the signal/barrier pair for one process run.
#[derive(Debug)]
pub struct ShutdownCoordinator {
    signal: ShutdownSignal,
    done: oneshot::Receiver<()>,
}

impl ShutdownCoordinator {
    pub fn new() -> (Self, CompletionBarrier) {
        let (done_tx, done_rx) = oneshot::channel();
        let coordinator = Self {
            signal: ShutdownSignal::new(),
            done: done_rx,
        };
        (coordinator, CompletionBarrier { done: done_tx })
    }

    /// A handle the loop polls every iteration.
    pub fn signal(&self) -> ShutdownSignal {
        self.signal.clone()
    }

    /// Arms the signal, then blocks until the loop has drained: final
    /// synchronous commit, source close, barrier completion.
    pub async fn initiate(self) {
        info!("shutdown requested, waiting for consume loop to drain");
        self.signal.request();
        if self.done.await.is_err() {
            warn!("consume loop dropped its completion barrier without finishing a drain");
        }
    }
}

/// Resolves when the process receives SIGTERM or SIGINT.
pub async fn termination_signal() {
    let mut term = signal::unix::signal(signal::unix::SignalKind::terminate())
        .expect("failed to register SIGTERM handler");

    let mut interrupt = signal::unix::signal(signal::unix::SignalKind::interrupt())
        .expect("failed to register SIGINT handler");

    tokio::select! {
        _ = term.recv() => {},
        _ = interrupt.recv() => {},
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_starts_unrequested() {
        let (coordinator, _barrier) = ShutdownCoordinator::new();
        assert!(!coordinator.signal().is_requested());
    }

    #[test]
    fn signal_is_monotonic_across_clones() {
        let (coordinator, _barrier) = ShutdownCoordinator::new();
        let observer = coordinator.signal();
        let writer = coordinator.signal();

        writer.request();
        writer.request();

        assert!(observer.is_requested());
        assert!(coordinator.signal().is_requested());
    }

    #[tokio::test]
    async fn initiate_returns_after_barrier_completes() {
        let (coordinator, barrier) = ShutdownCoordinator::new();
        let signal = coordinator.signal();

        let drainer = tokio::spawn(async move {
            while !signal.is_requested() {
                tokio::task::yield_now().await;
            }
            barrier.complete();
        });

        coordinator.initiate().await;
        drainer.await.unwrap();
    }

    #[tokio::test]
    async fn initiate_survives_a_dropped_barrier() {
        let (coordinator, barrier) = ShutdownCoordinator::new();
        drop(barrier);

        // Must not hang; the warn path covers a loop that died early.
        coordinator.initiate().await;
    }
}
