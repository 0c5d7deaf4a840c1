//! Shutdown coordination: a broadcast stop signal fanned out to the poller,
//! every pool worker, and any in-flight dispatch. The trigger is latched, so
//! a listener subscribing after the signal still observes it immediately.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

/// Cloneable handle that triggers and distributes the stop signal.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
    triggered: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            triggered: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn subscribe(&self) -> ShutdownListener {
        ShutdownListener {
            rx: self.tx.subscribe(),
            triggered: Arc::clone(&self.triggered),
            fired: false,
        }
    }

    /// Signals every listener, current and future. Idempotent.
    pub fn trigger(&self) {
        self.triggered.store(true, Ordering::SeqCst);
        let _ = self.tx.send(());
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-task view of the stop signal. Once observed, [`ShutdownListener::recv`]
/// resolves immediately on every later call.
#[derive(Debug)]
pub struct ShutdownListener {
    rx: broadcast::Receiver<()>,
    triggered: Arc<AtomicBool>,
    fired: bool,
}

impl ShutdownListener {
    pub async fn recv(&mut self) {
        if self.fired || self.triggered.load(Ordering::SeqCst) {
            self.fired = true;
            return;
        }
        // Closed and Lagged both mean the signal is gone or already sent;
        // either way the task must stop.
        let _ = self.rx.recv().await;
        self.fired = true;
    }
}

/// Blocks until SIGINT or SIGTERM arrives.
pub async fn wait_for_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result,
            _ = term.recv() => Ok(()),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}
