use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

/// Cloneable handle used to request and await application shutdown.
///
/// Requesting shutdown is idempotent: the first call wins, repeats are
/// ignored, and the teardown sequence driven off `wait` runs once.
#[derive(Clone)]
pub struct ShutdownHandle {
    inner: Arc<Shutdown>,
}

struct Shutdown {
    fired: AtomicBool,
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            inner: Arc::new(Shutdown {
                fired: AtomicBool::new(false),
                tx,
            }),
        }
    }

    pub fn shutdown(&self) {
        if !self.inner.fired.swap(true, Ordering::SeqCst) {
            info!("shutdown requested");
            self.inner.tx.send_replace(true);
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.fired.load(Ordering::SeqCst)
    }

    pub async fn wait(&self) {
        let mut rx = self.inner.tx.subscribe();
        if *rx.borrow() {
            return;
        }
        let _ = rx.changed().await;
    }
}

/// Background listener that turns ctrl-c / SIGTERM into a shutdown request.
pub(crate) async fn wait_for_signals(handle: ShutdownHandle) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for ctrl-c: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!("failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl-c"),
        _ = terminate => info!("received terminate signal"),
    }
    handle.shutdown();
}
