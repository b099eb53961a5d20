/*!
 * Cooperative cancellation
 *
 * A `CancelToken` is tripped by Ctrl-C and checked at safe points: between
 * archive entries and once per poll cycle. In-flight HTTP requests are left
 * to finish so the server task is never left in an unknown state by us.
 */

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crate::error::{Result, RsconnectError};

#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Return `UserCancelled` if the token has been tripped
    pub fn check(&self, stage: &str) -> Result<()> {
        if self.is_cancelled() {
            Err(RsconnectError::UserCancelled {
                stage: stage.to_string(),
            })
        } else {
            Ok(())
        }
    }
}

/// Trip `token` on the first Ctrl-C
///
/// The listener runs on its own thread with a single-threaded runtime, so
/// the rest of the program stays synchronous.
pub fn install_interrupt_handler(token: CancelToken) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| RsconnectError::Other(format!("Failed to start signal listener: {}", e)))?;

    thread::Builder::new()
        .name("rsconnect-signal".to_string())
        .spawn(move || {
            runtime.block_on(async {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Interrupt received; stopping at the next safe point");
                    token.cancel();
                }
            });
        })
        .map_err(RsconnectError::Io)?;

    Ok(())
}
