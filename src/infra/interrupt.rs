// ============================================================
// Layer 6 — Interrupt Handling
// ============================================================
// Ctrl-C during training raises the model's StopToken, so the
// loop ends at the next epoch boundary with every finished epoch
// already checkpointed. A second Ctrl-C exits immediately.
//
// The signal is awaited on a small current-thread Tokio runtime
// owned by a background thread; training itself stays synchronous.

use anyhow::{Context, Result};
use std::thread;

use crate::ml::trainer::StopToken;

/// Exit status used for a forced exit (128 + SIGINT).
pub const FORCED_EXIT_CODE: i32 = 130;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptAction {
    /// First interrupt: stop after the current epoch
    Graceful,
    /// Interrupt while a stop is already pending
    Force,
}

/// Record one interrupt against `token`.
pub fn on_interrupt(token: &StopToken) -> InterruptAction {
    if token.is_stopped() {
        InterruptAction::Force
    } else {
        token.stop();
        InterruptAction::Graceful
    }
}

/// Spawn the listener that forwards Ctrl-C to `token`.
pub fn stop_on_interrupt(token: StopToken) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Cannot start the interrupt listener")?;

    thread::Builder::new()
        .name("interrupt".to_string())
        .spawn(move || loop {
            if let Err(e) = runtime.block_on(tokio::signal::ctrl_c()) {
                tracing::warn!("Interrupt listener stopped: {e}");
                return;
            }
            match on_interrupt(&token) {
                InterruptAction::Graceful => {
                    tracing::warn!("Interrupt received, stopping after the current epoch");
                }
                InterruptAction::Force => {
                    tracing::error!("Force-exiting training.");
                    std::process::exit(FORCED_EXIT_CODE);
                }
            }
        })
        .context("Cannot spawn the interrupt listener")?;
    Ok(())
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_interrupt_stops_second_forces() {
        let token = StopToken::new();
        let shared = token.clone();

        assert_eq!(on_interrupt(&token), InterruptAction::Graceful);
        assert!(shared.is_stopped());
        assert_eq!(on_interrupt(&token), InterruptAction::Force);
    }

    #[test]
    fn test_interrupt_after_reset_is_graceful_again() {
        let token = StopToken::new();
        on_interrupt(&token);
        token.reset();
        assert_eq!(on_interrupt(&token), InterruptAction::Graceful);
    }
}
