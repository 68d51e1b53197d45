use anyhow::{Context, Result};
use signal_hook::consts::SIGINT;
use signal_hook::flag;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cooperative shutdown flag shared with the interrupt handler.
///
/// The handler only stores `true`; the event loop polls it once per iteration.
/// The store happens inside the signal handler itself, so a wait interrupted
/// by SIGINT already sees the flag set when it returns `EINTR`.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Route SIGINT to `stop`. A second SIGINT while the flag is already set
/// terminates the process.
pub fn install_interrupt_handler(stop: &StopFlag) -> Result<()> {
    // Registered first so it sees the flag before this signal sets it
    flag::register_conditional_shutdown(SIGINT, 130, Arc::clone(&stop.0))
        .context("Failed to install SIGINT handler")?;
    flag::register(SIGINT, Arc::clone(&stop.0)).context("Failed to install SIGINT handler")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let stop = StopFlag::new();
        let handler_side = stop.clone();
        assert!(!stop.is_set());
        handler_side.set();
        assert!(stop.is_set());
    }
}
