use signal_hook::SigId;
use signal_hook::consts::SIGINT;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared "auto-complete armed" switch.
///
/// The line editor only reads it; the interrupt handler installed by
/// [`AutoComplete::toggle_on_interrupt`] is the only asynchronous writer. Clones
/// share the same flag.
#[derive(Debug, Clone, Default)]
pub struct AutoComplete {
    armed: Arc<AtomicBool>,
}

impl AutoComplete {
    pub fn new(armed: bool) -> Self {
        Self {
            armed: Arc::new(AtomicBool::new(armed)),
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }

    pub fn set_armed(&self, armed: bool) {
        self.armed.store(armed, Ordering::SeqCst);
    }

    /// Flip the flag, returning the new state.
    pub fn toggle(&self) -> bool {
        !self.armed.fetch_xor(true, Ordering::SeqCst)
    }

    /// Make every SIGINT delivered to this process flip the flag.
    ///
    /// Nothing else happens on interrupt; in particular the shell does not
    /// terminate. Child processes get the default disposition back on exec.
    pub fn toggle_on_interrupt(&self) -> io::Result<SigId> {
        let armed = Arc::clone(&self.armed);
        // SAFETY: the action only performs a lock-free atomic xor, which is
        // async-signal-safe.
        unsafe {
            signal_hook::low_level::register(SIGINT, move || {
                armed.fetch_xor(true, Ordering::SeqCst);
            })
        }
    }
}
