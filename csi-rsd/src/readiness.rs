//! Plugin readiness.
//!
//! Starts out not ready and flips to ready exactly once, right before the
//! driver begins accepting connections.  Read by the Identity `Probe` RPC.

use std::sync::{Mutex, PoisonError};

/// Lock-guarded readiness flag.
#[derive(Debug, Default)]
pub struct Readiness {
    ready: Mutex<bool>,
}

impl Readiness {
    /// A flag in the not-ready state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether bootstrap has completed.
    pub fn is_ready(&self) -> bool {
        *self.ready.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enter the ready state.  There is no way back.
    pub fn mark_ready(&self) {
        *self.ready.lock().unwrap_or_else(PoisonError::into_inner) = true;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn starts_not_ready_and_stays_ready() {
        let r = Readiness::new();
        assert!(!r.is_ready());
        r.mark_ready();
        assert!(r.is_ready());
        r.mark_ready();
        assert!(r.is_ready());
    }

    #[test]
    fn readers_never_see_the_flag_go_back() {
        let r = Arc::new(Readiness::new());
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let r = Arc::clone(&r);
                std::thread::spawn(move || {
                    let mut seen_ready = false;
                    for _ in 0..10_000 {
                        let now = r.is_ready();
                        assert!(!(seen_ready && !now));
                        seen_ready |= now;
                    }
                })
            })
            .collect();
        r.mark_ready();
        for h in readers {
            h.join().unwrap();
        }
        assert!(r.is_ready());
    }
}
