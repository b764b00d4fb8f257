use parking_lot::Mutex;

#[derive(Debug, Default)]
struct GuardState {
    pending: bool,
    generation: u64,
}

/// Single-flight guard for scheduled restarts of one component.
///
/// A claim is tagged with the generation it was made in; invalidating the
/// guard bumps the generation so sleeping restarts wake up stale.
#[derive(Debug, Default)]
pub(super) struct RestartGuard {
    state: Mutex<GuardState>,
}

impl RestartGuard {
    /// Claim the restart slot, `None` while another restart is pending
    pub fn try_claim(&self) -> Option<u64> {
        let mut state = self.state.lock();
        if state.pending {
            return None;
        }
        state.pending = true;
        Some(state.generation)
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.state.lock().generation == generation
    }

    /// Release a claim; stale claims leave the slot alone
    pub fn finish(&self, generation: u64) {
        let mut state = self.state.lock();
        if state.generation == generation {
            state.pending = false;
        }
    }

    /// Drop every outstanding claim
    pub fn invalidate(&self) {
        let mut state = self.state.lock();
        state.generation = state.generation.wrapping_add(1);
        state.pending = false;
    }

    #[cfg(test)]
    pub fn is_pending(&self) -> bool {
        self.state.lock().pending
    }
}
