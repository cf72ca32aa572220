// utils/optimistic.rs

/// Snapshot for the three-phase optimistic mutation: capture the current
/// cache state, apply the speculative change, then either drop the
/// snapshot (remote confirmed) or restore it verbatim (remote failed).
pub struct Rollback<T: Clone> {
    saved: T,
}

impl<T: Clone> Rollback<T> {
    pub fn capture(value: &T) -> Self {
        Self {
            saved: value.clone(),
        }
    }

    /// Restore the captured state into `slot`, discarding the speculative
    /// change.
    pub fn restore(self, slot: &mut T) {
        *slot = self.saved;
    }

    /// Confirm the speculative change; the snapshot is dropped.
    pub fn commit(self) {}
}
