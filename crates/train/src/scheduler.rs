//! Simulated-annealing learning rate schedule.

// ── AnnealLr ────────────────────────────────────────────────────────────────

/// Multiplicative decay applied once per epoch.
///
/// After N completed epochs the rate is `initial * gamma^N`, computed in
/// closed form so resumed runs land on exactly the same value as
/// uninterrupted ones.
#[derive(Clone)]
pub struct AnnealLr {
    initial: f64,
    gamma: f64,
    epochs_done: usize,
}

impl AnnealLr {
    pub fn new(initial: f64, gamma: f64) -> Self {
        Self::with_epochs_done(initial, gamma, 0)
    }

    /// Start from a known number of completed epochs (resumed runs).
    pub fn with_epochs_done(initial: f64, gamma: f64, epochs_done: usize) -> Self {
        Self {
            initial,
            gamma,
            epochs_done,
        }
    }

    /// Learning rate for the upcoming epoch.
    pub fn current_lr(&self) -> f64 {
        self.initial * self.gamma.powi(self.epochs_done as i32)
    }

    /// Mark one epoch as completed.
    pub fn advance(&mut self) {
        self.epochs_done += 1;
    }

    pub fn epochs_done(&self) -> usize {
        self.epochs_done
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decay_law_holds() {
        let mut sched = AnnealLr::new(1e-4, 0.96);
        assert_eq!(sched.current_lr(), 1e-4);
        for _ in 0..3 {
            sched.advance();
        }
        assert_eq!(sched.current_lr(), 1e-4 * 0.96f64.powi(3));
        assert_eq!(sched.epochs_done(), 3);
    }

    #[test]
    fn unit_gamma_is_constant() {
        let mut sched = AnnealLr::new(5e-3, 1.0);
        for _ in 0..10 {
            sched.advance();
        }
        assert_eq!(sched.current_lr(), 5e-3);
    }

    #[test]
    fn resumed_schedule_matches_uninterrupted() {
        let mut fresh = AnnealLr::new(1e-4, 0.96);
        for _ in 0..5 {
            fresh.advance();
        }
        let resumed = AnnealLr::with_epochs_done(1e-4, 0.96, 5);
        assert_eq!(fresh.current_lr(), resumed.current_lr());
    }
}
