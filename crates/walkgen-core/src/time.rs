// ---------------------------------------------------------------------------
// Deadlines
// ---------------------------------------------------------------------------

/// Tolerance applied when comparing caller time against a deadline.
///
/// Caller clocks are usually sums of a fixed step, so a call meant to land
/// exactly on a deadline can arrive a few ULPs late and fire one period early.
/// A deadline only counts as exceeded once the caller is past it by more than
/// this margin.
pub const TIME_EPSILON: f64 = 1e-6;

/// Monotonic time threshold advanced in fixed increments.
///
/// The walkgen keeps two of these: one paced by the QP sampling period (rolling
/// window advance) and one paced by the MPC sampling period (re-solve trigger).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Deadline {
    limit: f64,
}

impl Deadline {
    /// Deadline at time zero.
    #[must_use]
    pub const fn new() -> Self {
        Self { limit: 0.0 }
    }

    /// Current threshold in seconds.
    #[must_use]
    pub const fn limit(&self) -> f64 {
        self.limit
    }

    /// Whether `time` is past the threshold by more than [`TIME_EPSILON`].
    #[must_use]
    pub fn is_exceeded(&self, time: f64) -> bool {
        time > self.limit + TIME_EPSILON
    }

    /// Move the threshold forward by one `period`.
    pub fn advance(&mut self, period: f64) {
        self.limit += period;
    }

    /// Back to time zero.
    pub const fn reset(&mut self) {
        self.limit = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn not_exceeded_at_limit() {
        let d = Deadline::new();
        assert!(!d.is_exceeded(0.0));
        assert!(!d.is_exceeded(TIME_EPSILON * 0.5));
        assert!(d.is_exceeded(2.0 * TIME_EPSILON));
    }

    #[test]
    fn accumulated_steps_do_not_chatter() {
        let mut d = Deadline::new();
        let period = 0.02;
        let mut t = 0.0;
        for _ in 0..500 {
            t += period;
            d.advance(period);
            // Summed clock and summed deadline agree within the tolerance.
            assert!(!d.is_exceeded(t));
        }
        assert_relative_eq!(d.limit(), 10.0, epsilon = 1e-9);
    }

    #[test]
    fn reset_returns_to_zero() {
        let mut d = Deadline::new();
        d.advance(0.1);
        d.advance(0.1);
        d.reset();
        assert_eq!(d.limit(), 0.0);
    }
}
