/// Convert an engine progress fraction into a whole percentage.
///
/// Returns `None` for non-finite fractions. Finite values are rounded and clamped to `0..=100`.
pub fn fraction_to_percent(fraction: f64) -> Option<u8> {
    if !fraction.is_finite() {
        return None;
    }
    let pct = (fraction * 100.0).round().clamp(0.0, 100.0);
    Some(pct as u8)
}

/// Percentage tracker for a single conversion.
///
/// Engines may report regressive values; the tracked percentage never decreases until [`reset`].
///
/// [`reset`]: ProgressTracker::reset
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProgressTracker {
    percent: u8,
}

impl ProgressTracker {
    pub fn percent(&self) -> u8 {
        self.percent
    }

    pub fn reset(&mut self) {
        self.percent = 0;
    }

    /// Record a fraction and return `true` when the percentage moved.
    pub fn observe(&mut self, fraction: f64) -> bool {
        match fraction_to_percent(fraction) {
            Some(pct) if pct > self.percent => {
                self.percent = pct;
                true
            }
            _ => false,
        }
    }

    pub fn complete(&mut self) {
        self.percent = 100;
    }
}
