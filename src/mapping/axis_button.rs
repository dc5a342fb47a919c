//! Axis edge detector
//!
//! Turns a continuous axis value into button style press/release events.
//! The button counts as pressed while the value lies inside the configured
//! window; only entering and leaving the window produce events.

/// Event emitted on a window crossing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeEvent {
    Press,
    Release,
}

impl EdgeEvent {
    pub fn is_pressed(self) -> bool {
        matches!(self, EdgeEvent::Press)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EdgeState {
    Released,
    Pressed,
}

/// Edge triggered detector over the window `[lower, upper]`
#[derive(Debug, Clone)]
pub struct AxisButton {
    lower: f64,
    upper: f64,
    state: EdgeState,
}

impl AxisButton {
    /// Creates a detector; the limits are swapped if given in reverse order.
    pub fn new(lower_limit: f64, upper_limit: f64) -> Self {
        Self {
            lower: lower_limit.min(upper_limit),
            upper: lower_limit.max(upper_limit),
            state: EdgeState::Released,
        }
    }

    /// Feeds a sample. `callback` is invoked only if this sample causes a
    /// transition, and only for this call.
    pub fn process<F>(&mut self, value: f64, callback: F)
    where
        F: FnOnce(EdgeEvent),
    {
        let inside = self.lower <= value && value <= self.upper;

        let (next, event) = match (self.state, inside) {
            (EdgeState::Released, true) => (EdgeState::Pressed, Some(EdgeEvent::Press)),
            (EdgeState::Released, false) => (EdgeState::Released, None),
            (EdgeState::Pressed, false) => (EdgeState::Released, Some(EdgeEvent::Release)),
            (EdgeState::Pressed, true) => (EdgeState::Pressed, None),
        };

        self.state = next;
        if let Some(event) = event {
            callback(event);
        }
    }

    pub fn is_pressed(&self) -> bool {
        self.state == EdgeState::Pressed
    }

    pub fn window(&self) -> (f64, f64) {
        (self.lower, self.upper)
    }
}
