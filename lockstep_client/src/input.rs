//! Input sampling.
//!
//! In a real engine this would integrate with windowing and action
//! bindings. This toy client only needs a deterministic per-tick move
//! vector to feed into an `Order`.

/// User input state at a moment in time.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InputState {
    pub forward: f32,
    pub right: f32,
    pub up: f32,
}
