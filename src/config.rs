//! Crate-wide tunables (§1's ambient configuration surface).
//!
//! `cascade` is a library embedded in a host process, not a standalone
//! service, so there is no file/env configuration layer to speak of — the
//! one knob the design exposes is how much backing storage a freshly built
//! channel's queue starts with, mirroring the teacher's
//! const-generic-capacity convention but as a runtime value, since a
//! channel's queue here grows without a fixed bound.

/// Tunables applied when a [`crate::signal::Signal`] factory builds a new
/// channel.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Initial backing capacity for a freshly built channel's queue. Purely
    /// an allocation hint; the queue still grows past this without bound.
    pub initial_queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig { initial_queue_capacity: 0 }
    }
}
