//! The node layer (§3, §4.1, §4.2): channel state machine, delivery phase,
//! and the timestamped predecessor set. Everything in `crate::handler` and
//! `crate::signal` is built on top of this module; nothing in here knows
//! about any concrete handler family.

pub mod channel;
pub mod phase;
pub mod predecessor;
