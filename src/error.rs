//! The engine's distinguished error set (§3, §7).
//!
//! `Error` is deliberately open: most of a graph's terminal failures are
//! user-defined and travel through `Failure(Error::Custom(..))` unchanged.
//! The engine itself only ever constructs the four (five, with `Loop`)
//! distinguished variants below.

use std::fmt;
use std::sync::Arc;

/// A boxed, type-erased user error. `Arc` rather than `Box` because a single
/// terminal failure is frequently cloned into several successor queues by a
/// multi-output processor (§4.6) before any of them have dispatched it.
pub type CustomError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// The engine's open error set (§3).
///
/// Four variants are distinguished by the runtime itself: [`Error::Closed`]
/// is the ordinary end-of-stream, [`Error::Inactive`] and
/// [`Error::Cancelled`] are returned from `send` without ever being
/// delivered downstream (§7), and [`Error::Duplicate`] /
/// [`Error::Loop`] are delivered in-band through a synthetic pre-closed
/// signal so a subscriber never has to special-case an out-of-band failure
/// mode (§7).
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Normal end-of-stream. Not a bug; every signal eventually closes.
    #[error("signal closed")]
    Closed,

    /// `send` was rejected because the channel has no active sink, or was
    /// torn down before the send reached it.
    #[error("channel is inactive")]
    Inactive,

    /// A second subscriber attached to a channel that only supports one.
    #[error("channel already has a subscriber")]
    Duplicate,

    /// `send` was rejected because its activation-counter snapshot is
    /// stale, or the input's channel was torn down.
    #[error("send was cancelled (stale or torn-down channel)")]
    Cancelled,

    /// `join` would have introduced a cycle in the predecessor DAG.
    #[error("join would create a graph cycle")]
    Loop,

    /// A user-supplied terminal error, propagated unchanged.
    #[error(transparent)]
    Custom(#[from] CustomError),
}

impl Error {
    /// Wraps an arbitrary `std::error::Error` as a [`Error::Custom`].
    pub fn custom<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Custom(Arc::new(err))
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Error::Closed)
    }
}

/// The sum type carried by every channel queue entry (§3: `Result<T>`).
///
/// Named `Outcome` rather than `Result` to avoid clashing with
/// [`std::result::Result`] at every call site throughout the crate.
#[derive(Debug, Clone)]
pub enum Outcome<T> {
    Success(T),
    Failure(Error),
}

impl<T> Outcome<T> {
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failure(_))
    }

    pub fn as_failure(&self) -> Option<&Error> {
        match self {
            Outcome::Failure(e) => Some(e),
            Outcome::Success(_) => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Success(v) => Outcome::Success(f(v)),
            Outcome::Failure(e) => Outcome::Failure(e),
        }
    }
}

impl<T: fmt::Debug> fmt::Display for Outcome<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success(v) => write!(f, "Success({v:?})"),
            Outcome::Failure(e) => write!(f, "Failure({e})"),
        }
    }
}

/// Operational errors returned directly to a `send` caller, never delivered
/// downstream (§7).
pub type SendError = Error;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_transforms_success_and_passes_failure_through() {
        let success: Outcome<i32> = Outcome::Success(4);
        assert!(matches!(success.map(|v| v * 2), Outcome::Success(8)));

        let failure: Outcome<i32> = Outcome::Failure(Error::Closed);
        match failure.map(|v| v * 2) {
            Outcome::Failure(Error::Closed) => {}
            other => panic!("expected Failure(Closed), got {other:?}"),
        }
    }

    #[test]
    fn as_failure_and_is_failure_agree() {
        let success: Outcome<i32> = Outcome::Success(1);
        assert!(!success.is_failure());
        assert!(success.as_failure().is_none());

        let failure: Outcome<i32> = Outcome::Failure(Error::Inactive);
        assert!(failure.is_failure());
        assert!(failure.as_failure().is_some());
    }

    #[test]
    fn only_closed_reports_is_closed() {
        assert!(Error::Closed.is_closed());
        assert!(!Error::Inactive.is_closed());
        assert!(!Error::Loop.is_closed());
    }
}
