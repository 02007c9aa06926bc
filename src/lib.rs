//! `cascade`: a reactive dataflow signal engine.
//!
//! Directed graphs of typed, push-based signals with deterministic
//! delivery. A [`signal::Signal<T>`] wraps one node; composition operations
//! (`transform`, `combine`, the multi-output variants, `capture`,
//! `junction`, `merge`) build new signals out of existing ones, all driven
//! by a pluggable [`context::ExecutionContext`].
//!
//! ```
//! use std::sync::Arc;
//! use cascade::context::immediate::ImmediateContext;
//! use cascade::signal;
//!
//! let ctx = ImmediateContext::new();
//! let (source, signal) = signal::input::<i32>();
//! let doubled = signal.transform(ctx.clone(), |item, cont| {
//!     let _ = cont.send(item.map(|v| v * 2));
//! });
//! let _endpoint = doubled.subscribe(ctx, false, |item| {
//!     if let cascade::error::Outcome::Success(v) = item {
//!         assert_eq!(v, 84);
//!     }
//! }).unwrap();
//! source.send(cascade::error::Outcome::Success(42));
//! ```

pub mod config;
pub mod context;
pub mod continuation;
pub mod diagnostics;
pub mod error;
pub mod handler;
pub mod ids;
pub mod ledger;
pub mod node;
pub mod signal;

pub use config::EngineConfig;
pub use error::{Error, Outcome};
pub use signal::Signal;
