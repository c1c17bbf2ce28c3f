//! Execution Timing for Blocking and Suspendable Functions
//!
//! This crate records how long marked functions take and reports each
//! measurement to a logging sink:
//! - A marker ([`timed!`] or [`Declaration::timed`]) selects the functions to time
//! - Blocking functions are timed from entry to return
//! - Suspendable functions are timed from entry to resumption, including the
//!   time spent suspended
//! - Measurements go to a [`TimingSink`]; sink failures never reach the caller
//!
//! Suspendable functions come in two forms. `async fn`s are wrapped in a
//! [`TimedFuture`]. Functions written in continuation-passing form, which
//! return immediately and deliver their outcome through a
//! [`ResumptionHandle`], are timed by a [`SuspendingTimer`] or registered
//! with an [`Interceptor`] that classifies each call by its arguments.
//!
//! # Feature Flags
//!
//! - `telemetry` (default): Delivers measurements to the sink. Without it
//!   calls are still wrapped but nothing is emitted.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use timed::{set_global_sink, timed, MemorySink};
//!
//! timed! {
//!     fn render(page: u32) -> String {
//!         format!("page {}", page)
//!     }
//! }
//!
//! let sink = Arc::new(MemorySink::new());
//! set_global_sink(sink.clone());
//!
//! assert_eq!(render(3), "page 3");
//! # #[cfg(feature = "telemetry")]
//! assert_eq!(sink.len(), 1);
//! ```

mod classify;
mod config;
mod error;
mod handle;
mod interceptor;
mod marker;
mod signature;
mod sink;
mod suspend;
mod timing;

pub use classify::*;
pub use config::*;
pub use error::*;
pub use handle::*;
pub use interceptor::*;
pub use marker::*;
pub use signature::*;
pub use sink::*;
pub use suspend::*;
pub use timing::*;

/// Re-export for convenience
pub use std::time::Duration;
