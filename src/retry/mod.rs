//! Retrying transient failures.
//!
//! The pieces follow the "pure core, imperative shell" split:
//!
//! - **Pure core**: [`RetryPolicy`] is just data describing the retry budget and
//!   backoff curve; it is cloned, inspected and shrunk in tests.
//! - **Shell**: [`run`] and [`run_with_hook`] execute an operation, classify
//!   each failure, and sleep between attempts.
//!
//! Only [`ErrorClass::Transient`](crate::ErrorClass::Transient) failures are
//! retried. A permanent or unknown classification stops immediately, even if
//! retry budget remains.
//!
//! # Backoff Strategies
//!
//! - **Constant**: fixed delay between retries
//! - **Linear**: 100ms, 200ms, 300ms, ...
//! - **Exponential** (default): 100ms, 200ms, 400ms, ... capped at 2s
//! - **Fibonacci**: 100ms, 100ms, 200ms, 300ms, 500ms, ...
//!
//! Realized delays never decrease from one retry to the next, with or without
//! jitter. Enable the `jitter` feature for randomized delays:
//!
//! ```toml
//! terminus = { version = "...", features = ["jitter"] }
//! ```

mod error;
mod executor;
mod policy;

pub use error::{Attempted, ClassifiedError};
pub use executor::{run, run_with_hook, RetryEvent};
pub use policy::{
    JitterStrategy, RetryPolicy, RetryStrategy, DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY,
    DEFAULT_MAX_RETRIES,
};
