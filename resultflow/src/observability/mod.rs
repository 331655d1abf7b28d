//! Observability utilities.
//!
//! All combinators log through `tracing`; this module installs a
//! subscriber and times spans for log fields.

mod logging;
mod timer;

pub use logging::{init_tracing, LoggingConfig};
pub use timer::SpanTimer;
