//! Per-connection handling for the status receiver
//!
//! Every accepted socket carries exactly one request: it is read until the
//! request is complete, answered, and closed.

mod connection;

pub use connection::{ReportSession, SessionOutcome};
