//! Periodic test cycle
//!
//! This module handles:
//! - Probe configuration
//! - Running dial → request → response cycles at a fixed interval
//! - Reporting each cycle's outcome to the operator

mod driver;

pub use driver::{CycleDriver, ProbeConfig};
