//! Response side of the status exchange
//!
//! This module handles:
//! - Waiting, with a deadline, for the first response byte
//! - Draining the response line by line to the operator

mod drainer;
mod waiter;

pub use drainer::{drain_and_emit, DrainPolicy};
pub use waiter::{await_first_byte, WaitOutcome};
