//! Run coordination
//!
//! Cancellation plumbing shared by live orchestration and backtests.

pub mod cancel;

pub use cancel::{cancel_on_ctrl_c, CancelReason, CancelToken};
