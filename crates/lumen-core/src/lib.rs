// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
//! Process-wide plumbing shared by every lumen crate: tracing setup,
//! failure classes with their exit codes, and a frame clock.

mod clock;
mod failure;

pub use clock::FrameClock;
pub use failure::{classify, FailureClass};

pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init();
}
