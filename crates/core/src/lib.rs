//! `gatekeep-core`: shared primitives for the authorization engine.
//!
//! This crate contains **pure** building blocks (no IO, no crypto).

pub mod clock;
pub mod id;

pub use clock::{Clock, FixedClock, SystemClock};
pub use id::{InvalidId, PrincipalId};
