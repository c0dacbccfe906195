//! Revocation counter backends.
//!
//! The in-memory backend lives next to the trait in `gatekeep-auth`; the
//! backends here survive process restarts.

pub mod postgres;
