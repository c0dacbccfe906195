//! Infrastructure adapters: durable storage behind the engine's traits.

pub mod counter;

pub use counter::postgres::PostgresRevocationCounter;
