//! Driver implementations.

#[cfg(feature = "mock")]
pub mod mock;

#[cfg(feature = "postgres")]
pub mod postgres;
