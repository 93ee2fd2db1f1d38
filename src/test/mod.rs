//! Shared helpers for the crate's unit tests.

pub mod factories;
