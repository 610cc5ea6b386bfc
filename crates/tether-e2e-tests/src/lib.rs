//! End-to-end integration tests for Tether.
//!
//! This crate has no library code; everything lives under `tests/`.
