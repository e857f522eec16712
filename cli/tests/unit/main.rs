//! Unit tests for burrow CLI
//!
//! These tests drive the public API against simulated hosts and run fast
//! without external I/O.

mod architecture;
mod mocks;
mod property_tests;
mod session_lifecycle;
