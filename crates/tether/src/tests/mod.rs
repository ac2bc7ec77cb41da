//! Integration-style tests for the tether host crate.

mod support;

mod loader_tests;
mod runtime_tests;
mod secret_behaviour;
