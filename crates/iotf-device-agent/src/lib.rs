//! IoT Foundation device agent library.
//!
//! Re-exports all modules so external crates (e.g. `iotf-e2e-tests`) can
//! drive the agent's subscription, command and status logic against a
//! mock transport.

pub mod commands;
pub mod config;
pub mod startup;
pub mod status;
