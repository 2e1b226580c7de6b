//! Tessera command-line runner
//!
//! Loads a JSON node store and a JSON query plan, runs the plan through the
//! tessera-core processor and prints the results as a table, JSON or CSV.

pub mod commands;
pub mod config;
pub mod output;
