//! Deterministic random number generation
//!
//! Uses the xorshift64* algorithm. Every sampled delay, inter-arrival time
//! and branch decision in a replication goes through one `RngManager`.

mod xorshift;

pub use xorshift::RngManager;
