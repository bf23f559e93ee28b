//! # Domain Layer
//!
//! Verification jobs, buffering and chunking rules, and the BLS primitives.
//! Nothing in here spawns tasks or talks to executors.

pub mod bls;
pub mod chunk;
pub mod config;
pub mod entities;
pub mod errors;
pub mod job;
pub mod work;
