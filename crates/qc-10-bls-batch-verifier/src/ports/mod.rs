//! # Ports Layer
//!
//! Trait definitions for the hexagonal architecture.
//! - **Inbound (Driving)**: the verification API callers use
//! - **Outbound (Driven)**: crypto and compute executors this subsystem needs

pub mod inbound;
pub mod outbound;
