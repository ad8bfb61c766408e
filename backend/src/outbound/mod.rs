//! Outbound adapters implementing the domain ports.

pub mod cache;
pub mod mail;
pub mod memory;
pub mod persistence;
pub mod queue;
