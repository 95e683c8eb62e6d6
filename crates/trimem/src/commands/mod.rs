//! Command implementations.

pub mod doctor;
pub mod graph;
pub mod memory;
