//! Core kernel modules
//!
//! Configuration, errors, types, interrupt masking and the contract with
//! the thread scheduler.

pub mod config;
pub mod critical;
pub mod error;
pub mod kernel;
pub mod types;
