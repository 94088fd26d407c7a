//! functional model of a set-associative cache with LRU replacement,
//! driven by memory access traces.

pub mod addr;
mod bin;
pub mod cache;
pub mod common;
pub mod config;
pub mod set;
pub mod sim;
pub mod trace;

#[cfg(feature = "stat")]
pub mod stat;
