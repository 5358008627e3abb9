//! m021-capture library crate.
//!
//! Threaded frame capture for the Leopard Imaging LI-USB30-M021 camera: a
//! dedicated thread keeps a shared BGR buffer filled with the newest frame,
//! and consumers read it under the same lock.

pub mod camera;
pub mod cli;
pub mod config;
pub mod monitor;
