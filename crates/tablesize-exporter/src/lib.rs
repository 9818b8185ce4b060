//! tablesize exporter library entry.
//!
//! Wires the catalog source, refresh loop, metrics registry and HTTP
//! publisher together. Consumed by the binary (`main.rs`) and by integration
//! tests.

pub mod app_state;
pub mod config;
pub mod obs;
pub mod ops;
pub mod refresh;
pub mod router;
pub mod source;
