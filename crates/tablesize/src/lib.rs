//! Top-level facade crate for tablesize.
//!
//! Re-exports core types and the exporter library so users can depend on a single crate.

pub mod core {
    pub use tablesize_core::*;
}

pub mod exporter {
    pub use tablesize_exporter::*;
}
