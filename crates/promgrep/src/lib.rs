//! Top-level facade crate for promgrep.
//!
//! Re-exports the core rule types and the exporter library so users can
//! depend on a single crate.

pub mod core {
    pub use promgrep_core::*;
}

pub mod exporter {
    pub use promgrep_exporter::*;
}
