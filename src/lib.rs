//! Insider Scan: Polymarket insider-activity scanner
//!
//! This is the root crate; it exists for workspace-level integration
//! tests. For actual functionality, use the individual crates directly:
//!
//! - `polymarket-core`: domain types, API clients, the embedded store
//! - `insider-scanner`: trade reconstruction, scoring, the analyze and
//!   monitor pipelines, and the `scanner` binary

pub use insider_scanner as scanner;
pub use polymarket_core as core;
