//! wavescan-core: Wi-Fi access-point discovery pipeline.
//!
//! Polls two external command-line sources — a terse per-AP listing and a
//! verbose scan dump — merges their outputs into per-BSSID records, and
//! temporally stabilizes the record set so a jittery, lossy feed reads as a
//! smooth one. Presentation, vendor databases, and capture tooling live
//! outside this crate; it emits plain record lists.

pub mod channels;
pub mod config;
pub mod enrich;
pub mod scan_dump;
pub mod scanner;
pub mod stability;
pub mod terse;
pub mod types;
pub mod vendor;

// Re-export commonly used items at crate root
pub use config::{load_config, save_config, ScanConfig};
pub use scanner::{spawn_scanner, spawn_scanner_with, ScanEvent, ScanHandle, ScanWorker};
pub use types::*;
pub use vendor::VendorResolver;
