pub mod configuration;
pub mod telemetry;
pub mod zipatch;

// Re-exports for convenience
pub use zipatch::{ZiPatchParser, ZiPatchReader};
