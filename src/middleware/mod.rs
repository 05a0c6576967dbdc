// Error-boundary style supervision for the workflow

pub mod recovery;

// Re-export commonly used types
pub use recovery::{RecoveryController, RecoveryState, RecoveryStats};
