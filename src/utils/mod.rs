pub mod metrics;
pub mod preview;

// Re-export commonly used items
pub use metrics::Metrics;
pub use preview::preview_data_url;
