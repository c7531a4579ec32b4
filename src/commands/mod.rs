pub mod coverage;
pub mod import;
pub mod scrape;

// Re-export command functions for convenience
pub use coverage::coverage;
pub use import::import;
pub use scrape::scrape;
