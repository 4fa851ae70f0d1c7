pub mod bing;
pub mod cleanup;
pub mod config;
pub mod desktop;
pub mod error;
pub mod probe;
