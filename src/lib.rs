// Weaver — Token-linked LLM workflows in Rust
// License: Apache-2.0

pub mod config;
pub mod error;
pub mod host;
pub mod logger;
pub mod multipart;
pub mod provider;
pub mod token;
pub mod workflow;

#[cfg(test)]
mod testing;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
