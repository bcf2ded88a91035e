//! Trading agents: the outer surface of the deliberation pipeline.
//!
//! - [`config`]: TOML + environment configuration and endpoint probing
//! - [`generation`]: rig-backed text generation
//! - [`analysts`]: data feeds and the four generative analysts
//! - [`memory`]: embedding-backed situation memory and disk persistence

pub mod analysts;
pub mod config;
pub mod generation;
pub mod memory;
