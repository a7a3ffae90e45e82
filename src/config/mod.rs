// src/config/mod.rs
pub mod settings;
pub mod sources;

pub use settings::{CredentialSettings, Settings};
pub use sources::{load_sources_default, load_sources_from, SourceDescriptor};
