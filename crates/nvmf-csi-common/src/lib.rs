//! nvmf-csi Common - Shared types and configuration
//!
//! This crate provides the configuration structures and the well-known
//! StorageClass parameter / volume-context keys used by every nvmf-csi
//! component.

pub mod config;
pub mod types;

pub use config::DriverConfig;
pub use types::*;
