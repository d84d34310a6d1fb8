//! Foundation types for the Cask gateway.
//!
//! This crate provides the types shared between the store interface and the
//! HTTP gateway. Every other Cask crate depends on `cask-types`.
//!
//! # Key Types
//!
//! - [`VersionNum`] — Monotonic object version number (`v1`, `v2`, …)
//! - [`VersionMetadata`] — Free-text message and author attached to a version
//! - [`DigestAlgorithm`] — Supported fixity digest algorithms
//! - [`DigestHasher`] — Streaming hasher for any [`DigestAlgorithm`]

pub mod digest;
pub mod error;
pub mod version;

pub use digest::{DigestAlgorithm, DigestHasher};
pub use error::TypeError;
pub use version::{VersionMetadata, VersionNum};
