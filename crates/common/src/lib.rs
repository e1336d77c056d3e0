//! # hanet-common — Shared Primitives
//!
//! Types and utilities shared across every crate in the workspace:
//!
//! * **[`HaNetConfig`]** — model hyper-parameters (serialised as JSON).
//! * **[`Document`]** / **[`DocDataset`]** — pre-embedded document archives.
//! * **[`write_archive`]** — serialise documents to the binary format.

pub mod config;
pub mod data;

pub use config::HaNetConfig;
pub use data::{write_archive, DocDataset, Document};
