//! Foundation types for PKV.
//!
//! This crate provides the value model, identifier newtypes, and the error
//! taxonomy used throughout the PKV system. Every other PKV crate depends
//! on `pkv-types`.
//!
//! # Key Types
//!
//! - [`KvsValue`] — Tagged value: the unit of storage
//! - [`KvsMap`] — A map of key names to values
//! - [`InstanceId`] — Numeric identifier naming one store within a directory
//! - [`SnapshotId`] — Slot number of a committed version (`0` is current)
//! - [`KvsError`] — The domain error taxonomy

pub mod error;
pub mod instance;
pub mod value;

pub use error::KvsError;
pub use instance::{InstanceId, SnapshotId};
pub use value::{KvsMap, KvsValue};
