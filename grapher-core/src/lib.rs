//! # grapher-core
//!
//! Driver side of the grapher command protocol.
//!
//! This crate provides:
//! - The driver capability contract (operation tables, signatures, replies)
//! - The driver registry sessions resolve `load` names against
//! - Verb sanitisation and dispatch onto a loaded driver
//! - A bundled in-memory sample driver

pub mod dispatch;
pub mod driver;
pub mod error;
pub mod registry;
pub mod sample;

pub use dispatch::{canonical_operation_name, dispatch};
pub use driver::{Driver, DriverHandle, Operation, OperationTable, Reply, Signature};
pub use error::DriverError;
pub use registry::{DriverFactory, DriverRegistry};
pub use sample::{SampleGraphDriver, SAMPLE_DRIVER_NAME};
