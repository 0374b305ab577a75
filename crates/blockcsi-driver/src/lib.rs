//! blockcsi Driver - CSI controller plugin
//!
//! The controller provisions, attaches, resizes and deletes volumes on the
//! block storage API on behalf of a container orchestrator. It is built
//! from small, independently testable parts:
//!
//! - [`capacity`]: quantizes requested byte ranges to allocation steps
//! - [`capability`]: checks requested access modes and types
//! - [`translate`]: maps backend errors onto the CSI error taxonomy
//! - [`controller`]: the volume lifecycle operations
//! - [`service`] and [`identity`]: the gRPC surface

pub mod capability;
pub mod capacity;
pub mod controller;
pub mod error;
pub mod identity;
pub mod service;
pub mod translate;
pub mod types;

pub use capability::{AccessMode, AccessType, VolumeCapability};
pub use capacity::{CapacityError, CapacityRange, calculate_storage_gb};
pub use controller::VolumeController;
pub use error::{CsiError, CsiResult};
pub use identity::IdentityService;
pub use service::ControllerService;
