//! Controller request and response types
//!
//! Protocol-independent shapes of the controller operations. The gRPC
//! adapter converts to and from the protobuf messages.

use blockcsi_common::attributes;
use std::collections::HashMap;

use crate::capability::VolumeCapability;
use crate::capacity::CapacityRange;

/// Topology segments, e.g. `{"zone": "rma1"}`
pub type Topology = HashMap<String, String>;

/// Encryption settings carried through volume and publish contexts.
///
/// The controller neither validates nor stores these; the node agent
/// enforces them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LuksContext {
    pub encrypted: bool,
    pub cipher: String,
    pub key_size: String,
}

impl LuksContext {
    /// Read LUKS settings from storage class parameters
    #[must_use]
    pub fn from_parameters(parameters: &HashMap<String, String>) -> Self {
        let get = |key: &str| parameters.get(key).cloned().unwrap_or_default();
        Self {
            encrypted: get(attributes::LUKS_ENCRYPTED) == "true",
            cipher: get(attributes::LUKS_CIPHER),
            key_size: get(attributes::LUKS_KEY_SIZE),
        }
    }

    /// Write the settings into a volume context. Cipher and key size are
    /// only written for encrypted volumes.
    pub fn write_volume_context(&self, context: &mut HashMap<String, String>) {
        context.insert(
            attributes::LUKS_ENCRYPTED.to_string(),
            self.encrypted.to_string(),
        );
        if self.encrypted {
            context.insert(attributes::LUKS_CIPHER.to_string(), self.cipher.clone());
            context.insert(attributes::LUKS_KEY_SIZE.to_string(), self.key_size.clone());
        }
    }
}

/// Input of `CreateVolume`
#[derive(Debug, Clone, Default)]
pub struct CreateVolumeRequest {
    pub name: String,
    pub capacity_range: Option<CapacityRange>,
    pub capabilities: Vec<VolumeCapability>,
    /// Storage class parameters (volume type, LUKS settings)
    pub parameters: HashMap<String, String>,
    /// Requisite topologies of the accessibility requirement
    pub requisite_topologies: Vec<Topology>,
}

/// A provisioned volume as reported to the orchestrator
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VolumeInfo {
    pub volume_id: String,
    pub capacity_bytes: i64,
    pub volume_context: HashMap<String, String>,
    pub accessible_topology: Vec<Topology>,
}

/// Input of `ControllerPublishVolume`
#[derive(Debug, Clone, Default)]
pub struct PublishVolumeRequest {
    pub volume_id: String,
    pub node_id: String,
    pub capability: Option<VolumeCapability>,
    pub readonly: bool,
    /// Volume context written by `CreateVolume`
    pub volume_context: HashMap<String, String>,
}

/// Input of `ControllerExpandVolume`
#[derive(Debug, Clone, Default)]
pub struct ExpandVolumeRequest {
    pub volume_id: String,
    pub capacity_range: Option<CapacityRange>,
    pub capability: Option<VolumeCapability>,
}

/// Result of `ControllerExpandVolume`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpandVolumeResponse {
    pub capacity_bytes: i64,
    pub node_expansion_required: bool,
}

/// RPCs advertised through `ControllerGetCapabilities`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerCapability {
    CreateDeleteVolume,
    PublishUnpublishVolume,
    ListVolumes,
    ExpandVolume,
}
