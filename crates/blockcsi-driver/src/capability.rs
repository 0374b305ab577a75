//! Volume capabilities and their validation
//!
//! Only single-node read/write access is supported. Encrypted volumes must
//! additionally be consumed through a filesystem mount.

use derive_more::Display;
use std::collections::BTreeSet;

/// Access mode requested for a volume
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display)]
pub enum AccessMode {
    #[default]
    #[display("UNKNOWN")]
    Unknown,
    #[display("SINGLE_NODE_WRITER")]
    SingleNodeWriter,
    #[display("SINGLE_NODE_READER_ONLY")]
    SingleNodeReaderOnly,
    #[display("MULTI_NODE_READER_ONLY")]
    MultiNodeReaderOnly,
    #[display("MULTI_NODE_SINGLE_WRITER")]
    MultiNodeSingleWriter,
    #[display("MULTI_NODE_MULTI_WRITER")]
    MultiNodeMultiWriter,
    #[display("SINGLE_NODE_SINGLE_WRITER")]
    SingleNodeSingleWriter,
    #[display("SINGLE_NODE_MULTI_WRITER")]
    SingleNodeMultiWriter,
}

/// The one access mode the plugin supports
pub const SUPPORTED_ACCESS_MODE: AccessMode = AccessMode::SingleNodeWriter;

/// How the volume is consumed on the node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AccessType {
    /// Raw block device
    Block,
    /// Filesystem mount
    Mount {
        fs_type: String,
        mount_flags: Vec<String>,
    },
    /// Not set by the caller
    #[default]
    Unspecified,
}

/// A single requested capability
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VolumeCapability {
    pub access_type: AccessType,
    pub access_mode: AccessMode,
}

impl VolumeCapability {
    /// Single-node-writer raw block capability
    #[must_use]
    pub const fn block() -> Self {
        Self {
            access_type: AccessType::Block,
            access_mode: SUPPORTED_ACCESS_MODE,
        }
    }

    /// Single-node-writer filesystem capability
    pub fn mount(fs_type: impl Into<String>) -> Self {
        Self {
            access_type: AccessType::Mount {
                fs_type: fs_type.into(),
                mount_flags: Vec::new(),
            },
            access_mode: SUPPORTED_ACCESS_MODE,
        }
    }

    /// Override the access mode
    #[must_use]
    pub fn with_mode(mut self, access_mode: AccessMode) -> Self {
        self.access_mode = access_mode;
        self
    }

    /// Check if this capability asks for a raw block device
    #[must_use]
    pub const fn is_block(&self) -> bool {
        matches!(self.access_type, AccessType::Block)
    }
}

/// Check requested capabilities against what the plugin supports.
///
/// Returns the distinct violations in sorted order; empty means acceptable.
#[must_use]
pub fn validate_capabilities(capabilities: &[VolumeCapability]) -> Vec<String> {
    let mut violations = BTreeSet::new();
    for capability in capabilities {
        if capability.access_mode != SUPPORTED_ACCESS_MODE {
            violations.insert(format!(
                "unsupported access mode {}",
                capability.access_mode
            ));
        }
        if capability.access_type == AccessType::Unspecified {
            violations.insert("unsupported access type".to_string());
        }
    }
    violations.into_iter().collect()
}

/// Additional check for encrypted volumes, which cannot be raw block.
#[must_use]
pub fn validate_luks_capabilities(capabilities: &[VolumeCapability]) -> Vec<String> {
    let mut violations = BTreeSet::new();
    for capability in capabilities {
        if capability.is_block() {
            violations.insert("Cannot use LUKS with block volumes".to_string());
        }
    }
    violations.into_iter().collect()
}
