//! Core type definitions for blockcsi
//!
//! Storage types and their allocation steps, byte units, and the
//! driver-namespaced attribute keys exchanged through volume and publish
//! contexts.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Name the plugin registers under with the orchestrator
pub const DRIVER_NAME: &str = "csi.blockcsi.io";

/// Topology segment key carrying the placement zone
pub const TOPOLOGY_ZONE_KEY: &str = "zone";

/// Byte units. Sizes travel as `i64` to match the CSI wire format.
pub const KIB: i64 = 1 << 10;
pub const MIB: i64 = 1 << 20;
pub const GIB: i64 = 1 << 30;
pub const TIB: i64 = 1 << 40;

/// Driver-namespaced keys used in volume and publish contexts.
pub mod attributes {
    /// Volume name, passed from ControllerPublishVolume to the node agent
    pub const VOLUME_NAME: &str = "csi.blockcsi.io/volume-name";
    /// Storage class parameter selecting the storage type
    pub const VOLUME_TYPE: &str = "csi.blockcsi.io/volume-type";
    /// `"true"` when the volume is LUKS encrypted
    pub const LUKS_ENCRYPTED: &str = "csi.blockcsi.io/luks-encrypted";
    /// LUKS cipher name
    pub const LUKS_CIPHER: &str = "csi.blockcsi.io/luks-cipher";
    /// LUKS key size in bits
    pub const LUKS_KEY_SIZE: &str = "csi.blockcsi.io/luks-key-size";
}

/// Backing storage type of a volume
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    /// SSD storage, allocated in 1 GB steps
    #[default]
    #[display("ssd")]
    Ssd,
    /// Bulk (HDD) storage, allocated in 100 GB steps
    #[display("bulk")]
    Bulk,
}

impl StorageType {
    /// Allocation step in whole gigabytes
    #[must_use]
    pub const fn step_gb(self) -> i64 {
        match self {
            Self::Ssd => 1,
            Self::Bulk => 100,
        }
    }

    /// Allocation step in bytes
    #[must_use]
    pub const fn step_bytes(self) -> i64 {
        self.step_gb() * GIB
    }

    /// Parse an optional storage class parameter; empty means the default.
    pub fn from_parameter(value: Option<&str>) -> Result<Self, StorageTypeError> {
        match value {
            None | Some("") => Ok(Self::default()),
            Some(v) => v.parse(),
        }
    }
}

impl FromStr for StorageType {
    type Err = StorageTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ssd" => Ok(Self::Ssd),
            "bulk" => Ok(Self::Bulk),
            other => Err(StorageTypeError(other.to_string())),
        }
    }
}

/// Raised for any storage type other than `ssd` or `bulk`
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid volume type {0:?} requested, only 'ssd' or 'bulk' are supported")]
pub struct StorageTypeError(pub String);

/// Render a byte count with a binary unit suffix, e.g. `1.5Gi`.
///
/// One decimal place, a trailing `.0` is dropped; counts below 1 KiB are
/// printed without a unit.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_bytes(bytes: i64) -> String {
    if bytes == 0 {
        return "0".to_string();
    }

    let (divisor, unit) = match bytes {
        b if b >= TIB => (TIB, "Ti"),
        b if b >= GIB => (GIB, "Gi"),
        b if b >= MIB => (MIB, "Mi"),
        b if b >= KIB => (KIB, "Ki"),
        _ => (1, ""),
    };

    let value = format!("{:.1}", bytes as f64 / divisor as f64);
    let value = value.strip_suffix(".0").unwrap_or(&value);
    format!("{value}{unit}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_type_steps() {
        assert_eq!(StorageType::Ssd.step_gb(), 1);
        assert_eq!(StorageType::Bulk.step_gb(), 100);
        assert_eq!(StorageType::Bulk.step_bytes(), 100 * GIB);
    }

    #[test]
    fn test_storage_type_parameter() {
        assert_eq!(StorageType::from_parameter(None).unwrap(), StorageType::Ssd);
        assert_eq!(StorageType::from_parameter(Some("")).unwrap(), StorageType::Ssd);
        assert_eq!(
            StorageType::from_parameter(Some("bulk")).unwrap(),
            StorageType::Bulk
        );
        assert!(StorageType::from_parameter(Some("nvme")).is_err());
        assert!(StorageType::from_parameter(Some("SSD")).is_err());
    }

    #[test]
    fn test_storage_type_wire_name() {
        #[derive(Deserialize)]
        struct Wrapper {
            t: StorageType,
        }

        assert_eq!(StorageType::Ssd.to_string(), "ssd");
        assert_eq!(StorageType::Bulk.to_string(), "bulk");
        let w: Wrapper = toml::from_str("t = \"bulk\"").unwrap();
        assert_eq!(w.t, StorageType::Bulk);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0");
        assert_eq!(format_bytes(512), "512");
        assert_eq!(format_bytes(KIB), "1Ki");
        assert_eq!(format_bytes(3 * MIB / 2), "1.5Mi");
        assert_eq!(format_bytes(5 * GIB), "5Gi");
        assert_eq!(format_bytes(150 * GIB), "150Gi");
        assert_eq!(format_bytes(2 * TIB), "2Ti");
    }
}
