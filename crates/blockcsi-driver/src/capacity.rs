//! Capacity negotiation
//!
//! Converts a requested byte range into a whole number of gigabytes that is
//! a multiple of the storage type's allocation step. Arithmetic stays in
//! bytes until the final conversion.

use blockcsi_common::{GIB, StorageType, format_bytes};
use thiserror::Error;

/// Requested size bounds in bytes. Values `<= 0` mean "unset".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapacityRange {
    pub required_bytes: i64,
    pub limit_bytes: i64,
}

impl CapacityRange {
    /// Range with only a minimum
    #[must_use]
    pub const fn required(bytes: i64) -> Self {
        Self {
            required_bytes: bytes,
            limit_bytes: 0,
        }
    }

    /// Range with only a maximum
    #[must_use]
    pub const fn limit(bytes: i64) -> Self {
        Self {
            required_bytes: 0,
            limit_bytes: bytes,
        }
    }

    /// Range with both bounds
    #[must_use]
    pub const fn between(required_bytes: i64, limit_bytes: i64) -> Self {
        Self {
            required_bytes,
            limit_bytes,
        }
    }

    fn required_set(&self) -> Option<i64> {
        (self.required_bytes > 0).then_some(self.required_bytes)
    }

    fn limit_set(&self) -> Option<i64> {
        (self.limit_bytes > 0).then_some(self.limit_bytes)
    }
}

fn size(bytes: &i64) -> String {
    format_bytes(*bytes)
}

/// A capacity range that cannot be satisfied
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapacityError {
    #[error("limit ({}) can not be less than required ({}) size", size(.limit), size(.required))]
    LimitBelowRequired { required: i64, limit: i64 },

    #[error(
        "limit ({}) can not be less than minimum supported volume size for type '{volume_type}' ({})",
        size(.limit),
        size(.step)
    )]
    LimitBelowStep {
        limit: i64,
        step: i64,
        volume_type: StorageType,
    },

    #[error(
        "for required ({}) limit ({}) must be at least {} for type '{volume_type}'",
        size(.required),
        size(.limit),
        size(.rounded)
    )]
    LimitBelowRounded {
        required: i64,
        limit: i64,
        rounded: i64,
        volume_type: StorageType,
    },

    #[error("required size ({}) is too large", size(.required))]
    TooLarge { required: i64 },
}

/// Compute the size in whole gigabytes to provision for `range`.
///
/// With no range, or only a limit, the result is exactly one allocation
/// step. A required size is rounded up to the next step.
pub fn calculate_storage_gb(
    range: Option<CapacityRange>,
    volume_type: StorageType,
) -> Result<i64, CapacityError> {
    let step_gb = volume_type.step_gb();
    let step_bytes = volume_type.step_bytes();

    let Some(range) = range else {
        return Ok(step_gb);
    };
    let required = range.required_set();
    let limit = range.limit_set();

    if let (Some(required), Some(limit)) = (required, limit)
        && limit < required
    {
        return Err(CapacityError::LimitBelowRequired { required, limit });
    }

    if let Some(limit) = limit
        && limit < step_bytes
    {
        return Err(CapacityError::LimitBelowStep {
            limit,
            step: step_bytes,
            volume_type,
        });
    }

    let Some(required) = required else {
        return Ok(step_gb);
    };

    // required > 0 here
    let steps = (required - 1) / step_bytes + 1;
    let size_gb = steps
        .checked_mul(step_gb)
        .ok_or(CapacityError::TooLarge { required })?;
    let rounded = size_gb
        .checked_mul(GIB)
        .ok_or(CapacityError::TooLarge { required })?;

    if let Some(limit) = limit
        && limit < rounded
    {
        return Err(CapacityError::LimitBelowRounded {
            required,
            limit,
            rounded,
            volume_type,
        });
    }

    Ok(size_gb)
}
