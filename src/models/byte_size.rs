//! Human-readable byte sizes such as `8MB` used by the upload limit.

use std::{fmt, str::FromStr};
use thiserror::Error;

const KB: u64 = 1 << 10;
const MB: u64 = 1 << 20;
const GB: u64 = 1 << 30;
const TB: u64 = 1 << 40;

/// A byte count that parses from and renders to a short unit string.
///
/// Units are binary multiples (`1KB == 1024B`), matched case-insensitively.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct ByteSize(pub u64);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ByteSizeError {
    #[error("size `{0}` has no numeric value")]
    MissingNumber(String),
    #[error("size `{value}` has unknown unit `{unit}`")]
    UnknownUnit { value: String, unit: String },
    #[error("size `{0}` is too large")]
    Overflow(String),
}

impl ByteSize {
    pub fn bytes(self) -> u64 {
        self.0
    }
}

impl FromStr for ByteSize {
    type Err = ByteSizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let split = trimmed
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(trimmed.len());
        let (number, unit) = trimmed.split_at(split);
        if number.is_empty() {
            return Err(ByteSizeError::MissingNumber(s.to_string()));
        }
        let value: u64 = number
            .parse()
            .map_err(|_| ByteSizeError::Overflow(s.to_string()))?;

        let multiplier = match unit.trim().to_ascii_lowercase().as_str() {
            "" | "b" => 1,
            "k" | "kb" | "kib" => KB,
            "m" | "mb" | "mib" => MB,
            "g" | "gb" | "gib" => GB,
            "t" | "tb" | "tib" => TB,
            other => {
                return Err(ByteSizeError::UnknownUnit {
                    value: s.to_string(),
                    unit: other.to_string(),
                });
            }
        };

        value
            .checked_mul(multiplier)
            .map(ByteSize)
            .ok_or_else(|| ByteSizeError::Overflow(s.to_string()))
    }
}

impl fmt::Display for ByteSize {
    /// Renders in the largest unit that divides the value exactly.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.0;
        for (unit, suffix) in [(TB, "TB"), (GB, "GB"), (MB, "MB"), (KB, "KB")] {
            if bytes >= unit && bytes % unit == 0 {
                return write!(f, "{}{}", bytes / unit, suffix);
            }
        }
        write!(f, "{}B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_units() {
        assert_eq!("8MB".parse::<ByteSize>().unwrap(), ByteSize(8 * MB));
        assert_eq!("512kb".parse::<ByteSize>().unwrap(), ByteSize(512 * KB));
        assert_eq!("1 GiB".parse::<ByteSize>().unwrap(), ByteSize(GB));
        assert_eq!("100".parse::<ByteSize>().unwrap(), ByteSize(100));
        assert_eq!("10B".parse::<ByteSize>().unwrap(), ByteSize(10));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            "MB".parse::<ByteSize>(),
            Err(ByteSizeError::MissingNumber(_))
        ));
        assert!(matches!(
            "8XB".parse::<ByteSize>(),
            Err(ByteSizeError::UnknownUnit { .. })
        ));
        assert!(matches!(
            "99999999999TB".parse::<ByteSize>(),
            Err(ByteSizeError::Overflow(_))
        ));
    }

    #[test]
    fn displays_largest_exact_unit() {
        assert_eq!(ByteSize(8 * MB).to_string(), "8MB");
        assert_eq!(ByteSize(1536).to_string(), "1536B");
        assert_eq!(ByteSize(3 * KB).to_string(), "3KB");
        assert_eq!(ByteSize(0).to_string(), "0B");
    }
}
