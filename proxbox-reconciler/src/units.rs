//! Byte conversions into the registry's capacity units.
//!
//! NetBox stores memory in MB and disk in GB as integers, using decimal
//! units. Remainders are truncated, never rounded.

const BYTES_PER_MEGABYTE: u64 = 1_000_000;
const BYTES_PER_GIGABYTE: u64 = 1_000_000_000;

/// `floor(bytes / 1_000_000)`
pub fn bytes_to_megabytes(bytes: u64) -> u64 {
    bytes / BYTES_PER_MEGABYTE
}

/// `floor(bytes / 1_000_000_000)`
pub fn bytes_to_gigabytes(bytes: u64) -> u64 {
    bytes / BYTES_PER_GIGABYTE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_megabytes_truncate() {
        assert_eq!(bytes_to_megabytes(0), 0);
        assert_eq!(bytes_to_megabytes(999_999), 0);
        assert_eq!(bytes_to_megabytes(1_000_000), 1);
        assert_eq!(bytes_to_megabytes(2_147_483_648), 2147);
    }

    #[test]
    fn test_gigabytes_truncate() {
        assert_eq!(bytes_to_gigabytes(999_999_999), 0);
        assert_eq!(bytes_to_gigabytes(8_589_934_592), 8);
        assert_eq!(bytes_to_gigabytes(34_359_738_368), 34);
    }

    #[test]
    fn test_floor_property() {
        for n in [1u64, 7, 1_500_000, 3_999_999_999, 10u64.pow(12) + 1, u64::MAX] {
            assert_eq!(bytes_to_megabytes(n), (n as u128 / 1_000_000) as u64);
            assert_eq!(bytes_to_gigabytes(n), (n as u128 / 1_000_000_000) as u64);
        }
    }
}
