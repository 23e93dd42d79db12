//! Common Utilities
//!
//! Buffer status report tables and unit conversions shared by the scheduler
//! and the simulator

use thiserror::Error;
use tracing::trace;

/// Errors raised by table lookups
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TableError {
    #[error("BSR index {0} out of range (0-63)")]
    InvalidBsrIndex(u8),
}

/// Buffer size in bytes for every 6-bit BSR index
pub const BSR_BUFFER_SIZE_TABLE: [u32; 64] = [
    0, 10, 12, 14, 17, 19, 22, 26, 31, 36, 42, 49, 57, 67, 78, 91,
    107, 125, 146, 171, 200, 234, 274, 321, 376, 440, 515, 603, 706, 826, 967, 1132,
    1326, 1552, 1817, 2127, 2490, 2915, 3413, 3995, 4677, 5476, 6411, 7505, 8787, 10287, 12043, 14099,
    16507, 19325, 22624, 26487, 31009, 36304, 42502, 49759, 58255, 68201, 79846, 93749, 109439, 128125, 150000, 150000,
];

/// Number of LCGs carried in one buffer status report
pub const MAX_NUM_LCG: usize = 4;

/// Decode a BSR index into a buffer size in bytes
pub fn bsr_id_to_buffer_size(bsr_id: u8) -> Result<u32, TableError> {
    BSR_BUFFER_SIZE_TABLE
        .get(bsr_id as usize)
        .copied()
        .ok_or(TableError::InvalidBsrIndex(bsr_id))
}

/// Encode a buffer size into the smallest BSR index whose size covers it
pub fn buffer_size_to_bsr_id(buffer_size: u32) -> u8 {
    let id = BSR_BUFFER_SIZE_TABLE
        .iter()
        .position(|&size| size >= buffer_size)
        .unwrap_or(BSR_BUFFER_SIZE_TABLE.len() - 1) as u8;
    trace!("Buffer size {} bytes -> BSR index {}", buffer_size, id);
    id
}

/// Convert dB to linear scale
pub fn db_to_linear(db: f64) -> f64 {
    10f64.powf(db / 10.0)
}

/// Convert linear scale to dB
pub fn linear_to_db(linear: f64) -> f64 {
    10.0 * linear.log10()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bsr_lookup() {
        assert_eq!(bsr_id_to_buffer_size(0).unwrap(), 0);
        assert_eq!(bsr_id_to_buffer_size(1).unwrap(), 10);
        assert_eq!(bsr_id_to_buffer_size(63).unwrap(), 150000);
        assert_eq!(bsr_id_to_buffer_size(64), Err(TableError::InvalidBsrIndex(64)));
    }

    #[test]
    fn test_bsr_encoding_covers_buffer() {
        assert_eq!(buffer_size_to_bsr_id(0), 0);
        assert_eq!(buffer_size_to_bsr_id(10), 1);
        assert_eq!(buffer_size_to_bsr_id(11), 2);
        assert_eq!(buffer_size_to_bsr_id(1_000_000), 63);

        for size in [5, 100, 1000, 20000] {
            let id = buffer_size_to_bsr_id(size);
            assert!(bsr_id_to_buffer_size(id).unwrap() >= size);
        }
    }

    #[test]
    fn test_db_conversion() {
        assert!((db_to_linear(10.0) - 10.0).abs() < 1e-9);
        assert!((linear_to_db(100.0) - 20.0).abs() < 1e-9);
    }
}
