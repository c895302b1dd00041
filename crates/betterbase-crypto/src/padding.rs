//! Length-prefixed padding to a fixed set of buckets.
//!
//! Wire shape: `len_u32_le ‖ data ‖ zeros`, the whole buffer sized to the
//! smallest bucket that fits `4 + data.len()`. An empty bucket list disables
//! padding: the buffer is sized exactly to `4 + data.len()`.

use betterbase_core::SyncError;

/// The default bucket ladder.
pub const DEFAULT_PADDING_BUCKETS: &[usize] = &[256, 1024, 4096, 16384, 65536, 262144, 1048576];

const LEN_PREFIX: usize = 4;

/// Pad `data` to the smallest bucket in `buckets` that fits `4 + data.len()`.
/// An empty `buckets` slice disables padding.
pub fn pad_to_bucket(data: &[u8], buckets: &[usize]) -> Result<Vec<u8>, SyncError> {
    let needed = LEN_PREFIX + data.len();

    let total_len = if buckets.is_empty() {
        needed
    } else {
        buckets
            .iter()
            .copied()
            .filter(|&b| b >= needed)
            .min()
            .ok_or(SyncError::PayloadTooLarge { len: needed })?
    };

    let mut out = Vec::with_capacity(total_len);
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(data);
    out.resize(total_len, 0);
    Ok(out)
}

/// Reverse [`pad_to_bucket`]: read the length prefix and slice out the
/// original payload, rejecting a claimed length that exceeds what's present.
pub fn unpad(data: &[u8], _buckets: &[usize]) -> Result<Vec<u8>, SyncError> {
    if data.len() < LEN_PREFIX {
        return Err(SyncError::decrypt("padded buffer shorter than length prefix"));
    }
    let mut len_bytes = [0u8; LEN_PREFIX];
    len_bytes.copy_from_slice(&data[..LEN_PREFIX]);
    let claimed_len = u32::from_le_bytes(len_bytes) as usize;

    let available = data.len() - LEN_PREFIX;
    if claimed_len > available {
        return Err(SyncError::decrypt(format!(
            "claimed length {claimed_len} exceeds available {available}"
        )));
    }
    Ok(data[LEN_PREFIX..LEN_PREFIX + claimed_len].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_fits_smallest_bucket() {
        let data = vec![1u8; 100];
        let padded = pad_to_bucket(&data, DEFAULT_PADDING_BUCKETS).unwrap();
        assert_eq!(padded.len(), 256);
        assert_eq!(unpad(&padded, DEFAULT_PADDING_BUCKETS).unwrap(), data);
    }

    #[test]
    fn too_large_for_any_bucket_fails() {
        let data = vec![0u8; 2_000_000];
        assert!(pad_to_bucket(&data, DEFAULT_PADDING_BUCKETS).is_err());
    }

    #[test]
    fn empty_buckets_disables_padding() {
        let data = vec![5u8; 10];
        let padded = pad_to_bucket(&data, &[]).unwrap();
        assert_eq!(padded.len(), 4 + 10);
        assert_eq!(unpad(&padded, &[]).unwrap(), data);
    }

    #[test]
    fn rejects_over_claimed_length() {
        let mut padded = pad_to_bucket(&[1, 2, 3], DEFAULT_PADDING_BUCKETS).unwrap();
        padded[0..4].copy_from_slice(&(u32::MAX).to_le_bytes());
        assert!(unpad(&padded, DEFAULT_PADDING_BUCKETS).is_err());
    }
}
