//! Batch DEK rewrapping for epoch advance.

use crate::dek::{unwrap_dek, wrap_dek};
use betterbase_core::SyncError;

/// One DEK to move from its current epoch to `target_epoch`.
pub struct RewrapInput<'a> {
    /// Opaque id the caller uses to match inputs back to outputs (a file id,
    /// a channel name, ...).
    pub id: &'a str,
    /// The wrapped DEK as currently stored.
    pub wrapped: &'a [u8],
}

/// The result of rewrapping one DEK.
pub struct RewrapOutput {
    /// Echoes [`RewrapInput::id`].
    pub id: String,
    /// The DEK re-wrapped under the target epoch's KEK.
    pub wrapped: Vec<u8>,
}

/// Rewrap every entry in `inputs` from whatever epoch it is currently
/// wrapped under to `target_epoch`, skipping entries already at that epoch.
/// `kek_for_epoch` is called once per distinct source epoch encountered.
pub fn rewrap_deks(
    inputs: &[RewrapInput<'_>],
    target_epoch: u32,
    mut kek_for_epoch: impl FnMut(u32) -> Result<[u8; 32], SyncError>,
    target_kek: &[u8; 32],
) -> Result<Vec<RewrapOutput>, SyncError> {
    let mut out = Vec::with_capacity(inputs.len());
    for input in inputs {
        let source_epoch = crate::dek::peek_epoch(input.wrapped)?;
        if source_epoch == target_epoch {
            out.push(RewrapOutput {
                id: input.id.to_string(),
                wrapped: input.wrapped.to_vec(),
            });
            continue;
        }
        let source_kek = kek_for_epoch(source_epoch)?;
        let (dek, _) = unwrap_dek(input.wrapped, &source_kek)?;
        let rewrapped = wrap_dek(&dek, target_kek, target_epoch)?;
        out.push(RewrapOutput {
            id: input.id.to_string(),
            wrapped: rewrapped.to_vec(),
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dek::{generate_dek, wrap_dek as wrap};
    use std::collections::HashMap;

    #[test]
    fn rewraps_to_target_epoch_and_skips_current() {
        let keks: HashMap<u32, [u8; 32]> = HashMap::from([(1, [1u8; 32]), (2, [2u8; 32])]);
        let dek_a = generate_dek();
        let dek_b = generate_dek();
        let wrapped_a = wrap(&dek_a, &keks[&1], 1).unwrap();
        let wrapped_b = wrap(&dek_b, &keks[&2], 2).unwrap();

        let inputs = vec![
            RewrapInput { id: "a", wrapped: &wrapped_a },
            RewrapInput { id: "b", wrapped: &wrapped_b },
        ];

        let out = rewrap_deks(&inputs, 2, |e| Ok(keks[&e]), &keks[&2]).unwrap();

        assert_eq!(out[0].id, "a");
        assert_eq!(crate::dek::peek_epoch(&out[0].wrapped).unwrap(), 2);
        // already at target epoch: untouched bytes
        assert_eq!(out[1].wrapped, wrapped_b.to_vec());
    }
}
