//! Three-phase server-authoritative epoch rotation: begin, rewrap, complete.
//!
//! A `begin` call either wins the CAS and owns the rewrap itself, or loses
//! it and learns what the server's state actually is. Losing splits into
//! two cases carried by [`SyncError::EpochMismatch`]: `rewrap_epoch: Some`
//! means another client's advance is mid-flight and we help finish it
//! before retrying our own; `rewrap_epoch: None` means one already
//! finished and we just adopt the result.

use crate::state::EpochState;
use crate::transport::{EpochTransport, FetchedDek};
use betterbase_core::{Result, SpaceId, SyncError};
use betterbase_crypto::epoch::EpochKeyCache;
use betterbase_crypto::rewrap::{rewrap_deks, RewrapInput};
use betterbase_transport::rpc::{DeksGetRequest, RewrappedDek};
use zeroize::Zeroizing;

/// Rewrap every fetched DEK forward to `target_epoch` and submit the batch.
/// Each DEK's source epoch is re-derived from `cache`, which must already
/// be seeded at or below the lowest epoch present in `fetched`.
fn build_batch(
    fetched: &[FetchedDek],
    cache: &mut EpochKeyCache,
    target_epoch: u32,
) -> Result<Vec<RewrappedDek>> {
    let inputs: Vec<RewrapInput<'_>> = fetched
        .iter()
        .map(|d| RewrapInput { id: &d.id, wrapped: &d.wrapped })
        .collect();
    let target_kek = cache.get_kek(target_epoch)?;
    let out = rewrap_deks(&inputs, target_epoch, |epoch| cache.get_kek(epoch), &target_kek)?;
    Ok(out
        .into_iter()
        .map(|o| RewrappedDek { id: o.id, wrapped: o.wrapped })
        .collect())
}

/// Run phase 2 (rewrap) for both the record and file DEK collections,
/// forward-deriving every source KEK from `cache`. Idempotent: DEKs already
/// wrapped under `target_epoch` are skipped by [`build_batch`].
async fn rewrap_phase(
    transport: &dyn EpochTransport,
    space_id: &SpaceId,
    cache: &mut EpochKeyCache,
    target_epoch: u32,
) -> Result<()> {
    let req = DeksGetRequest { space_id: space_id.clone(), rewrap_epoch: target_epoch };

    let record_deks = transport.get_deks(&req).await?;
    if !record_deks.is_empty() {
        let batch = build_batch(&record_deks, cache, target_epoch)?;
        transport.rewrap_deks(space_id, target_epoch, batch).await?;
    }

    let file_deks = transport.get_file_deks(&req).await?;
    if !file_deks.is_empty() {
        let batch = build_batch(&file_deks, cache, target_epoch)?;
        transport.rewrap_file_deks(space_id, target_epoch, batch).await?;
    }

    Ok(())
}

/// Advance `state`'s space to a new epoch, performing the rewrap ourselves
/// if we win the CAS, or helping complete / adopting someone else's advance
/// if we lose it.
///
/// `min_key_generation` is set on a revocation-triggered call: even after
/// adopting an already-completed epoch, the caller still needs a *new*
/// epoch strictly ahead of whatever the removed member could have observed,
/// so the adopt path loops back into its own `begin` instead of returning.
pub async fn advance_epoch(
    transport: &dyn EpochTransport,
    state: &mut EpochState,
    min_key_generation: bool,
    now: i64,
) -> Result<u32> {
    let space_id = SpaceId::from(state.space_id().to_string());
    let mut e_old = state.current_epoch();
    let mut performed_own_advance = false;

    loop {
        match transport.begin(&space_id, e_old).await {
            Ok(resp) => {
                let target = resp.rewrap_epoch;
                rewrap_phase(transport, &space_id, state.cache_mut(), target).await?;
                transport.complete(&space_id, target).await?;
                let key = state.cache_mut().get_kek(target)?;
                state.update(target, Zeroizing::new(key), now);
                return Ok(target);
            }
            Err(SyncError::EpochMismatch { current_epoch, rewrap_epoch: Some(in_progress) }) => {
                rewrap_phase(transport, &space_id, state.cache_mut(), in_progress).await?;
                transport.complete(&space_id, in_progress).await?;
                let key = state.cache_mut().get_kek(in_progress)?;
                state.update(in_progress, Zeroizing::new(key), now);
                e_old = in_progress;
                let _ = current_epoch;
                // loop back and retry our own begin from the epoch we just helped land on
            }
            Err(SyncError::EpochMismatch { current_epoch, rewrap_epoch: None }) => {
                let key = state.cache_mut().get_kek(current_epoch)?;
                state.update(current_epoch, Zeroizing::new(key), now);
                if !min_key_generation || performed_own_advance {
                    return Ok(current_epoch);
                }
                e_old = current_epoch;
                performed_own_advance = true;
                // a revocation still needs an epoch strictly ahead of what was just adopted
            }
            Err(other) => return Err(other),
        }
    }
}
