//! Parallel encoding feeding the single merging thread.
//!
//! Types are encoded on the rayon pool and handed over through a bounded
//! channel. The consumer re-sequences them by input position, so the
//! merge order is exactly the order of the input slice no matter which
//! worker finishes first.
//!
//! Input is processed in windows of `WINDOW` types. A slow early item
//! can hold back at most one window in the reorder buffer.

use crate::encoder::{encode_type, EncodedType};
use crate::error::DexResult;
use crossbeam::channel;
use dexon_ir::CompiledType;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;

const QUEUE_CAPACITY: usize = 256;

/// Most types encoded ahead of the merge.
const WINDOW: usize = 4096;

/// Encodes `types` in parallel and passes the results to `consume` in input
/// order. Sequence numbers start at `first_sequence`.
///
/// The first encoding or consumer error stops the pipeline and is returned;
/// workers still running notice the closed channel and stop early.
pub fn encode_ordered<F>(
    types: &[Arc<CompiledType>],
    first_sequence: u32,
    consume: F,
) -> DexResult<()>
where
    F: FnMut(EncodedType) -> DexResult<()>,
{
    encode_windowed(types, first_sequence, WINDOW, consume)
}

fn encode_windowed<F>(
    types: &[Arc<CompiledType>],
    first_sequence: u32,
    window: usize,
    mut consume: F,
) -> DexResult<()>
where
    F: FnMut(EncodedType) -> DexResult<()>,
{
    let mut sequence = first_sequence;
    for chunk in types.chunks(window.max(1)) {
        encode_window(chunk, sequence, &mut consume)?;
        sequence += chunk.len() as u32;
    }
    Ok(())
}

fn encode_window<F>(
    types: &[Arc<CompiledType>],
    first_sequence: u32,
    consume: &mut F,
) -> DexResult<()>
where
    F: FnMut(EncodedType) -> DexResult<()>,
{
    std::thread::scope(|scope| {
        let (tx, rx) = channel::bounded::<(usize, DexResult<EncodedType>)>(QUEUE_CAPACITY);
        scope.spawn(move || {
            let sent = types
                .par_iter()
                .enumerate()
                .try_for_each_with(tx, |tx, (index, ty)| {
                    let encoded = encode_type(Arc::clone(ty), first_sequence + index as u32);
                    tx.send((index, encoded))
                });
            // A send only fails once the consumer has given up.
            if let Err(channel::SendError((index, _))) = sent {
                tracing::debug!(
                    sequence = first_sequence + index as u32,
                    "consumer stopped, abandoning encoding"
                );
            }
        });

        let mut pending: BTreeMap<usize, EncodedType> = BTreeMap::new();
        let mut next = 0usize;
        for (index, encoded) in rx.iter() {
            pending.insert(index, encoded?);
            while let Some(item) = pending.remove(&next) {
                consume(item)?;
                next += 1;
            }
        }
        tracing::trace!(encoded = next, "encode window drained");
        Ok(())
    })
}
