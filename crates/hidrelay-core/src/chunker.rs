//! Splitting encoded messages into GATT-sized writes
//!
//! A single write-without-response carries at most the negotiated maximum write size,
//! so each message is cut into consecutive slices of that size; only the last slice may
//! be shorter. The max length is a `NonZeroUsize`, which rules out a zero-sized split.

use core::iter::FusedIterator;
use core::num::NonZeroUsize;
use core::slice;

// ----------------------------------------------------------------------------
// Chunk Iterator
// ----------------------------------------------------------------------------

/// Lazy iterator over the chunks of a payload
///
/// Cloning an unconsumed iterator gives an independent pass over the same payload.
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    inner: slice::Chunks<'a, u8>,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Chunks<'_> {}

impl FusedIterator for Chunks<'_> {}

/// Split `payload` into slices of at most `max_len` bytes
///
/// An empty payload yields no chunks.
pub fn chunk(payload: &[u8], max_len: NonZeroUsize) -> Chunks<'_> {
    Chunks {
        inner: payload.chunks(max_len.get()),
    }
}

/// Number of writes needed to deliver `len` bytes
pub fn chunk_count(len: usize, max_len: NonZeroUsize) -> usize {
    len.div_ceil(max_len.get())
}
