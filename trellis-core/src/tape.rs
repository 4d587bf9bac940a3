//! Write-once, read-many compressed item store.
//!
//! Observations collected during a rollout are high-dimensional and episodes
//! can run for thousands of steps; keeping them uncompressed would dominate
//! memory. Items are bincode-encoded straight into a streaming DEFLATE
//! compressor as they are appended, and decompressed sequentially on read.
//! The full tape is never materialized uncompressed.
use crate::error::TrellisError;
use flate2::{read::ZlibDecoder, write::ZlibEncoder, Compression};
use serde::{de::DeserializeOwned, Serialize};
use std::marker::PhantomData;

/// Append-only writer half of a tape.
pub struct TapeWriter<T> {
    encoder: ZlibEncoder<Vec<u8>>,
    len: usize,
    phantom: PhantomData<T>,
}

impl<T: Serialize> TapeWriter<T> {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self {
            encoder: ZlibEncoder::new(Vec::new(), Compression::default()),
            len: 0,
            phantom: PhantomData,
        }
    }

    /// Appends one item to the compressed stream.
    pub fn push(&mut self, item: &T) -> Result<(), TrellisError> {
        bincode::serialize_into(&mut self.encoder, item)?;
        self.len += 1;
        Ok(())
    }

    /// Number of items appended so far.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True if nothing has been appended.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Flushes the compressor and freezes the tape.
    pub fn finish(self) -> Result<Tape<T>, TrellisError> {
        let bytes = self.encoder.finish()?;
        Ok(Tape {
            bytes,
            len: self.len,
            phantom: PhantomData,
        })
    }
}

impl<T: Serialize> Default for TapeWriter<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable compressed sequence of items.
pub struct Tape<T> {
    bytes: Vec<u8>,
    len: usize,
    phantom: PhantomData<T>,
}

impl<T: DeserializeOwned> Tape<T> {
    /// Number of items on the tape.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True if the tape holds no items.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Size of the compressed backing buffer in bytes.
    pub fn compressed_len(&self) -> usize {
        self.bytes.len()
    }

    /// Sequential decompressing reader over the items, in insertion order.
    pub fn iter(&self) -> TapeIter<'_, T> {
        TapeIter {
            decoder: ZlibDecoder::new(&self.bytes[..]),
            remaining: self.len,
            phantom: PhantomData,
        }
    }
}

/// Decompressing iterator returned by [`Tape::iter`].
pub struct TapeIter<'a, T> {
    decoder: ZlibDecoder<&'a [u8]>,
    remaining: usize,
    phantom: PhantomData<T>,
}

impl<'a, T: DeserializeOwned> Iterator for TapeIter<'a, T> {
    type Item = Result<T, TrellisError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        Some(bincode::deserialize_from(&mut self.decoder).map_err(TrellisError::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_items_in_order() {
        let mut writer = TapeWriter::new();
        let items: Vec<Vec<u8>> = (0..10u8).map(|i| vec![i; 64]).collect();
        for item in &items {
            writer.push(item).unwrap();
        }
        assert_eq!(writer.len(), 10);
        let tape = writer.finish().unwrap();
        assert_eq!(tape.len(), 10);
        let read: Vec<Vec<u8>> = tape.iter().collect::<Result<_, _>>().unwrap();
        assert_eq!(read, items);
    }

    #[test]
    fn compresses_repetitive_payloads() {
        let mut writer = TapeWriter::new();
        let frame = vec![0u8; 16_800];
        for _ in 0..100 {
            writer.push(&frame).unwrap();
        }
        let tape = writer.finish().unwrap();
        assert!(tape.compressed_len() < 100 * frame.len() / 10);
    }

    #[test]
    fn empty_tape_yields_nothing() {
        let writer: TapeWriter<u32> = TapeWriter::new();
        let tape = writer.finish().unwrap();
        assert!(tape.is_empty());
        assert_eq!(tape.iter().count(), 0);
    }

    #[test]
    fn corrupt_bytes_surface_as_errors() {
        let mut writer = TapeWriter::new();
        for i in 0..4u32 {
            writer.push(&vec![i; 100]).unwrap();
        }
        let mut tape = writer.finish().unwrap();
        tape.bytes.truncate(tape.bytes.len() / 2);
        let results: Vec<_> = tape.iter().collect();
        assert!(results.iter().any(|r| r.is_err()));
    }
}
