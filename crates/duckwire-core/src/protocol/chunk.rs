//! Payload chunking for streamed transfers.
//!
//! Large payloads (keystroke text blocks, SD file contents) cannot be sent
//! as one frame: the device buffers at most ~128 bytes per command and
//! processes chunks only as fast as it can execute them.  The streamer
//! therefore splits a payload into fixed-size chunks and gates each send on
//! the acknowledgement of the previous one.
//!
//! This module holds only the arithmetic.  The contract:
//!
//! - chunk count = ceil(len / chunk_size)
//! - offsets are strictly monotonic and non-overlapping
//! - concatenating all chunks in order reproduces the payload exactly
//! - only the last chunk may be shorter than `chunk_size`

/// One bounded slice of a larger payload.
///
/// Chunks are ephemeral: they borrow the payload and are consumed as they
/// are transmitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    /// Byte offset of this chunk within the payload.
    pub offset: usize,
    /// The chunk bytes.
    pub data: &'a [u8],
}

impl Chunk<'_> {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Returns the number of chunks a payload of `len` bytes produces.
pub fn chunk_count(len: usize, chunk_size: usize) -> usize {
    assert!(chunk_size > 0, "chunk size must be non-zero");
    len.div_ceil(chunk_size)
}

/// Splits `payload` into chunks of at most `chunk_size` bytes.
///
/// An empty payload yields no chunks.
///
/// # Panics
///
/// Panics if `chunk_size` is zero (a configuration bug, not a runtime
/// condition).
pub fn chunk_payload(payload: &[u8], chunk_size: usize) -> impl Iterator<Item = Chunk<'_>> {
    assert!(chunk_size > 0, "chunk size must be non-zero");
    payload
        .chunks(chunk_size)
        .enumerate()
        .map(move |(i, data)| Chunk {
            offset: i * chunk_size,
            data,
        })
}
