use std::sync::Arc;

/// One raw chunk contributed by a source, backed by refcounted storage.
///
/// The backing bytes are shared, never copied: duplicating a chunk for
/// fan-out bumps the refcount of the same allocation.
#[derive(Debug, Clone)]
pub struct Chunk {
    data: Arc<[u8]>,
    position: u32,
    total: u32,
}

impl Chunk {
    /// Wraps raw bytes together with the position/total the source declared.
    pub fn new(data: impl Into<Arc<[u8]>>, position: u32, total: u32) -> Self {
        Self {
            data: data.into(),
            position,
            total,
        }
    }

    /// Declared position of this chunk within its source's chain.
    pub fn position(&self) -> u32 {
        self.position
    }

    /// Declared total chunk count for the source's contribution.
    pub fn total(&self) -> u32 {
        self.total
    }

    /// Raw byte length.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the chunk carries no bytes.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Read access to the backing bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Handle to the backing allocation, for building located views.
    pub(crate) fn backing(&self) -> Arc<[u8]> {
        self.data.clone()
    }
}

/// Ordered chain of chunks from a single source for a single record.
///
/// Move-only by design: a chain is exclusively owned by whichever component
/// currently holds it, and the sole duplication path is the explicit
/// [`ChunkChain::clone_for_fanout`], which shares the chunk storage by
/// refcount instead of copying bytes.
#[derive(Debug)]
pub struct ChunkChain {
    chunks: Vec<Chunk>,
    byte_len: usize,
    finalized: bool,
}

impl ChunkChain {
    /// Starts an empty chain.
    pub fn new() -> Self {
        Self {
            chunks: Vec::new(),
            byte_len: 0,
            finalized: false,
        }
    }

    /// Appends one chunk to the end of the chain.
    pub fn push(&mut self, chunk: Chunk) {
        self.byte_len += chunk.len();
        self.chunks.push(chunk);
    }

    /// Concatenates another chain onto this one. Later fragments from the
    /// same source extend the chain; they never replace it.
    pub fn extend(&mut self, other: ChunkChain) {
        self.byte_len += other.byte_len;
        self.chunks.extend(other.chunks);
    }

    /// Marks the chain as carrying its source's final chunk.
    pub(crate) fn mark_final(&mut self) {
        self.finalized = true;
    }

    /// Whether the source declared its contribution complete.
    pub fn is_final(&self) -> bool {
        self.finalized
    }

    /// Number of chunks in the chain.
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Total bytes across all chunks.
    pub fn byte_len(&self) -> usize {
        self.byte_len
    }

    /// The chunks in chain order.
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Explicit duplication for fan-out. Shares every chunk's backing
    /// storage by refcount; no payload bytes are copied.
    pub fn clone_for_fanout(&self) -> ChunkChain {
        ChunkChain {
            chunks: self.chunks.clone(),
            byte_len: self.byte_len,
            finalized: self.finalized,
        }
    }
}

impl Default for ChunkChain {
    fn default() -> Self {
        Self::new()
    }
}
