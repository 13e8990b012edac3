//! Error types for pool operations

use core::fmt;

/// Result type for pool operations
pub type PoolResult<T> = core::result::Result<T, PoolError>;

/// Errors produced by pool construction, allocation and release
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// Block size is not a positive whole multiple of the chunk size
    ChunkMisfit {
        /// Configured block size in bytes
        block_size: usize,
        /// Configured chunk size in bytes
        chunk_size: usize,
    },

    /// Chunk size cannot hold a free-list link
    ChunkTooSmall {
        /// Configured chunk size in bytes
        chunk_size: usize,
        /// Minimum chunk size (the size of a pointer)
        minimum: usize,
    },

    /// Element type does not fit in the configured chunk size
    ElementTooLarge {
        /// Configured chunk size in bytes
        chunk_size: usize,
        /// Size of the element type in bytes
        element_size: usize,
    },

    /// Element alignment is incompatible with the chunk stride
    ElementMisaligned {
        /// Configured chunk size in bytes
        chunk_size: usize,
        /// Alignment of the element type in bytes
        element_align: usize,
    },

    /// Pointer is not owned by any block of the pool
    ForeignPointer {
        /// Address of the rejected pointer
        address: usize,
    },

    /// Backing-region allocation failed
    OutOfMemory {
        /// Number of bytes that could not be obtained
        requested: usize,
    },

    /// Requested element count overflows the addressable byte range
    ArrayLength {
        /// Requested element count
        count: usize,
        /// Size of one element in bytes
        element_size: usize,
    },
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChunkMisfit { block_size, chunk_size } => {
                write!(
                    f,
                    "chunk size {chunk_size} must fit in the block size {block_size}"
                )
            },
            Self::ChunkTooSmall { chunk_size, minimum } => {
                write!(
                    f,
                    "chunk size {chunk_size} must be at least {minimum} bytes (the size of a pointer)"
                )
            },
            Self::ElementTooLarge { chunk_size, element_size } => {
                write!(
                    f,
                    "element of {element_size} bytes exceeds the chunk size {chunk_size}"
                )
            },
            Self::ElementMisaligned { chunk_size, element_align } => {
                write!(
                    f,
                    "element alignment {element_align} is incompatible with the chunk size {chunk_size}"
                )
            },
            Self::ForeignPointer { address } => {
                write!(f, "chunk {address:#x} does not belong to the pool")
            },
            Self::OutOfMemory { requested } => {
                write!(f, "out of memory: could not allocate {requested} bytes")
            },
            Self::ArrayLength { count, element_size } => {
                write!(
                    f,
                    "array length overflow: {count} elements of {element_size} bytes"
                )
            },
        }
    }
}

impl std::error::Error for PoolError {}

impl PoolError {
    /// Create a misfit error (block size not a multiple of chunk size)
    pub fn chunk_misfit(block_size: usize, chunk_size: usize) -> Self {
        Self::ChunkMisfit { block_size, chunk_size }
    }

    /// Create an undersized-chunk error
    pub fn chunk_too_small(chunk_size: usize) -> Self {
        Self::ChunkTooSmall {
            chunk_size,
            minimum: core::mem::size_of::<*mut u8>(),
        }
    }

    /// Create an oversized-element error
    pub fn element_too_large(chunk_size: usize, element_size: usize) -> Self {
        Self::ElementTooLarge { chunk_size, element_size }
    }

    /// Create an alignment-misfit error
    pub fn element_misaligned(chunk_size: usize, element_align: usize) -> Self {
        Self::ElementMisaligned { chunk_size, element_align }
    }

    /// Create a foreign-pointer error for the given address
    pub fn foreign_pointer(address: usize) -> Self {
        Self::ForeignPointer { address }
    }

    /// Create an out-of-memory error
    pub fn out_of_memory(requested: usize) -> Self {
        Self::OutOfMemory { requested }
    }

    /// Create an array-length overflow error
    pub fn array_length(count: usize, element_size: usize) -> Self {
        Self::ArrayLength { count, element_size }
    }

    /// Checks whether this error reports memory exhaustion
    pub fn is_out_of_memory(&self) -> bool {
        matches!(self, Self::OutOfMemory { .. })
    }

    /// Checks whether this error rejects a pointer outside the pool
    pub fn is_foreign_pointer(&self) -> bool {
        matches!(self, Self::ForeignPointer { .. })
    }
}
