/// Size in bytes of the length prefix used for strings, sequences and
/// dictionaries in the wire encoding (u32, little-endian).
pub const LENGTH_FIELD_SIZE: usize = 4;

/// Size in bytes of the reply-status tag that leads every reply envelope.
pub const REPLY_STATUS_SIZE: usize = 1;

/// Maximum number of elements allowed in a legacy facet path.
/// The facet is encoded as a 0-or-1-element string sequence; anything
/// longer is a marshaling error.
pub const FACET_PATH_MAX_LEN: usize = 1;

/// An invocation timeout of zero means the deadline is disabled.
pub const INVOCATION_TIMEOUT_DISABLED: u64 = 0;

/// Default number of recycled buffers a `BufferPool` keeps around.
pub const DEFAULT_BUFFER_POOL_CAPACITY: usize = 16;
