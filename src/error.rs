//! Error taxonomy for the decoder (spec §7). Every fallible operation in
//! this crate returns [`crate::Result`]; there is no silent recovery except
//! for the two documented non-fatal conditions (directory orphans, unknown
//! property value-types), which are reported through the notification sink
//! instead of as an `Err`.

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("invalid signature: expected {:x?}, found {found:x?}", crate::constants::MAGIC_BYTES)]
    InvalidSignature { found: Vec<u8> },

    #[error("invalid header: field {field} => {reason}")]
    InvalidHeader { field: &'static str, reason: String },

    #[error("SAT cycle detected at sector {0}")]
    SatCycle(u32),

    #[error("SAT index {0} out of bounds")]
    SatOutOfBounds(u32),

    #[error("invalid SAT sentinel {0:#x} encountered mid-chain")]
    SatInvalid(u32),

    #[error("corrupt MSAT: {0}")]
    CorruptMsat(String),

    #[error("corrupt mini-SAT: {0}")]
    CorruptMinisat(String),

    #[error("directory cycle detected at entry {0}")]
    DirectoryCycle(u32),

    #[error("directory corrupt: {0}")]
    DirectoryCorrupt(String),

    #[error("invalid directory entry: field {field} => {reason}")]
    InvalidDirectoryEntry { field: &'static str, reason: String },

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("not a stream: {0}")]
    NotAStream(String),

    #[error("not a storage: {0}")]
    NotAStorage(String),

    #[error("invalid size: {0}")]
    InvalidSize(u64),

    #[error("invalid read: offset {offset} + length {length} overflows")]
    InvalidRead { offset: u64, length: u64 },

    #[error("invalid property set: {0}")]
    InvalidPropertySet(String),

    #[error("type mismatch: expected {expected}, found {actual}")]
    TypeMismatch { expected: &'static str, actual: String },

    #[error("operation aborted")]
    Aborted,

    #[error("from utf16: {0}")]
    FromUtf16(#[from] std::string::FromUtf16Error),
}

pub type Result<T> = std::result::Result<T, Error>;
