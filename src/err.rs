use thiserror::Error;

pub type Result<T> = std::result::Result<T, ResError>;

/// Coarse status classes callers branch on.
///
/// Every [`ResError`] maps onto exactly one kind through [`ResError::kind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The object was never successfully populated.
    NoInit,
    /// Malformed chunk geometry or misaligned offsets.
    BadType,
    /// Out-of-range id or index, or an unresolved mapping.
    BadIndex,
    /// No variant yielded a usable value.
    BadValue,
    /// Registering an overlay package failed.
    NoMemory,
    /// An attribute, id, class, style or resource name lookup missed.
    NameNotFound,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResError {
    #[error("{what} has not been initialized")]
    NotInitialized { what: &'static str },

    #[error("buffer too small for {what} at offset {offset} (need {need} bytes, have {have})")]
    Truncated {
        what: &'static str,
        offset: u64,
        need: usize,
        have: usize,
    },

    #[error("expected chunk type 0x{expected:04x} at offset {offset}, found 0x{found:04x}")]
    UnexpectedChunkType {
        expected: u16,
        found: u16,
        offset: u64,
    },

    #[error("malformed {what} at offset {offset}: {message}")]
    MalformedChunk {
        what: &'static str,
        offset: u64,
        message: String,
    },

    #[error("entry index {entry} is out of range for type {type_id} ({count} entries)")]
    EntryOutOfRange { type_id: u32, entry: u32, count: u32 },

    #[error("resource 0x{id:08x} cannot be mapped: {reason}")]
    Unmapped { id: u32, reason: &'static str },

    #[error("too many references while resolving 0x{id:08x} (limit {limit})")]
    ReferenceLimit { id: u32, limit: usize },

    #[error("cyclic parent chain through bag 0x{id:08x}")]
    CyclicBag { id: u32 },

    #[error("no usable value for resource 0x{id:08x}")]
    NoValue { id: u32 },

    #[error("failed to register package 0x{id:02x} ({name})")]
    PackageRegistration { id: u32, name: String },

    #[error("theme has no value for attribute 0x{id:08x}")]
    AttributeNotFound { id: u32 },

    #[error("{what} `{name}` not found")]
    NameNotFound { what: &'static str, name: String },
}

impl ResError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ResError::NotInitialized { .. } => ErrorKind::NoInit,
            ResError::Truncated { .. }
            | ResError::UnexpectedChunkType { .. }
            | ResError::MalformedChunk { .. }
            | ResError::EntryOutOfRange { .. } => ErrorKind::BadType,
            ResError::Unmapped { .. }
            | ResError::ReferenceLimit { .. }
            | ResError::CyclicBag { .. } => ErrorKind::BadIndex,
            ResError::NoValue { .. } => ErrorKind::BadValue,
            ResError::PackageRegistration { .. } => ErrorKind::NoMemory,
            ResError::AttributeNotFound { .. } | ResError::NameNotFound { .. } => {
                ErrorKind::NameNotFound
            }
        }
    }

    pub(crate) fn malformed(what: &'static str, offset: usize, message: impl Into<String>) -> Self {
        ResError::MalformedChunk {
            what,
            offset: offset as u64,
            message: message.into(),
        }
    }
}
