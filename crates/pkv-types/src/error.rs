use thiserror::Error;

/// Errors produced by PKV operations.
///
/// Each kind renders as a short fixed message. Kinds are never wrapped in
/// one another: collaborator failures are translated to a kind exactly once
/// at the boundary where they occur.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum KvsError {
    /// Error that has no mapping to any other kind.
    #[error("Unknown Error!")]
    UnmappedError,

    /// A requested file does not exist.
    #[error("File not found")]
    FileNotFound,

    /// The KVS data file could not be read.
    #[error("KVS file read error")]
    KvsFileReadError,

    /// The integrity tag file could not be read.
    #[error("KVS hash file read error")]
    KvsHashFileReadError,

    /// The JSON parser rejected the document.
    #[error("JSON parser error")]
    JsonParserError,

    /// The JSON writer failed to produce the document.
    #[error("JSON generator error")]
    JsonGeneratorError,

    /// The physical storage reported a failure.
    #[error("Physical storage failure")]
    PhysicalStorageFailure,

    /// Stored data integrity is corrupted.
    #[error("Integrity corrupted")]
    IntegrityCorrupted,

    /// Integrity tag verification failed.
    #[error("Validation failed")]
    ValidationFailed,

    /// Encryption or decryption failed.
    #[error("Encryption failed")]
    EncryptionFailed,

    /// The resource is busy.
    #[error("Resource is busy")]
    ResourceBusy,

    /// The storage ran out of space.
    #[error("Out of storage space")]
    OutOfStorageSpace,

    /// A configured quota was exceeded.
    #[error("Quota exceeded")]
    QuotaExceeded,

    /// Authentication failed.
    #[error("Authentication failed")]
    AuthenticationFailed,

    /// The key does not exist.
    #[error("Key not found")]
    KeyNotFound,

    /// The key has no default value.
    #[error("Key default value not found")]
    KeyDefaultNotFound,

    /// Serialization failed.
    #[error("Serialization failed")]
    SerializationFailed,

    /// The snapshot id names no restorable snapshot.
    #[error("Invalid snapshot ID")]
    InvalidSnapshotId,

    /// A value could not be converted to the requested type.
    #[error("Conversion failed")]
    ConversionFailed,

    /// The instance mutex could not be acquired.
    #[error("Mutex lock failed")]
    MutexLockFailed,

    /// A stored node is not a well-formed tagged value.
    #[error("Invalid value type")]
    InvalidValueType,
}
