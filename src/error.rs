// ── pwsafe3 / error ─────────────────────────────────────────────────────────
//
// Structured error taxonomy for the container codec, the field/collection
// model, and the autotype tokenizer. Mirrors the kinds enumerated by the
// format: callers match on `Error::Format`/`Error::Crypto`/etc. rather than
// string-sniffing a message.

use thiserror::Error;

/// Top-level error type returned by every fallible operation in this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Null/empty argument where forbidden, or an item that is already owned.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Attempted mutation of a read-only document or collection.
    #[error("document or collection is read-only")]
    ReadOnly,

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Underlying reader/writer failure, propagated unchanged.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Violations of collection/ownership invariants that are not format or
/// crypto failures.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DomainError {
    /// An indexer that only supports removal (assigning "none") was given
    /// anything else.
    #[error("this indexer only supports assigning none (i.e. removal)")]
    OnlyNoneSupported,
}

/// Failures in the on-disk byte layout.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// The byte stream is too short or its leading/trailing tags do not
    /// match the V3 container format.
    #[error("unrecognized Password Safe V3 container format")]
    UnrecognizedFormat,
    /// The first header is not `Version`, or its value is below 0x0300.
    #[error("unsupported or missing format version")]
    UnsupportedVersion,
    /// A typed read was attempted against a field whose raw payload has the
    /// wrong width for that type.
    #[error("field payload width {actual} does not match expected width {expected} for this type")]
    BadFieldWidth { expected: usize, actual: usize },
}

/// Cryptographic verification failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// `SHA256(stretched_key)` did not match the stored verifier: the
    /// passphrase is wrong.
    #[error("passphrase does not match this database")]
    PasswordMismatch,
    /// The trailing HMAC-SHA-256 did not match the recomputed value: the
    /// body has been tampered with or corrupted.
    #[error("authentication check failed: container body is corrupt or tampered")]
    AuthenticationMismatch,
}
