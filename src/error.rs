// Copyright (c) 2024-present, ad-freiburg/qlever
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::coding::{DecodeError, EncodeError};

/// The operator or subsystem that raised an [`Error`], attached for the
/// JSON error body the query driver builds at the HTTP boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Name of the operator (e.g. `"Join"`, `"OptionalJoin"`) or subsystem
    /// (e.g. `"ExternalIdTableSorter"`) that raised the error.
    pub operator: String,
    /// Optional extra detail, e.g. the offending column index.
    pub detail: Option<String>,
}

impl ErrorContext {
    /// Creates a context carrying only the operator name.
    #[must_use]
    pub fn new(operator: impl Into<String>) -> Self {
        Self {
            operator: operator.into(),
            detail: None,
        }
    }

    /// Attaches a free-form detail string.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Errors that can occur while executing a query plan.
#[derive(Debug)]
pub enum Error {
    /// Malformed SPARQL; raised upstream of this crate, but representable
    /// here so the driver can surface it uniformly alongside the core's own
    /// errors.
    ParseError(String),

    /// No feasible plan could be found; same provenance note as
    /// [`Error::ParseError`].
    PlanningError(String),

    /// An operator received `ValueId`s whose datatypes are incompatible
    /// with the requested operation (e.g. arithmetic on a vocabulary index).
    RuntimeTypeError(ErrorContext),

    /// An operation cannot be defined given the three-valued logic UNDEF
    /// introduces.
    UndefBehaviorError(ErrorContext),

    /// An allocation would exceed the per-query or process memory budget.
    MemoryLimit {
        /// Bytes requested.
        requested: u64,
        /// Bytes still available under the budget.
        available: u64,
    },

    /// The shared cancellation handle fired.
    Cancelled,

    /// A temp-file or response-stream I/O operation failed.
    Io(std::io::Error),

    /// Block (de)serialization failed.
    Encode(EncodeError),
    /// Block (de)serialization failed.
    Decode(DecodeError),

    /// Another thread's computation of the same cache key failed; this
    /// requester does not retry automatically.
    CacheWaitedForFailure,

    /// A block read back from external storage does not match the
    /// checksum recorded for it, indicating a torn write or on-disk
    /// corruption.
    ChecksumMismatch {
        /// Checksum recorded in the block's metadata.
        expected: u128,
        /// Checksum actually computed over the bytes read back.
        actual: u128,
    },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ParseError(msg) => write!(f, "parse error: {msg}"),
            Self::PlanningError(msg) => write!(f, "planning error: {msg}"),
            Self::RuntimeTypeError(ctx) => write!(f, "runtime type error in {}", ctx.operator),
            Self::UndefBehaviorError(ctx) => {
                write!(f, "undefined behavior for UNDEF in {}", ctx.operator)
            }
            Self::MemoryLimit {
                requested,
                available,
            } => write!(
                f,
                "memory limit exceeded: requested {requested} bytes, {available} available"
            ),
            Self::Cancelled => write!(f, "query was cancelled"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Encode(e) => write!(f, "encode error: {e}"),
            Self::Decode(e) => write!(f, "decode error: {e}"),
            Self::CacheWaitedForFailure => {
                write!(f, "waited for a cached computation that then failed")
            }
            Self::ChecksumMismatch { expected, actual } => write!(
                f,
                "checksum mismatch reading external block: expected {expected:x}, got {actual:x}"
            ),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Encode(e) => Some(e),
            Self::Decode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<EncodeError> for Error {
    fn from(value: EncodeError) -> Self {
        Self::Encode(value)
    }
}

impl From<DecodeError> for Error {
    fn from(value: DecodeError) -> Self {
        Self::Decode(value)
    }
}

/// Result type used throughout the query execution core.
pub type Result<T> = std::result::Result<T, Error>;
