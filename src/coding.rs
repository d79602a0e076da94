// Copyright (c) 2024-present, ad-freiburg/qlever
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use std::io::{Read, Write};

/// Error during serialization of on-disk block metadata.
#[derive(Debug)]
pub enum EncodeError {
    /// I/O error
    Io(std::io::Error),
}

impl std::fmt::Display for EncodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "EncodeError({e})"),
        }
    }
}

impl From<std::io::Error> for EncodeError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl std::error::Error for EncodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
        }
    }
}

/// Error during deserialization of on-disk block metadata.
#[derive(Debug)]
pub enum DecodeError {
    /// I/O error
    Io(std::io::Error),
    /// An on-disk tag byte did not match any known variant.
    InvalidTag(&'static str, u8),
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "DecodeError({e})"),
            Self::InvalidTag(what, tag) => write!(f, "invalid tag {tag} for {what}"),
        }
    }
}

impl From<std::io::Error> for DecodeError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::InvalidTag(..) => None,
        }
    }
}

/// Trait implemented by the small fixed-layout structs (block metadata,
/// `ValueId`s) that are written directly into the external table's file
/// format.
pub trait Encode {
    /// Serializes `self` into `writer`.
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError>;

    /// Serializes `self` into a freshly allocated `Vec<u8>`.
    fn encode_into_vec(&self) -> Vec<u8> {
        let mut v = vec![];
        self.encode_into(&mut v).expect("writing to a Vec cannot fail");
        v
    }
}

/// Trait implemented by the small fixed-layout structs that are read back
/// from the external table's file format.
pub trait Decode: Sized {
    /// Deserializes `Self` from `reader`.
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError>;
}
