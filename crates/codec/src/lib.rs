//! Fixed-layout binary encoding for the relay protocol.
//!
//! Every multi-byte integer is little-endian, on the wire and in the HTTP
//! control-plane bodies alike. There is no length prefix inside a frame:
//! one KCP message (or one HTTP body) is one application message, and the
//! transport is trusted to preserve frame boundaries.

pub mod control;
pub mod message;

use std::{array::TryFromSliceError, str::Utf8Error};

/// A single-use 128-bit capability handed out by the HTTP control plane and
/// consumed by the KCP data plane. Travels on the wire as exactly 16 raw
/// bytes, never as a formatted string.
pub type Token = [u8; 16];

#[derive(Debug)]
pub enum Error {
    /// The buffer was too short or otherwise structurally invalid for the
    /// type being decoded.
    InvalidInput,
    /// The first byte did not match any known message kind.
    UnknownKind(u8),
    /// The body length did not match what the message kind requires.
    UnexpectedLength { expected: &'static str, got: usize },
    Utf8Error(Utf8Error),
    TryFromSliceError(TryFromSliceError),
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidInput => write!(f, "invalid input"),
            Self::UnknownKind(tag) => write!(f, "unrecognized message kind: {tag}"),
            Self::UnexpectedLength { expected, got } => {
                write!(f, "unexpected body length: expected {expected}, got {got}")
            }
            Self::Utf8Error(e) => write!(f, "{e}"),
            Self::TryFromSliceError(e) => write!(f, "{e}"),
        }
    }
}

impl From<Utf8Error> for Error {
    fn from(value: Utf8Error) -> Self {
        Self::Utf8Error(value)
    }
}

impl From<TryFromSliceError> for Error {
    fn from(value: TryFromSliceError) -> Self {
        Self::TryFromSliceError(value)
    }
}

pub(crate) fn read_u32(bytes: &[u8], offset: usize) -> Result<u32, Error> {
    bytes
        .get(offset..offset + 4)
        .ok_or(Error::InvalidInput)?
        .try_into()
        .map(u32::from_le_bytes)
        .map_err(Error::from)
}

pub(crate) fn read_u64(bytes: &[u8], offset: usize) -> Result<u64, Error> {
    bytes
        .get(offset..offset + 8)
        .ok_or(Error::InvalidInput)?
        .try_into()
        .map(u64::from_le_bytes)
        .map_err(Error::from)
}
