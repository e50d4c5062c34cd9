//! Pluggable decoders for raw key and value bytes.
//!
//! The wire format carries UTF-8 text keys and big-endian 32-bit integer
//! values; JSON payloads are supported for sources that carry structured
//! records.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid utf-8 sequence: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("expected {expected} bytes, got {actual}")]
    WrongLength { expected: usize, actual: usize },

    #[error("malformed json payload: {0}")]
    MalformedJson(#[from] serde_json::Error),
}

/// Turns raw bytes from the wire into a typed key or value.
pub trait Decoder: Send + Sync {
    type Output;

    fn decode(&self, bytes: &[u8]) -> Result<Self::Output, DecodeError>;
}

/// Decodes UTF-8 text.
#[derive(Debug, Clone, Copy, Default)]
pub struct Utf8Decoder;

impl Decoder for Utf8Decoder {
    type Output = String;

    fn decode(&self, bytes: &[u8]) -> Result<String, DecodeError> {
        Ok(std::str::from_utf8(bytes)?.to_owned())
    }
}

/// Decodes a 32-bit integer from exactly four big-endian bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct I32BeDecoder;

impl Decoder for I32BeDecoder {
    type Output = i32;

    fn decode(&self, bytes: &[u8]) -> Result<i32, DecodeError> {
        let raw: [u8; 4] = bytes.try_into().map_err(|_| DecodeError::WrongLength {
            expected: 4,
            actual: bytes.len(),
        })?;
        Ok(i32::from_be_bytes(raw))
    }
}

/// Decodes a JSON payload into any deserializable type.
pub struct JsonDecoder<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonDecoder<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonDecoder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DeserializeOwned> Decoder for JsonDecoder<T> {
    type Output = T;

    fn decode(&self, bytes: &[u8]) -> Result<T, DecodeError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
