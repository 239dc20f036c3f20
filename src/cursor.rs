//! Opaque offset-based pagination cursor
//!
//! A cursor is a base64 (standard alphabet) encoding of `{"offset":N}`.
//! Clients must echo it back unchanged; the server re-validates every
//! decoded cursor instead of trusting the wire form.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures while building, encoding or decoding a cursor
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CursorError {
    /// Offset below zero
    #[error("offset must be non-negative")]
    NegativeOffset,

    /// Empty token supplied by the caller
    #[error("encoded cursor cannot be empty")]
    Empty,

    /// Token is not valid base64
    #[error("invalid base64 encoding: {0}")]
    Base64(String),

    /// Token decoded but is not a cursor document
    #[error("invalid cursor format: {0}")]
    Format(String),

    /// Cursor document could not be serialized
    #[error("failed to marshal cursor: {0}")]
    Marshal(String),
}

/// Pagination position
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    offset: i32,
}

impl Cursor {
    /// Create a cursor at `offset`
    ///
    /// # Errors
    ///
    /// Returns [`CursorError::NegativeOffset`] for negative offsets
    pub fn new(offset: i32) -> Result<Self, CursorError> {
        let cursor = Self { offset };
        cursor.validate()?;
        Ok(cursor)
    }

    /// Current offset
    pub fn offset(&self) -> i32 {
        self.offset
    }

    fn validate(&self) -> Result<(), CursorError> {
        if self.offset < 0 {
            return Err(CursorError::NegativeOffset);
        }
        Ok(())
    }

    /// Serialize the cursor into its opaque token
    pub fn encode(&self) -> Result<String, CursorError> {
        self.validate()?;
        let json = serde_json::to_vec(self).map_err(|e| CursorError::Marshal(e.to_string()))?;
        Ok(STANDARD.encode(json))
    }

    /// Parse and validate an opaque token
    ///
    /// # Examples
    ///
    /// ```
    /// use stackrox_mcp::cursor::Cursor;
    ///
    /// let token = Cursor::new(50).unwrap().encode().unwrap();
    /// assert_eq!(Cursor::decode(&token).unwrap().offset(), 50);
    /// assert!(Cursor::decode("").is_err());
    /// ```
    pub fn decode(encoded: &str) -> Result<Self, CursorError> {
        if encoded.is_empty() {
            return Err(CursorError::Empty);
        }

        let raw = STANDARD
            .decode(encoded)
            .map_err(|e| CursorError::Base64(e.to_string()))?;
        let cursor: Cursor =
            serde_json::from_slice(&raw).map_err(|e| CursorError::Format(e.to_string()))?;
        cursor.validate()?;

        Ok(cursor)
    }

    /// Cursor for the page after one of `limit` items
    ///
    /// Negative limits count as zero. If `offset + limit` overflows the
    /// offset stays where it is.
    pub fn next_cursor(&self, limit: i32) -> Cursor {
        let limit = limit.max(0);
        match self.offset.checked_add(limit) {
            Some(offset) => Cursor { offset },
            None => *self,
        }
    }
}
