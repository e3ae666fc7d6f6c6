//! Immutable byte payloads.

use std::fmt;
use std::sync::Arc;

use super::Measured;

/// An immutable view over a cached byte payload.
///
/// Clones share the underlying allocation, so the same view can sit in the
/// store and be held by any number of callers at once. No accessor hands out
/// mutable access; a caller that needs an owned buffer takes an independent
/// copy via [`ByteView::to_vec`], and mutating that copy never touches the
/// cached entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteView {
    bytes: Arc<[u8]>,
}

impl ByteView {
    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Borrows the payload read-only.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Returns an independent copy of the payload.
    pub fn to_vec(&self) -> Vec<u8> {
        self.bytes.to_vec()
    }
}

impl From<Vec<u8>> for ByteView {
    fn from(bytes: Vec<u8>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }
}

impl From<&[u8]> for ByteView {
    fn from(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }
}

impl From<&str> for ByteView {
    fn from(s: &str) -> Self {
        Self {
            bytes: s.as_bytes().into(),
        }
    }
}

impl fmt::Display for ByteView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.bytes))
    }
}

impl Measured for ByteView {
    fn size(&self) -> usize {
        self.bytes.len()
    }
}
