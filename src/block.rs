use crate::clock::Tid;
use crate::error::BlockNameError;
use std::fmt;

/// Longest block name kept; longer names are truncated.
pub const MAX_NAME_LEN: usize = 4;

/// Name used by callers that do not care to name their block.
pub const DEFAULT_BLOCK_NAME: &str = "NDEF";

/// A block name of up to four ASCII characters packed into a `u32`.
///
/// The first character lands in the most significant byte and unused trailing bytes are
/// zero, so decoding stops at the first zero byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NameCode(u32);

impl NameCode {
    /// Packs the first [`MAX_NAME_LEN`] characters of `name`.
    ///
    /// Truncation is silent here; callers decide whether to warn about it (see
    /// [`NameCode::is_truncated`]).
    #[inline]
    pub fn encode(name: &str) -> Result<Self, BlockNameError> {
        let bytes = name.as_bytes();
        if bytes.is_empty() {
            return Err(BlockNameError::Empty);
        }

        let mut code = 0u32;
        for (i, &b) in bytes.iter().take(MAX_NAME_LEN).enumerate() {
            if b == 0 {
                return Err(BlockNameError::ContainsNul);
            }
            if !b.is_ascii() {
                return Err(BlockNameError::NonAscii);
            }
            code |= (b as u32) << (24 - 8 * i);
        }
        Ok(NameCode(code))
    }

    pub fn is_truncated(name: &str) -> bool {
        name.len() > MAX_NAME_LEN
    }

    pub fn decode(self) -> String {
        self.to_string()
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    fn as_bytes(&self) -> ([u8; MAX_NAME_LEN], usize) {
        let bytes = self.0.to_be_bytes();
        let len = bytes.iter().position(|&b| b == 0).unwrap_or(MAX_NAME_LEN);
        (bytes, len)
    }
}

impl fmt::Display for NameCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (bytes, len) = self.as_bytes();
        match std::str::from_utf8(&bytes[..len]) {
            Ok(name) => f.pad(name),
            Err(_) => f.pad(&String::from_utf8_lossy(&bytes[..len])),
        }
    }
}

/// Identifies one open block: the calling thread plus the block name.
///
/// Ordering is thread-major, then name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockKey {
    pub tid: Tid,
    pub name: NameCode,
}

impl BlockKey {
    pub fn new(tid: Tid, name: NameCode) -> Self {
        Self { tid, name }
    }
}
