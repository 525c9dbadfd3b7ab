//! Structural validation of torrent metadata files.
//!
//! A file that is still being written is indistinguishable from a corrupt
//! one, so validation only answers "usable right now or not". The partial
//! file tracker decides how long to keep asking.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use tracing::debug;

/// Largest metadata file the default validator will read.
pub const DEFAULT_MAX_METADATA_SIZE: u64 = 100 * 1024 * 1024;
/// Deepest list/dictionary nesting accepted by the bencode parser.
pub const DEFAULT_MAX_NESTING: usize = 100;

/// Decides whether a candidate metadata file is usable.
pub trait MetadataValidator: Send + Sync {
    fn is_valid(&self, path: &Path) -> bool;
}

impl<F> MetadataValidator for F
where
    F: Fn(&Path) -> bool + Send + Sync,
{
    fn is_valid(&self, path: &Path) -> bool {
        self(path)
    }
}

/// Accepts files that parse completely as bencode and contain a top-level
/// dictionary with an `info` dictionary.
#[derive(Debug, Clone, Copy)]
pub struct BencodeValidator {
    max_size: u64,
    max_nesting: usize,
}

impl Default for BencodeValidator {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_METADATA_SIZE,
            max_nesting: DEFAULT_MAX_NESTING,
        }
    }
}

impl BencodeValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = max_size;
        self
    }

    /// Validate an in-memory buffer.
    pub fn validate_bytes(&self, bytes: &[u8]) -> bool {
        let mut parser = Parser {
            input: bytes,
            pos: 0,
            max_nesting: self.max_nesting,
        };
        match parser.top_level_has_info() {
            Some(has_info) => has_info && parser.pos == bytes.len(),
            None => false,
        }
    }
}

impl MetadataValidator for BencodeValidator {
    fn is_valid(&self, path: &Path) -> bool {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(err) => {
                debug!("cannot open {}: {}", path.display(), err);
                return false;
            }
        };
        let len = file.metadata().map(|md| md.len()).unwrap_or(0);
        if len == 0 || len > self.max_size {
            debug!("{} has unusable size {}", path.display(), len);
            return false;
        }

        let mut bytes = Vec::with_capacity(len as usize);
        if let Err(err) = file.take(self.max_size + 1).read_to_end(&mut bytes) {
            debug!("cannot read {}: {}", path.display(), err);
            return false;
        }
        if bytes.len() as u64 > self.max_size {
            return false;
        }
        self.validate_bytes(&bytes)
    }
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
    max_nesting: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    /// Parse the single top-level value. `Some(true)` when it is a dictionary
    /// holding an `info` dictionary.
    fn top_level_has_info(&mut self) -> Option<bool> {
        if self.peek()? != b'd' {
            self.skip_value(0)?;
            return Some(false);
        }
        self.pos += 1;
        let mut has_info = false;
        while self.peek()? != b'e' {
            let key = self.byte_string()?;
            if key == b"info" && self.peek()? == b'd' {
                has_info = true;
            }
            self.skip_value(1)?;
        }
        self.pos += 1;
        Some(has_info)
    }

    fn skip_value(&mut self, depth: usize) -> Option<()> {
        if depth > self.max_nesting {
            return None;
        }
        match self.peek()? {
            b'i' => self.integer(),
            b'l' => {
                self.pos += 1;
                while self.peek()? != b'e' {
                    self.skip_value(depth + 1)?;
                }
                self.pos += 1;
                Some(())
            }
            b'd' => {
                self.pos += 1;
                while self.peek()? != b'e' {
                    self.byte_string()?;
                    self.skip_value(depth + 1)?;
                }
                self.pos += 1;
                Some(())
            }
            b'0'..=b'9' => self.byte_string().map(|_| ()),
            _ => None,
        }
    }

    fn integer(&mut self) -> Option<()> {
        // i<digits>e with an optional minus; no leading zeros, no "-0".
        self.pos += 1;
        let start = self.pos;
        if self.peek()? == b'-' {
            self.pos += 1;
        }
        let digits_start = self.pos;
        while self.peek()?.is_ascii_digit() {
            self.pos += 1;
        }
        let digits = &self.input[digits_start..self.pos];
        if digits.is_empty() || (digits.len() > 1 && digits[0] == b'0') {
            return None;
        }
        if digits == b"0" && digits_start != start {
            return None;
        }
        if self.peek()? != b'e' {
            return None;
        }
        self.pos += 1;
        Some(())
    }

    fn byte_string(&mut self) -> Option<&'a [u8]> {
        let input = self.input;
        let len_start = self.pos;
        while self.peek()?.is_ascii_digit() {
            self.pos += 1;
        }
        if self.pos == len_start || self.peek()? != b':' {
            return None;
        }
        let len: usize = std::str::from_utf8(&input[len_start..self.pos])
            .ok()?
            .parse()
            .ok()?;
        self.pos += 1;
        let end = self.pos.checked_add(len)?;
        let bytes = input.get(self.pos..end)?;
        self.pos = end;
        Some(bytes)
    }
}
