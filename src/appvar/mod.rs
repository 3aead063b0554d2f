//! AppVar serializer.
//!
//! An [`AppVar`] is filled in a fixed order: `init` copies the header string
//! and the lookup table, `append` adds each segment, `finalize` compresses
//! the arena if requested and checks the size limit, and `write` produces the
//! `.8xv` file.

pub mod header;
pub mod lut;

pub use header::VarFileHeader;
pub use lut::{Layout, SegmentSize};

use crate::compress::{self, CompressError, CompressMode};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Largest payload an AppVar may hold.
pub const APPVAR_MAX_DATA_SIZE: usize = 65505;
/// Arena ceiling while the contents will still be compressed.
pub const APPVAR_MAX_ARENA_SIZE: usize = 0x40000;

/// AppVar building failures.
#[derive(Debug, Error)]
pub enum AppVarError {
    #[error("invalid appvar name '{0}': expected 1 to 8 letters or digits, starting with a letter")]
    InvalidName(String),
    #[error("appvar comment is {0} bytes, at most 42 allowed")]
    CommentTooLong(usize),
    #[error("cannot {op} appvar in state {state}")]
    InvalidState { op: &'static str, state: AppVarState },
    #[error("appvar data would grow to {needed} bytes, limit is {max}")]
    Capacity { needed: usize, max: usize },
    #[error("appvar is {size} bytes after finalizing, limit is {max}")]
    TooLarge { size: usize, max: usize },
    #[error("lut value {value} does not fit in {entry_size} bytes")]
    LutEntryOverflow { value: usize, entry_size: usize },
    #[error("appvar holds {actual} bytes but its layout expects {expected}")]
    LayoutMismatch { expected: usize, actual: usize },
    #[error(transparent)]
    Compress(#[from] CompressError),
    #[error("failed to write '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Lifecycle of an [`AppVar`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppVarState {
    Empty,
    HeaderWritten,
    LutReserved,
    DataAppended,
    Finalized,
    Written,
}

impl fmt::Display for AppVarState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AppVarState::Empty => "empty",
            AppVarState::HeaderWritten => "header-written",
            AppVarState::LutReserved => "lut-reserved",
            AppVarState::DataAppended => "data-appended",
            AppVarState::Finalized => "finalized",
            AppVarState::Written => "written",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct AppVar {
    name: String,
    comment: String,
    archived: bool,
    compress: CompressMode,
    data: Vec<u8>,
    uncompressed_size: usize,
    expected_len: Option<usize>,
    state: AppVarState,
}

impl AppVar {
    pub fn new(name: &str) -> Result<Self, AppVarError> {
        let valid = (1..=header::NAME_LEN).contains(&name.len())
            && name.starts_with(|c: char| c.is_ascii_alphabetic())
            && name.chars().all(|c| c.is_ascii_alphanumeric());
        if !valid {
            return Err(AppVarError::InvalidName(name.to_string()));
        }
        Ok(Self {
            name: name.to_string(),
            comment: String::new(),
            archived: false,
            compress: CompressMode::None,
            data: Vec::new(),
            uncompressed_size: 0,
            expected_len: None,
            state: AppVarState::Empty,
        })
    }

    pub fn with_comment(mut self, comment: &str) -> Result<Self, AppVarError> {
        if comment.len() > header::COMMENT_LEN {
            return Err(AppVarError::CommentTooLong(comment.len()));
        }
        self.comment = comment.to_string();
        Ok(self)
    }

    pub fn with_archived(mut self, archived: bool) -> Self {
        self.archived = archived;
        self
    }

    pub fn with_compress(mut self, compress: CompressMode) -> Self {
        self.compress = compress;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> AppVarState {
        self.state
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn uncompressed_size(&self) -> usize {
        self.uncompressed_size
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    fn expect_state(&self, op: &'static str, allowed: &[AppVarState]) -> Result<(), AppVarError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(AppVarError::InvalidState { op, state: self.state })
        }
    }

    fn capacity(&self) -> usize {
        if self.compress.is_none() {
            APPVAR_MAX_DATA_SIZE
        } else {
            APPVAR_MAX_ARENA_SIZE
        }
    }

    fn push(&mut self, bytes: &[u8]) -> Result<(), AppVarError> {
        let needed = self.data.len() + bytes.len();
        if needed > self.capacity() {
            return Err(AppVarError::Capacity { needed, max: self.capacity() });
        }
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    /// Copy the header string and, with a LUT layout, the lookup table.
    pub fn init(&mut self, header_string: &[u8], layout: &Layout) -> Result<(), AppVarError> {
        self.expect_state("init", &[AppVarState::Empty])?;
        self.push(header_string)?;
        self.state = AppVarState::HeaderWritten;

        if layout.entry_size.is_some() {
            let lut = layout.lut_bytes()?;
            self.push(&lut)?;
            self.state = AppVarState::LutReserved;
        }
        self.expected_len = Some(layout.len);
        Ok(())
    }

    pub fn append(&mut self, bytes: &[u8]) -> Result<(), AppVarError> {
        self.expect_state(
            "append to",
            &[AppVarState::HeaderWritten, AppVarState::LutReserved, AppVarState::DataAppended],
        )?;
        self.push(bytes)?;
        self.state = AppVarState::DataAppended;
        Ok(())
    }

    /// Compress the whole arena if configured and enforce the size limit.
    pub fn finalize(&mut self) -> Result<(), AppVarError> {
        self.expect_state(
            "finalize",
            &[AppVarState::HeaderWritten, AppVarState::LutReserved, AppVarState::DataAppended],
        )?;
        if let Some(expected) = self.expected_len {
            if expected != self.data.len() {
                return Err(AppVarError::LayoutMismatch { expected, actual: self.data.len() });
            }
        }

        self.uncompressed_size = self.data.len();
        if !self.compress.is_none() {
            self.data = compress::compress(self.compress, &self.data)?;
            log::debug!(
                "appvar {}: {} compressed {} -> {} bytes",
                self.name,
                self.compress,
                self.uncompressed_size,
                self.data.len()
            );
        }
        if self.data.len() > APPVAR_MAX_DATA_SIZE {
            return Err(AppVarError::TooLarge { size: self.data.len(), max: APPVAR_MAX_DATA_SIZE });
        }
        self.state = AppVarState::Finalized;
        Ok(())
    }

    /// The complete `.8xv` file: header, data and checksum.
    pub fn to_file_bytes(&self) -> Result<Vec<u8>, AppVarError> {
        self.expect_state("serialize", &[AppVarState::Finalized, AppVarState::Written])?;

        let header = VarFileHeader::new()
            .comment(&self.comment)
            .name(&self.name)
            .archived(self.archived)
            .data_size(self.data.len() as u16);

        let mut file = Vec::with_capacity(header::HEADER_SIZE + self.data.len() + 2);
        file.extend_from_slice(header.as_bytes());
        file.extend_from_slice(&self.data);
        let sum = header::checksum(&file);
        file.extend_from_slice(&sum.to_le_bytes());
        Ok(file)
    }

    /// Write the file through a temporary sibling, removing it on failure.
    pub fn write(&mut self, path: &Path) -> Result<(), AppVarError> {
        let bytes = self.to_file_bytes()?;
        let tmp = path.with_extension("8xv.tmp");

        let result = fs::File::create(&tmp)
            .and_then(|mut file| {
                file.write_all(&bytes)?;
                file.sync_all()
            })
            .and_then(|_| fs::rename(&tmp, path));

        if let Err(source) = result {
            let _ = fs::remove_file(&tmp);
            return Err(AppVarError::Io { path: path.to_path_buf(), source });
        }
        self.state = AppVarState::Written;
        Ok(())
    }
}
