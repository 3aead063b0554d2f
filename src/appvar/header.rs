//! The fixed-size header of a `.8xv` variable file.

/// `**TI83F*` signature followed by `1A 0A 00`.
pub const MAGIC: [u8; 11] = *b"**TI83F*\x1A\x0A\x00";
/// Header length; the variable data starts here.
pub const HEADER_SIZE: usize = 0x4A;
pub const COMMENT_LEN: usize = 42;
pub const NAME_LEN: usize = 8;
/// Variable type byte for AppVars.
pub const APPVAR_TYPE: u8 = 0x15;
pub const ARCHIVE_FLAG: u8 = 0x80;
/// First byte covered by the checksum.
pub const CHECKSUM_START: usize = 0x37;

const COMMENT_OFFSET: usize = 0x0B;
const DATA_SECTION_LEN_OFFSET: usize = 0x35;
const VAR_HEADER_MARKER_OFFSET: usize = 0x37;
const VAR_LEN_OFFSET: usize = 0x39;
const TYPE_OFFSET: usize = 0x3B;
const NAME_OFFSET: usize = 0x3C;
const FLAG_OFFSET: usize = 0x45;
const VAR_LEN_COPY_OFFSET: usize = 0x46;
const DATA_LEN_OFFSET: usize = 0x48;

/// Bytes the variable entry adds on top of the payload in the data section.
const VAR_ENTRY_OVERHEAD: usize = 19;

/// Builder for the 0x4A byte file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarFileHeader {
    bytes: [u8; HEADER_SIZE],
}

impl Default for VarFileHeader {
    fn default() -> Self {
        Self::new()
    }
}

impl VarFileHeader {
    pub fn new() -> Self {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[..MAGIC.len()].copy_from_slice(&MAGIC);
        bytes[VAR_HEADER_MARKER_OFFSET] = 0x0D;
        bytes[VAR_HEADER_MARKER_OFFSET + 1] = 0x00;
        bytes[TYPE_OFFSET] = APPVAR_TYPE;
        Self { bytes }
    }

    /// Comment text, truncated to 42 bytes and zero padded.
    pub fn comment(mut self, comment: &str) -> Self {
        let field = &mut self.bytes[COMMENT_OFFSET..COMMENT_OFFSET + COMMENT_LEN];
        field.fill(0);
        let len = comment.len().min(COMMENT_LEN);
        field[..len].copy_from_slice(&comment.as_bytes()[..len]);
        self
    }

    /// Variable name, truncated to 8 bytes and zero padded.
    pub fn name(mut self, name: &str) -> Self {
        let field = &mut self.bytes[NAME_OFFSET..NAME_OFFSET + NAME_LEN];
        field.fill(0);
        let len = name.len().min(NAME_LEN);
        field[..len].copy_from_slice(&name.as_bytes()[..len]);
        self
    }

    pub fn archived(mut self, archived: bool) -> Self {
        self.bytes[FLAG_OFFSET] = if archived { ARCHIVE_FLAG } else { 0 };
        self
    }

    /// Fill the four size fields for a payload of `size` bytes.
    pub fn data_size(mut self, size: u16) -> Self {
        let size = size as usize;
        self.put_u16(DATA_SECTION_LEN_OFFSET, size + VAR_ENTRY_OVERHEAD);
        self.put_u16(VAR_LEN_OFFSET, size + 2);
        self.put_u16(VAR_LEN_COPY_OFFSET, size + 2);
        self.put_u16(DATA_LEN_OFFSET, size);
        self
    }

    fn put_u16(&mut self, offset: usize, value: usize) {
        self.bytes[offset..offset + 2].copy_from_slice(&(value as u16).to_le_bytes());
    }

    pub fn as_bytes(&self) -> &[u8; HEADER_SIZE] {
        &self.bytes
    }
}

/// Sum of every byte from the variable header marker to the end of `file`,
/// which must not include the checksum itself.
pub fn checksum(file: &[u8]) -> u16 {
    file.iter().skip(CHECKSUM_START).fold(0u16, |sum, &b| sum.wrapping_add(b as u16))
}
