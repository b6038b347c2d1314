use crate::errors::{AppError, Result};
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::Read;

/// Chromosome-name normalization applied while indexing FASTA headers,
/// so reference names line up with the naming convention of the
/// alignment input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameStyle {
    AsIs,
    AddChrPrefix,
    StripChrPrefix,
}

impl NameStyle {
    fn apply(self, name: &str) -> String {
        match self {
            Self::AsIs => name.to_string(),
            Self::AddChrPrefix => {
                if name.starts_with("chr") {
                    name.to_string()
                } else {
                    format!("chr{name}")
                }
            }
            Self::StripChrPrefix => name.strip_prefix("chr").unwrap_or(name).to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChromosomeOffset {
    pub name: String,
    pub offset: usize,
}

/// Sorted mapping from chromosome name to the byte offset of the first
/// sequence byte after its FASTA header line. Built in one scan.
#[derive(Debug, Default)]
pub struct ReferenceIndex {
    entries: Vec<ChromosomeOffset>,
}

impl ReferenceIndex {
    pub fn build(data: &[u8], style: NameStyle) -> Self {
        let mut entries = Vec::new();
        let mut cursor = 0usize;
        while cursor < data.len() {
            let line_start = cursor;
            while cursor < data.len() && data[cursor] != b'\n' {
                cursor += 1;
            }
            let line = &data[line_start..cursor];
            if cursor < data.len() {
                cursor += 1;
            }
            if line.first() == Some(&b'>') {
                entries.push(ChromosomeOffset {
                    name: header_name(line, style),
                    offset: cursor,
                });
            }
        }
        entries.sort_by(|left, right| left.name.cmp(&right.name));
        Self { entries }
    }

    pub fn lookup(&self, name: &str) -> Result<usize> {
        self.entries
            .binary_search_by(|entry| entry.name.as_str().cmp(name))
            .map(|found| self.entries[found].offset)
            .map_err(|_| AppError::UnknownChromosome {
                name: name.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn header_name(line: &[u8], style: NameStyle) -> String {
    let end = line[1..]
        .iter()
        .position(|byte| byte.is_ascii_whitespace())
        .map_or(line.len(), |found| found + 1);
    let raw = String::from_utf8_lossy(&line[1..end]);
    style.apply(&raw)
}

/// An O(1) random-access view of the reference with a sequential line
/// cursor. The whole file is held in memory (gzip inputs are inflated
/// up front) so chromosome seeks are plain offset jumps.
pub struct ReferenceReader {
    data: Vec<u8>,
    cursor: usize,
    index: ReferenceIndex,
}

impl ReferenceReader {
    pub fn open(path: &str, style: NameStyle) -> Result<Self> {
        let open_failed = |source: std::io::Error| AppError::OpenFailed {
            path: path.to_string(),
            source,
        };

        let data = if path.ends_with(".gz") {
            let file = File::open(path).map_err(open_failed)?;
            let mut decoder = GzDecoder::new(file);
            let mut data = Vec::new();
            decoder.read_to_end(&mut data).map_err(open_failed)?;
            data
        } else {
            std::fs::read(path).map_err(open_failed)?
        };
        Ok(Self::from_bytes(data, style))
    }

    pub fn from_bytes(data: Vec<u8>, style: NameStyle) -> Self {
        let index = ReferenceIndex::build(&data, style);
        Self {
            data,
            cursor: 0,
            index,
        }
    }

    pub fn index(&self) -> &ReferenceIndex {
        &self.index
    }

    pub fn seek_to_chromosome(&mut self, name: &str) -> Result<()> {
        self.cursor = self.index.lookup(name)?;
        Ok(())
    }

    /// Copies the next line (newline stripped, CRLF tolerated) into
    /// `buffer`. Returns false at end of data.
    pub fn read_line_into(&mut self, buffer: &mut Vec<u8>) -> bool {
        buffer.clear();
        if self.cursor >= self.data.len() {
            return false;
        }
        let line_start = self.cursor;
        while self.cursor < self.data.len() && self.data[self.cursor] != b'\n' {
            self.cursor += 1;
        }
        let mut line_end = self.cursor;
        if self.cursor < self.data.len() {
            self.cursor += 1;
        }
        if line_end > line_start && self.data[line_end - 1] == b'\r' {
            line_end -= 1;
        }
        buffer.extend_from_slice(&self.data[line_start..line_end]);
        true
    }
}
