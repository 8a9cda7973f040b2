//! Streaming section scanner for mysqldump output.
//!
//! mysqldump demarcates logical sections with two-line comment banners:
//! a bare `--` line immediately followed by a marker comment naming what
//! comes next. The scanner performs a single forward pass over the stream
//! and yields one [`Section`] per run of lines, holding back at most one
//! line while it checks whether a `--` opens a banner. Section content is
//! consume-once: concatenating every line of every section reproduces the
//! input byte-for-byte.

use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read};

use crate::error::SplitError;

pub const SCAN_BUFFER_SIZE: usize = 64 * 1024;

/// The closed set of section kinds a dump stream is divided into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    Header,
    ReplicationInfo,
    Schema,
    SchemaRoutines,
    SchemaEvents,
    TableDefinition,
    TableData,
    ViewDefinition,
    ViewTemporaryDefinition,
    Other,
}

impl SectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SectionKind::Header => "header",
            SectionKind::ReplicationInfo => "replication_info",
            SectionKind::Schema => "schema",
            SectionKind::SchemaRoutines => "schema_routines",
            SectionKind::SchemaEvents => "schema_events",
            SectionKind::TableDefinition => "table_definition",
            SectionKind::TableData => "table_data",
            SectionKind::ViewDefinition => "view_definition",
            SectionKind::ViewTemporaryDefinition => "view_temporary_definition",
            SectionKind::Other => "other",
        }
    }
}

impl std::fmt::Display for SectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a comment line as a section-opening marker.
///
/// Only called for the line following a bare `--`; anything unrecognized
/// extends the currently open section instead of starting a new one.
fn classify_marker(line: &[u8]) -> Option<SectionKind> {
    let line = trim_newline(line);
    let rest = line.strip_prefix(b"-- ")?;

    if rest.starts_with(b"Current Database: ") {
        Some(SectionKind::Schema)
    } else if rest.starts_with(b"Table structure for table ") {
        Some(SectionKind::TableDefinition)
    } else if rest.starts_with(b"Dumping data for table ") {
        Some(SectionKind::TableData)
    } else if rest.starts_with(b"Temporary table structure for view ")
        || rest.starts_with(b"Temporary view structure for view ")
    {
        Some(SectionKind::ViewTemporaryDefinition)
    } else if rest.starts_with(b"Final view structure for view ") {
        Some(SectionKind::ViewDefinition)
    } else if rest.starts_with(b"Dumping routines for database ") {
        Some(SectionKind::SchemaRoutines)
    } else if rest.starts_with(b"Dumping events for database ") {
        Some(SectionKind::SchemaEvents)
    } else if rest.starts_with(b"Position to start replication or point-in-time recovery from") {
        Some(SectionKind::ReplicationInfo)
    } else if rest.starts_with(b"GTID state at the beginning of the backup") {
        Some(SectionKind::Other)
    } else {
        None
    }
}

fn trim_newline(line: &[u8]) -> &[u8] {
    let mut end = line.len();
    while end > 0 && (line[end - 1] == b'\n' || line[end - 1] == b'\r') {
        end -= 1;
    }
    &line[..end]
}

fn is_banner_dash(line: &[u8]) -> bool {
    trim_newline(line) == b"--"
}

/// Return the first backtick-quoted name embedded in a marker comment line,
/// unescaped. A literal backtick inside a name is doubled in the source.
pub fn extract_identifier(line: &[u8]) -> Result<String, SplitError> {
    let malformed = || SplitError::MalformedIdentifier {
        line: String::from_utf8_lossy(trim_newline(line)).into_owned(),
    };

    let start = line
        .iter()
        .position(|&b| b == b'`')
        .ok_or_else(malformed)?;
    let mut name = Vec::new();
    let mut i = start + 1;
    while i < line.len() {
        if line[i] == b'`' {
            if line.get(i + 1) == Some(&b'`') {
                name.push(b'`');
                i += 2;
                continue;
            }
            return Ok(String::from_utf8_lossy(&name).into_owned());
        }
        name.push(line[i]);
        i += 1;
    }
    Err(malformed())
}

/// Single-pass scanner producing typed sections from a dump stream.
pub struct SectionScanner<R: Read> {
    reader: BufReader<R>,
    /// Banner lines already read that open the next section.
    opening: VecDeque<Vec<u8>>,
    pending_kind: Option<SectionKind>,
    /// Line read past the cursor while checking for a marker banner.
    holdback: Option<Vec<u8>>,
    in_section: bool,
    started: bool,
    eof: bool,
}

impl<R: Read> SectionScanner<R> {
    pub fn new(input: R) -> Self {
        Self {
            reader: BufReader::with_capacity(SCAN_BUFFER_SIZE, input),
            opening: VecDeque::new(),
            pending_kind: None,
            holdback: None,
            in_section: false,
            started: false,
            eof: false,
        }
    }

    /// Advance to the next section. Unread lines of the current section are
    /// drained first, so the scan never rewinds or stalls.
    pub fn next_section(&mut self) -> std::io::Result<Option<Section<'_, R>>> {
        while self.section_line()?.is_some() {}

        if let Some(kind) = self.pending_kind.take() {
            self.in_section = true;
            return Ok(Some(Section {
                kind,
                scanner: self,
            }));
        }
        if self.eof {
            return Ok(None);
        }
        if !self.started {
            // Everything before the first marker banner is the dump header.
            self.started = true;
            self.in_section = true;
            return Ok(Some(Section {
                kind: SectionKind::Header,
                scanner: self,
            }));
        }
        Ok(None)
    }

    /// Next line of the currently open section, or `None` at its end.
    fn section_line(&mut self) -> std::io::Result<Option<Vec<u8>>> {
        if !self.in_section {
            return Ok(None);
        }
        if let Some(line) = self.opening.pop_front() {
            return Ok(Some(line));
        }
        let Some(line) = self.next_raw()? else {
            self.in_section = false;
            self.eof = true;
            return Ok(None);
        };
        if is_banner_dash(&line) {
            match self.next_raw()? {
                Some(next) => {
                    if let Some(kind) = classify_marker(&next) {
                        self.pending_kind = Some(kind);
                        self.opening.push_back(line);
                        self.opening.push_back(next);
                        self.in_section = false;
                        return Ok(None);
                    }
                    self.holdback = Some(next);
                }
                None => self.eof = true,
            }
        }
        Ok(Some(line))
    }

    fn next_raw(&mut self) -> std::io::Result<Option<Vec<u8>>> {
        if let Some(line) = self.holdback.take() {
            return Ok(Some(line));
        }
        let mut line = Vec::new();
        let n = self.reader.read_until(b'\n', &mut line)?;
        if n == 0 {
            Ok(None)
        } else {
            Ok(Some(line))
        }
    }
}

/// One contiguous typed run of lines. Forward-only; lines are consumed
/// exactly once and the underlying scanner cannot produce the next section
/// until this one is exhausted or dropped.
pub struct Section<'s, R: Read> {
    kind: SectionKind,
    scanner: &'s mut SectionScanner<R>,
}

impl<R: Read> Section<'_, R> {
    pub fn kind(&self) -> SectionKind {
        self.kind
    }

    /// Pull the next line, newline included, or `None` at section end.
    pub fn next_line(&mut self) -> std::io::Result<Option<Vec<u8>>> {
        self.scanner.section_line()
    }

    /// Exhaust the section into a list of lines.
    pub fn collect_lines(&mut self) -> std::io::Result<Vec<Vec<u8>>> {
        let mut lines = Vec::new();
        while let Some(line) = self.next_line()? {
            lines.push(line);
        }
        Ok(lines)
    }

    /// Exhaust the section into one string (lossy on invalid UTF-8).
    pub fn materialize(&mut self) -> std::io::Result<String> {
        let mut content = String::new();
        while let Some(line) = self.next_line()? {
            content.push_str(&String::from_utf8_lossy(&line));
        }
        Ok(content)
    }

    /// Read the section to completion, discarding lines. Returns the number
    /// of lines skipped.
    pub fn drain(&mut self) -> std::io::Result<u64> {
        let mut skipped = 0;
        while self.next_line()?.is_some() {
            skipped += 1;
        }
        Ok(skipped)
    }
}
