//! Dispatch orchestrator: drives the section scanner over a dump stream and
//! routes every section to its output file.
//!
//! The orchestrator owns the only mutable cross-section state of a run: the
//! reusable header block, the current database name, and the single-slot
//! hand-off of a deferred index statement from a table definition to the
//! data section that follows it.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use ahash::AHashSet;
use anyhow::Context;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::defer::{extract_create_table, split_indexes};
use crate::error::SplitError;
use crate::scanner::{extract_identifier, Section, SectionKind, SectionScanner};
use crate::writer::{filter_extension, FilterWriter};

/// Comment lines introducing a table data section before the INSERT stream.
const DATA_PREFIX_LINES: usize = 3;

/// Schema name embedded in the header of a single-database dump
/// ("-- Host: localhost    Database: sakila").
static HEADER_DATABASE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)Database: (\S+)").unwrap());

/// Compression format detected from file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Bzip2,
    Xz,
    Zstd,
}

impl Compression {
    /// Detect compression format from file extension
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());

        match ext.as_deref() {
            Some("gz" | "gzip") => Compression::Gzip,
            Some("bz2" | "bzip2") => Compression::Bzip2,
            Some("xz" | "lzma") => Compression::Xz,
            Some("zst" | "zstd") => Compression::Zstd,
            _ => Compression::None,
        }
    }

    /// Wrap a reader with the appropriate decompressor
    pub fn wrap_reader<'a>(
        &self,
        reader: Box<dyn Read + 'a>,
    ) -> std::io::Result<Box<dyn Read + 'a>> {
        Ok(match self {
            Compression::None => reader,
            Compression::Gzip => Box::new(flate2::read::GzDecoder::new(reader)),
            Compression::Bzip2 => Box::new(bzip2::read::BzDecoder::new(reader)),
            Compression::Xz => Box::new(xz2::read::XzDecoder::new(reader)),
            Compression::Zstd => Box::new(zstd::stream::read::Decoder::new(reader)?),
        })
    }
}

impl std::fmt::Display for Compression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Compression::None => write!(f, "none"),
            Compression::Gzip => write!(f, "gzip"),
            Compression::Bzip2 => write!(f, "bzip2"),
            Compression::Xz => write!(f, "xz"),
            Compression::Zstd => write!(f, "zstd"),
        }
    }
}

/// MySQL version the split output is targeted at. Decides whether secondary
/// indexes, and additionally foreign key constraints, are deferred past the
/// bulk load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpTarget {
    MySql55,
    MySql56,
    MySql57,
    Unknown,
}

impl DumpTarget {
    pub fn parse(version: &str) -> Self {
        match version {
            "5.5" => DumpTarget::MySql55,
            "5.6" => DumpTarget::MySql56,
            "5.7" => DumpTarget::MySql57,
            _ => DumpTarget::Unknown,
        }
    }

    pub fn defer_indexes(&self) -> bool {
        !matches!(self, DumpTarget::Unknown)
    }

    /// Deferring foreign keys needs a server that tolerates adding them
    /// after load; 5.5 does not.
    pub fn defer_constraints(&self) -> bool {
        matches!(self, DumpTarget::MySql56 | DumpTarget::MySql57)
    }
}

#[derive(Debug, Default, Clone)]
pub struct Stats {
    pub databases: usize,
    pub tables: usize,
    pub views: usize,
    pub sections: u64,
}

/// Index statement waiting to be appended to its table's data file.
struct DeferredDdl {
    table: String,
    statement: String,
}

/// Mutable state threaded through one run.
#[derive(Default)]
struct DumpContext {
    /// Header block re-emitted at the top of every written file.
    header: Option<String>,
    /// Database the current sections belong to.
    schema: Option<String>,
    deferred: Option<DeferredDdl>,
    /// views.sql paths already truncated this run.
    truncated_views: AHashSet<PathBuf>,
}

pub struct DumpSplitter {
    output_dir: PathBuf,
    target: DumpTarget,
    filter_command: String,
    include: Option<Regex>,
}

impl DumpSplitter {
    pub fn new(output_dir: PathBuf) -> Self {
        Self {
            output_dir,
            target: DumpTarget::MySql55,
            filter_command: "gzip -1".to_string(),
            include: None,
        }
    }

    pub fn with_target(mut self, target: DumpTarget) -> Self {
        self.target = target;
        self
    }

    pub fn with_filter_command(mut self, command: impl Into<String>) -> Self {
        self.filter_command = command.into();
        self
    }

    /// Only output paths (relative to the output root) matching `pattern`
    /// are written; everything else is drained and discarded.
    pub fn with_include(mut self, pattern: Regex) -> Self {
        self.include = Some(pattern);
        self
    }

    /// Run the split over `input`, one forward pass, section by section.
    pub fn split<R: Read>(&self, input: R) -> anyhow::Result<Stats> {
        let mut scanner = SectionScanner::new(input);
        let mut ctx = DumpContext::default();
        let mut stats = Stats::default();

        while let Some(mut section) = scanner.next_section()? {
            stats.sections += 1;
            let kind = section.kind();
            debug!(kind = %kind, "section");
            match kind {
                SectionKind::Header => self.handle_header(&mut section, &mut ctx, &mut stats)?,
                SectionKind::Schema => self.handle_schema(&mut section, &mut ctx, &mut stats)?,
                SectionKind::SchemaRoutines => {
                    self.handle_schema_file(&mut section, &ctx, "routines.sql")?
                }
                SectionKind::SchemaEvents => {
                    self.handle_schema_file(&mut section, &ctx, "events.sql")?
                }
                SectionKind::TableDefinition => {
                    self.handle_table_definition(&mut section, &mut ctx, &mut stats)?
                }
                SectionKind::TableData => {
                    self.handle_table_data(&mut section, &mut ctx)?
                }
                SectionKind::ViewDefinition | SectionKind::ViewTemporaryDefinition => {
                    self.handle_view(&mut section, &mut ctx, &mut stats)?
                }
                SectionKind::ReplicationInfo => {
                    self.handle_replication_info(&mut section, &ctx)?
                }
                SectionKind::Other => {
                    let skipped = section.drain()?;
                    debug!(kind = %kind, lines = skipped, "skipping section");
                }
            }
        }

        if let Some(leftover) = ctx.deferred.take() {
            warn!(
                table = %leftover.table,
                "deferred index statement was never attached to a data section"
            );
        }

        Ok(stats)
    }

    fn included(&self, rel: &str) -> bool {
        self.include.as_ref().map_or(true, |re| re.is_match(rel))
    }

    fn full_path(&self, rel: &str) -> PathBuf {
        self.output_dir
            .join(format!("{rel}{}", filter_extension(&self.filter_command)))
    }

    /// Open a writer for `rel` unless the include pattern rejects it.
    fn open_writer(&self, rel: &str) -> Result<Option<FilterWriter>, SplitError> {
        if !self.included(rel) {
            debug!(path = rel, "no pattern match, draining");
            return Ok(None);
        }
        FilterWriter::create(&self.filter_command, &self.full_path(rel)).map(Some)
    }

    fn current_schema<'c>(&self, ctx: &'c DumpContext, kind: &str) -> anyhow::Result<&'c str> {
        ctx.schema
            .as_deref()
            .with_context(|| format!("{kind} section outside any database scope"))
    }

    fn handle_header(
        &self,
        section: &mut Section<'_, impl Read>,
        ctx: &mut DumpContext,
        stats: &mut Stats,
    ) -> anyhow::Result<()> {
        let header = section.materialize()?;
        if let Some(name) = HEADER_DATABASE_RE
            .captures(&header)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
        {
            if self.included(&name) {
                fs::create_dir_all(self.output_dir.join(&name)).map_err(|source| {
                    SplitError::OutputIo {
                        path: self.output_dir.join(&name),
                        source,
                    }
                })?;
                stats.databases += 1;
            }
            ctx.schema = Some(name);
        }
        ctx.header = Some(header);
        Ok(())
    }

    fn handle_schema(
        &self,
        section: &mut Section<'_, impl Read>,
        ctx: &mut DumpContext,
        stats: &mut Stats,
    ) -> anyhow::Result<()> {
        let lines = section.collect_lines()?;
        let marker = lines.get(1).context("truncated database section")?;
        let name = extract_identifier(marker)?;

        if self.included(&name) {
            fs::create_dir_all(self.output_dir.join(&name)).map_err(|source| {
                SplitError::OutputIo {
                    path: self.output_dir.join(&name),
                    source,
                }
            })?;
            stats.databases += 1;
        }

        let rel = format!("{name}/create.sql");
        if let Some(mut writer) = self.open_writer(&rel)? {
            if let Some(header) = &ctx.header {
                writer.write_all(header.as_bytes())?;
            }
            for line in &lines {
                writer.write_all(line)?;
            }
            writer.finish()?;
        }
        ctx.schema = Some(name);
        Ok(())
    }

    /// routines.sql / events.sql: streamed under the current database.
    fn handle_schema_file(
        &self,
        section: &mut Section<'_, impl Read>,
        ctx: &DumpContext,
        file_name: &str,
    ) -> anyhow::Result<()> {
        let schema = self.current_schema(ctx, file_name)?;
        let rel = format!("{schema}/{file_name}");
        match self.open_writer(&rel)? {
            Some(mut writer) => {
                if let Some(header) = &ctx.header {
                    writer.write_all(header.as_bytes())?;
                }
                while let Some(line) = section.next_line()? {
                    writer.write_all(&line)?;
                }
                writer.finish()?;
            }
            None => {
                section.drain()?;
            }
        }
        Ok(())
    }

    fn handle_table_definition(
        &self,
        section: &mut Section<'_, impl Read>,
        ctx: &mut DumpContext,
        stats: &mut Stats,
    ) -> anyhow::Result<()> {
        let lines = section.collect_lines()?;
        let marker = lines.get(1).context("truncated table definition section")?;
        let table = extract_identifier(marker)?;
        let schema = self.current_schema(ctx, "table definition")?.to_string();

        let mut content = String::new();
        for line in &lines {
            content.push_str(&String::from_utf8_lossy(line));
        }

        let rel = format!("{schema}/{table}.schema.sql");
        if self.target.defer_indexes() {
            let ddl = extract_create_table(&content).map(|s| s.to_string());
            if let Some(ddl) = ddl {
                if ddl.contains("ENGINE=InnoDB") {
                    let (reduced, alter) = split_indexes(&ddl, self.target.defer_constraints())
                        .with_context(|| format!("while splitting definition of {schema}.{table}"))?;
                    if let Some(alter) = alter {
                        info!(
                            table = %format!("{schema}.{table}"),
                            "deferring {}",
                            if self.target.defer_constraints() {
                                "indexes and constraints"
                            } else {
                                "indexes"
                            }
                        );
                        if let Some(stale) = ctx.deferred.replace(DeferredDdl {
                            table: table.clone(),
                            statement: alter,
                        }) {
                            warn!(
                                table = %stale.table,
                                "replacing deferred index statement that was never consumed"
                            );
                        }
                        content = content.replacen(&ddl, &reduced, 1);
                    }
                }
            }
        }

        if let Some(mut writer) = self.open_writer(&rel)? {
            if let Some(header) = &ctx.header {
                writer.write_all(header.as_bytes())?;
            }
            writer.write_all(content.as_bytes())?;
            writer.finish()?;
            stats.tables += 1;
        }
        Ok(())
    }

    fn handle_table_data(
        &self,
        section: &mut Section<'_, impl Read>,
        ctx: &mut DumpContext,
    ) -> anyhow::Result<()> {
        let mut comments = Vec::with_capacity(DATA_PREFIX_LINES);
        for _ in 0..DATA_PREFIX_LINES {
            match section.next_line()? {
                Some(line) => comments.push(line),
                None => break,
            }
        }
        let marker = comments.get(1).context("truncated table data section")?;
        let table = extract_identifier(marker)?;
        let schema = self.current_schema(ctx, "table data")?;
        let rel = format!("{schema}/{table}.data.sql");

        // The slot is keyed: only the matching table may consume it. It is
        // cleared even when the path is excluded, since the definition that
        // produced it was drained under the same exclusion.
        let deferred = match ctx.deferred.take() {
            Some(d) if d.table == table => Some(d.statement),
            Some(d) => {
                warn!(
                    expected = %d.table,
                    found = %table,
                    "deferred index statement does not match this data section"
                );
                ctx.deferred = Some(d);
                None
            }
            None => None,
        };

        match self.open_writer(&rel)? {
            Some(mut writer) => {
                if let Some(header) = &ctx.header {
                    writer.write_all(header.as_bytes())?;
                }
                for line in &comments {
                    writer.write_all(line)?;
                }
                while let Some(line) = section.next_line()? {
                    writer.write_all(&line)?;
                }
                if let Some(statement) = &deferred {
                    info!(path = rel.as_str(), "injecting deferred index creation");
                    writer.write_all(deferred_banner().as_bytes())?;
                    writer.write_all(statement.as_bytes())?;
                    writer.write_all(b"\n")?;
                }
                writer.finish()?;
            }
            None => {
                section.drain()?;
            }
        }
        Ok(())
    }

    fn handle_view(
        &self,
        section: &mut Section<'_, impl Read>,
        ctx: &mut DumpContext,
        stats: &mut Stats,
    ) -> anyhow::Result<()> {
        let schema = self.current_schema(ctx, "view")?.to_string();
        let rel = format!("{schema}/views.sql");
        if !self.included(&rel) {
            debug!(path = rel.as_str(), "no pattern match, draining");
            section.drain()?;
            return Ok(());
        }

        let full = self.full_path(&rel);
        if ctx.truncated_views.insert(full.clone()) {
            // First view for this schema in this run: drop stale content
            // from any previous run before the appends begin.
            if let Some(parent) = full.parent() {
                fs::create_dir_all(parent).map_err(|source| SplitError::OutputIo {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
            fs::File::create(&full).map_err(|source| SplitError::OutputIo {
                path: full.clone(),
                source,
            })?;
        }

        let mut writer = FilterWriter::append(&self.filter_command, &full)?;
        while let Some(line) = section.next_line()? {
            writer.write_all(&line)?;
        }
        writer.finish()?;
        stats.views += 1;
        Ok(())
    }

    fn handle_replication_info(
        &self,
        section: &mut Section<'_, impl Read>,
        ctx: &DumpContext,
    ) -> anyhow::Result<()> {
        match self.open_writer("replication_info.sql")? {
            Some(mut writer) => {
                if let Some(header) = &ctx.header {
                    writer.write_all(header.as_bytes())?;
                }
                while let Some(line) = section.next_line()? {
                    writer.write_all(&line)?;
                }
                writer.finish()?;
            }
            None => {
                section.drain()?;
            }
        }
        Ok(())
    }
}

fn deferred_banner() -> &'static str {
    "\n--\n-- InnoDB Fast Index Creation (generated by dumpsplit)\n--\n\n"
}
