//! tagwire - Inspect Protocol Buffer wire-format payloads
//!
//! This tool parses files containing serialized protobuf payloads and
//! renders their wire structure without requiring a schema. Length-delimited
//! payloads that themselves parse as well-formed field streams are shown as
//! nested messages.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, ValueEnum};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tagwire_core::wire::{WireReader, WireType};
use tracing::{debug, info, trace, warn, Level};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

/// Inspect Protocol Buffer wire-format payloads
#[derive(Parser, Debug)]
#[command(name = "tagwire")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    input: InputMode,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Output format
    #[arg(long, value_enum, default_value = "tree")]
    format: OutputFormat,

    /// Maximum nesting depth to descend into length-delimited payloads
    #[arg(long, default_value = "8")]
    max_depth: usize,

    /// Skip payloads whose content was already seen
    #[arg(long)]
    dedup: bool,

    /// Only list parseable files without dumping their structure
    #[arg(long)]
    list_only: bool,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct InputMode {
    /// Path to a single payload file to inspect
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Path to a directory of payload files to process
    #[arg(short, long)]
    directory: Option<PathBuf>,
}

/// Output format for inspected payloads
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Indented field tree with speculative nested-message descent
    Tree,
    /// One line per file: field count and wire-type histogram
    Summary,
}

/// Tracks seen payloads for deduplication
#[derive(Default)]
struct PayloadRegistry {
    /// Content hash -> path of the first occurrence
    seen: HashMap<String, PathBuf>,
    duplicates_skipped: usize,
}

impl PayloadRegistry {
    fn new() -> Self {
        Self::default()
    }

    /// Compute a short hash of the content (first 16 chars of blake3)
    fn content_hash(data: &[u8]) -> String {
        blake3::hash(data).to_hex()[..16].to_string()
    }

    /// Record the payload; returns false if this exact content was seen before
    fn register(&mut self, data: &[u8], path: &Path) -> bool {
        let hash = Self::content_hash(data);
        if let Some(first) = self.seen.get(&hash) {
            debug!(
                "Skipping duplicate payload {} (same content as {})",
                path.display(),
                first.display()
            );
            self.duplicates_skipped += 1;
            return false;
        }
        self.seen.insert(hash, path.to_path_buf());
        true
    }
}

/// One parsed wire field, with nested descent already applied
struct ParsedField {
    index: u32,
    rendering: Rendering,
}

enum Rendering {
    Varint(u64),
    Fixed32(u32),
    Fixed64(u64),
    /// A length-delimited payload that did not parse as a nested message
    Leaf(Vec<u8>),
    /// A length-delimited payload or group whose content parsed as fields
    Nested {
        kind: NestedKind,
        fields: Vec<ParsedField>,
    },
}

#[derive(Clone, Copy, PartialEq)]
enum NestedKind {
    Message,
    Group,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .init();

    if let Some(ref file) = cli.input.file {
        process_single_file(&cli, file)
    } else if let Some(ref directory) = cli.input.directory {
        process_directory(&cli, directory)
    } else {
        bail!("Either --file or --directory must be specified")
    }
}

/// Process a single payload file
fn process_single_file(cli: &Cli, file: &Path) -> Result<()> {
    if !file.exists() {
        bail!("Input file does not exist: {}", file.display());
    }
    if !file.is_file() {
        bail!("Input path is not a file: {}", file.display());
    }

    let mut registry = PayloadRegistry::new();
    process_payload(cli, file, &mut registry)
}

/// Process a directory of payload files recursively
fn process_directory(cli: &Cli, directory: &Path) -> Result<()> {
    if !directory.exists() {
        bail!("Directory does not exist: {}", directory.display());
    }
    if !directory.is_dir() {
        bail!("Path is not a directory: {}", directory.display());
    }

    info!("Scanning directory: {}", directory.display());

    let mut registry = PayloadRegistry::new();
    let mut files_processed = 0;

    for entry in WalkDir::new(directory)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();

        if !path.is_file() {
            continue;
        }

        // Skip hidden files
        if path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with('.'))
            .unwrap_or(false)
        {
            continue;
        }

        debug!("Processing payload: {}", path.display());
        if let Err(e) = process_payload(cli, path, &mut registry) {
            // Log error but continue with other files
            warn!("Error processing {}: {}", path.display(), e);
        }
        files_processed += 1;
    }

    info!(
        "Processed {} files, {} duplicates skipped",
        files_processed, registry.duplicates_skipped
    );

    Ok(())
}

/// Parse one payload file and render it
fn process_payload(cli: &Cli, path: &Path, registry: &mut PayloadRegistry) -> Result<()> {
    trace!("Reading {}", path.display());
    let data = fs::read(path)
        .with_context(|| format!("Failed to read input file: {}", path.display()))?;

    if cli.dedup && !registry.register(&data, path) {
        return Ok(());
    }

    let Some(fields) = parse_fields(&data, cli.max_depth) else {
        trace!("Not a well-formed wire stream: {}", path.display());
        return Ok(());
    };

    if cli.list_only {
        println!("{}", path.display());
        return Ok(());
    }

    match cli.format {
        OutputFormat::Tree => {
            println!("{} ({} bytes)", path.display(), data.len());
            for field in &fields {
                print_field(field, 1);
            }
        }
        OutputFormat::Summary => {
            println!("{}: {}", path.display(), summarize(&fields));
        }
    }

    Ok(())
}

/// Parses a complete byte slice as a field stream.
///
/// Returns `None` unless every field parses and the stream ends exactly at
/// the last byte, so arbitrary non-protobuf data is rejected rather than
/// half-rendered.
fn parse_fields(data: &[u8], max_depth: usize) -> Option<Vec<ParsedField>> {
    if data.is_empty() {
        return None;
    }
    let mut reader = WireReader::new(data);
    let fields = parse_stream(&mut reader, None, max_depth)?;
    if fields.is_empty() {
        return None;
    }
    Some(fields)
}

/// Parses fields until end of input, or until the end tag of `group_index`
fn parse_stream(
    reader: &mut WireReader<'_>,
    group_index: Option<u32>,
    depth_left: usize,
) -> Option<Vec<ParsedField>> {
    let mut fields = Vec::new();

    loop {
        let tag = reader.read_tag().ok()?;
        let Some((index, wire)) = tag else {
            // Clean end of input closes the stream, but never an open group
            return if group_index.is_none() {
                Some(fields)
            } else {
                None
            };
        };

        let rendering = match wire {
            WireType::Varint => Rendering::Varint(reader.read_varint().ok()?),
            WireType::Fixed32 => Rendering::Fixed32(reader.read_fixed32().ok()?),
            WireType::Fixed64 => Rendering::Fixed64(reader.read_fixed64().ok()?),
            WireType::Len => {
                let payload = reader.read_len_delimited().ok()?;
                render_len_payload(payload, depth_left)
            }
            WireType::StartGroup => {
                if depth_left == 0 {
                    return None;
                }
                let nested = parse_stream(reader, Some(index), depth_left - 1)?;
                Rendering::Nested {
                    kind: NestedKind::Group,
                    fields: nested,
                }
            }
            WireType::EndGroup => {
                return if group_index == Some(index) {
                    Some(fields)
                } else {
                    None
                };
            }
        };

        fields.push(ParsedField { index, rendering });
    }
}

/// Decides whether a length-delimited payload is worth showing as a nested
/// message. Printable text stays a leaf: short strings like "hi" also
/// happen to parse as valid field streams, and the string reading is
/// almost always the right one. Everything else must parse completely as a
/// field stream within the remaining depth budget to earn a descent.
fn render_len_payload(payload: &[u8], depth_left: usize) -> Rendering {
    if !is_printable_text(payload) && depth_left > 0 {
        if let Some(fields) = parse_fields(payload, depth_left - 1) {
            return Rendering::Nested {
                kind: NestedKind::Message,
                fields,
            };
        }
    }
    Rendering::Leaf(payload.to_vec())
}

/// Non-empty, valid UTF-8, and free of control characters
fn is_printable_text(bytes: &[u8]) -> bool {
    match std::str::from_utf8(bytes) {
        Ok(text) => !text.is_empty() && text.chars().all(|c| !c.is_control()),
        Err(_) => false,
    }
}

fn print_field(field: &ParsedField, depth: usize) {
    let pad = "  ".repeat(depth);
    match &field.rendering {
        Rendering::Varint(v) => println!("{pad}{}: varint {v}", field.index),
        Rendering::Fixed32(v) => println!("{pad}{}: fixed32 {v} (0x{v:08X})", field.index),
        Rendering::Fixed64(v) => println!("{pad}{}: fixed64 {v} (0x{v:016X})", field.index),
        Rendering::Leaf(bytes) => {
            println!("{pad}{}: {}", field.index, leaf_preview(bytes));
        }
        Rendering::Nested { kind, fields } => {
            let label = match kind {
                NestedKind::Message => "message",
                NestedKind::Group => "group",
            };
            println!("{pad}{}: {label} {{", field.index);
            for nested in fields {
                print_field(nested, depth + 1);
            }
            println!("{pad}}}");
        }
    }
}

/// Renders a leaf payload as a quoted string when printable, hex otherwise
fn leaf_preview(bytes: &[u8]) -> String {
    const PREVIEW_LIMIT: usize = 64;

    if let Ok(text) = std::str::from_utf8(bytes) {
        if is_printable_text(bytes) {
            if text.chars().count() > PREVIEW_LIMIT {
                let head: String = text.chars().take(PREVIEW_LIMIT).collect();
                return format!("string {head:?}… ({} bytes)", text.len());
            }
            return format!("string {text:?}");
        }
    }

    let shown: Vec<String> = bytes
        .iter()
        .take(PREVIEW_LIMIT)
        .map(|b| format!("{b:02x}"))
        .collect();
    if bytes.len() > PREVIEW_LIMIT {
        format!("bytes {}… ({} bytes)", shown.join(" "), bytes.len())
    } else {
        format!("bytes {} ({} bytes)", shown.join(" "), bytes.len())
    }
}

/// One-line histogram of top-level field kinds
fn summarize(fields: &[ParsedField]) -> String {
    let mut varints = 0usize;
    let mut fixed = 0usize;
    let mut leaves = 0usize;
    let mut nested = 0usize;

    for field in fields {
        match field.rendering {
            Rendering::Varint(_) => varints += 1,
            Rendering::Fixed32(_) | Rendering::Fixed64(_) => fixed += 1,
            Rendering::Leaf(_) => leaves += 1,
            Rendering::Nested { .. } => nested += 1,
        }
    }

    format!(
        "{} fields ({} varint, {} fixed, {} bytes/string, {} nested)",
        fields.len(),
        varints,
        fixed,
        leaves,
        nested
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_stream() {
        // field 1 varint 150, field 2 string "hi"
        let data = [0x08, 0x96, 0x01, 0x12, 0x02, b'h', b'i'];
        let fields = parse_fields(&data, 4).unwrap();
        assert_eq!(fields.len(), 2);
        assert!(matches!(fields[0].rendering, Rendering::Varint(150)));
        assert!(matches!(fields[1].rendering, Rendering::Leaf(_)));
    }

    #[test]
    fn test_printable_payload_stays_a_leaf() {
        // "hi" also parses as field 13 varint 105, but the text reading wins
        let data = [0x12, 0x02, b'h', b'i'];
        let fields = parse_fields(&data, 4).unwrap();
        assert_eq!(fields.len(), 1);
        assert!(matches!(&fields[0].rendering, Rendering::Leaf(b) if b == b"hi"));
    }

    #[test]
    fn test_control_bytes_are_not_printable() {
        assert!(is_printable_text(b"hello"));
        assert!(!is_printable_text(&[0x08, 0x01]));
        assert!(!is_printable_text(&[0xFF]));
        assert!(!is_printable_text(b""));
    }

    #[test]
    fn test_nested_message_descent() {
        // field 1 is a length-delimited payload holding field 1 varint 1
        let data = [0x0A, 0x02, 0x08, 0x01];
        let fields = parse_fields(&data, 4).unwrap();
        assert_eq!(fields.len(), 1);
        let Rendering::Nested { kind, fields: inner } = &fields[0].rendering else {
            panic!("expected nested rendering");
        };
        assert!(*kind == NestedKind::Message);
        assert_eq!(inner.len(), 1);
    }

    #[test]
    fn test_depth_limit_stops_descent() {
        let data = [0x0A, 0x02, 0x08, 0x01];
        let fields = parse_fields(&data, 0).unwrap();
        // No budget for descent, so the payload stays a leaf
        assert!(matches!(fields[0].rendering, Rendering::Leaf(_)));
    }

    #[test]
    fn test_group_parses_as_nested() {
        // group at 3 with varint at 1, then the end tag
        let data = [0x1B, 0x08, 0x2A, 0x1C];
        let fields = parse_fields(&data, 4).unwrap();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].index, 3);
        assert!(matches!(
            fields[0].rendering,
            Rendering::Nested {
                kind: NestedKind::Group,
                ..
            }
        ));
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(parse_fields(b"hello world, not protobuf!", 4).is_none());
        assert!(parse_fields(&[], 4).is_none());
        // Truncated length-delimited field
        assert!(parse_fields(&[0x0A, 0x05, 0x01], 4).is_none());
        // Unterminated group
        assert!(parse_fields(&[0x1B, 0x08, 0x01], 4).is_none());
    }

    #[test]
    fn test_leaf_preview_string_vs_bytes() {
        assert_eq!(leaf_preview(b"hello"), "string \"hello\"");
        assert_eq!(leaf_preview(&[0x00, 0xFF]), "bytes 00 ff (2 bytes)");
    }

    #[test]
    fn test_summarize_counts() {
        let data = [0x08, 0x01, 0x15, 0, 0, 0, 0, 0x1A, 0x01, 0xFF];
        let fields = parse_fields(&data, 4).unwrap();
        assert_eq!(
            summarize(&fields),
            "3 fields (1 varint, 1 fixed, 1 bytes/string, 0 nested)"
        );
    }

    #[test]
    fn test_registry_dedup() {
        let mut registry = PayloadRegistry::new();
        assert!(registry.register(b"payload", Path::new("/a")));
        assert!(!registry.register(b"payload", Path::new("/b")));
        assert!(registry.register(b"other", Path::new("/c")));
        assert_eq!(registry.duplicates_skipped, 1);
    }

    #[test]
    fn test_process_payload_reads_file() {
        use tempfile::TempDir;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("payload.bin");
        fs::write(&path, [0x08, 0x96, 0x01]).unwrap();

        let cli = Cli::parse_from(["tagwire", "--file", path.to_str().unwrap(), "--dedup"]);
        let mut registry = PayloadRegistry::new();
        process_payload(&cli, &path, &mut registry).unwrap();

        // Same content again is deduplicated, not re-rendered
        let copy = dir.path().join("copy.bin");
        fs::write(&copy, [0x08, 0x96, 0x01]).unwrap();
        process_payload(&cli, &copy, &mut registry).unwrap();
        assert_eq!(registry.duplicates_skipped, 1);
    }

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
