//! JSON export of the collected records.
//!
//! Layout: `{"items": [...]}`, four-space indent, `": "` after keys, keys
//! sorted at every level, non-ASCII escaped as `\uXXXX` (UTF-16, lowercase
//! hex), no trailing newline. The output is a pure function of the ordered
//! records, so two runs over the same data produce identical bytes.

use std::io::{self, Write};
use std::path::Path;

use serde::Serialize;
use serde_json::Serializer;
use serde_json::ser::{Formatter, PrettyFormatter};
use tempfile::NamedTempFile;
use tracing::info;

use crate::aggregate::{Aggregator, VideoRecord};
use crate::error::FetchError;

pub const DEFAULT_OUTPUT_PATH: &str = "ytdata.json";

const INDENT: &[u8] = b"    ";

#[derive(Serialize)]
struct ExportDocument<'a> {
    items: Vec<&'a VideoRecord>,
}

/// Pretty printer that also escapes everything outside printable ASCII.
struct AsciiPrettyFormatter<'a> {
    inner: PrettyFormatter<'a>,
}

impl AsciiPrettyFormatter<'_> {
    fn new() -> Self {
        Self {
            inner: PrettyFormatter::with_indent(INDENT),
        }
    }
}

impl Formatter for AsciiPrettyFormatter<'_> {
    fn begin_array<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.begin_array(writer)
    }

    fn end_array<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.end_array(writer)
    }

    fn begin_array_value<W: ?Sized + Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        self.inner.begin_array_value(writer, first)
    }

    fn end_array_value<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.end_array_value(writer)
    }

    fn begin_object<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.begin_object(writer)
    }

    fn end_object<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.end_object(writer)
    }

    fn begin_object_key<W: ?Sized + Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        self.inner.begin_object_key(writer, first)
    }

    fn begin_object_value<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.begin_object_value(writer)
    }

    fn end_object_value<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.end_object_value(writer)
    }

    // serde_json already escapes quotes, backslashes and control characters
    // before handing over a fragment.
    fn write_string_fragment<W: ?Sized + Write>(
        &mut self,
        writer: &mut W,
        fragment: &str,
    ) -> io::Result<()> {
        let mut start = 0;
        for (index, ch) in fragment.char_indices() {
            if ch <= '~' {
                continue;
            }
            writer.write_all(fragment[start..index].as_bytes())?;
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units) {
                write!(writer, "\\u{unit:04x}")?;
            }
            start = index + ch.len_utf8();
        }
        writer.write_all(fragment[start..].as_bytes())
    }
}

/// Serializes the records in aggregator order.
pub fn render(aggregator: &Aggregator) -> Result<Vec<u8>, FetchError> {
    let document = ExportDocument {
        items: aggregator.ordered_values(),
    };
    let mut out = Vec::new();
    let mut serializer = Serializer::with_formatter(&mut out, AsciiPrettyFormatter::new());
    document.serialize(&mut serializer)?;
    Ok(out)
}

/// Writes the export next to `path` first and moves it into place, so a
/// crash never leaves a half-written file behind.
pub fn write_export(path: &Path, aggregator: &Aggregator) -> Result<(), FetchError> {
    let payload = render(aggregator)?;
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(&payload)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|err| err.error)?;

    info!(path = %path.display(), records = aggregator.len(), "export written");
    Ok(())
}
