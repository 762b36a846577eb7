use std::collections::{BTreeMap, HashMap};

use crate::writer::LogWriter;

use super::marks::MARK_SOURCE_CODE;

/// One line of interpreter source code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLine {
    /// The number of leading whitespace characters which were stripped from `text`.
    pub indent: u8,
    pub text: String,
}

impl SourceLine {
    /// Split a raw line into its indentation and its text.
    pub fn from_raw(raw: &str) -> Self {
        let text = raw.trim_start_matches([' ', '\t']);
        let indent = u8::try_from(raw.len() - text.len()).unwrap_or(u8::MAX);
        Self {
            indent,
            text: text.trim_end_matches(['\r', '\n']).to_owned(),
        }
    }
}

/// Interpreter source lines, per file and line number.
///
/// The first line stored for a `(file, line)` pair wins; later inserts for the
/// same pair are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceLineCache {
    files: BTreeMap<String, BTreeMap<u16, SourceLine>>,
}

impl SourceLineCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a line. Returns false if the line was already present.
    pub fn insert(&mut self, file: &str, line: u16, source: SourceLine) -> bool {
        if let Some(lines) = self.files.get_mut(file) {
            if lines.contains_key(&line) {
                return false;
            }
            lines.insert(line, source);
            return true;
        }
        self.files
            .entry(file.to_owned())
            .or_default()
            .insert(line, source);
        true
    }

    pub fn get(&self, file: &str, line: u16) -> Option<&SourceLine> {
        self.files.get(file)?.get(&line)
    }

    pub fn file(&self, file: &str) -> Option<&BTreeMap<u16, SourceLine>> {
        self.files.get(file)
    }

    pub fn files(&self) -> impl Iterator<Item = (&str, &BTreeMap<u16, SourceLine>)> {
        self.files.iter().map(|(name, lines)| (name.as_str(), lines))
    }

    /// The total number of lines, over all files.
    pub fn len(&self) -> usize {
        self.files.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.files.values().all(BTreeMap::is_empty)
    }

    /// Append SOURCE_CODE records for the whole cache to `writer`.
    ///
    /// A file with more lines than fit into one record's count is split over
    /// several records.
    pub fn encode(&self, writer: &mut LogWriter) {
        for (file, lines) in &self.files {
            let entries: Vec<_> = lines.iter().collect();
            for chunk in entries.chunks(usize::from(u16::MAX)) {
                writer.u8(MARK_SOURCE_CODE).string(file);
                // Chunks are at most u16::MAX long.
                writer.u16(chunk.len() as u16);
                for (line, source) in chunk {
                    writer.u16(**line).u8(source.indent).string(&source.text);
                }
            }
        }
    }
}

/// Supplies interpreter source lines for [`TraceForest::extract_source_code_lines`](super::TraceForest::extract_source_code_lines).
pub trait SourceProvider {
    /// The raw text of line `line` (1-based) of `file`, without its line terminator.
    fn source_line(&mut self, file: &str, line: u16) -> Option<String>;
}

/// Maps file names to whole file contents.
impl SourceProvider for HashMap<String, String> {
    fn source_line(&mut self, file: &str, line: u16) -> Option<String> {
        let index = usize::from(line).checked_sub(1)?;
        self.get(file)?.lines().nth(index).map(str::to_owned)
    }
}
