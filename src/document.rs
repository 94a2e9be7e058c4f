//! In-memory line buffer for a single patch run.
//!
//! A [`SourceDocument`] owns every line of the target file together with
//! its original terminator, so rendering an untouched document reproduces
//! the input byte-for-byte regardless of line-ending style.

use std::fs;
use std::io::Write;
use std::ops::Range;
use std::path::Path;
use tracing::debug;

/// Zero-based index of a line inside a [`SourceDocument`].
pub type LineIndex = usize;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceDocument {
    /// Lines including their terminator (`\n`, `\r\n`, or none on the last line)
    lines: Vec<String>,
}

impl SourceDocument {
    /// Split text into lines, keeping each line's terminator attached.
    pub fn from_text(text: &str) -> Self {
        Self {
            lines: text.split_inclusive('\n').map(str::to_string).collect(),
        }
    }

    /// Read the whole file once. Non UTF-8 content is reported as
    /// `InvalidData`.
    pub fn load(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let document = Self::from_text(&text);
        debug!(path = %path.display(), lines = document.len(), "loaded document");
        Ok(document)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Line content without its terminator.
    pub fn line(&self, index: LineIndex) -> Option<&str> {
        self.lines.get(index).map(|line| strip_terminator(line))
    }

    /// Line content including its terminator.
    pub fn raw_line(&self, index: LineIndex) -> Option<&str> {
        self.lines.get(index).map(String::as_str)
    }

    /// Iterate over line contents without terminators.
    pub fn lines(&self) -> impl Iterator<Item = &str> + '_ {
        self.lines.iter().map(|line| strip_terminator(line))
    }

    /// Terminator of a given line (`""` for an unterminated last line).
    pub fn terminator(&self, index: LineIndex) -> &str {
        self.lines
            .get(index)
            .map(|line| &line[strip_terminator(line).len()..])
            .unwrap_or("")
    }

    /// Line ending used for newly written lines: the first terminator found
    /// in the document, `\n` when there is none.
    pub fn line_ending(&self) -> &str {
        self.lines
            .iter()
            .map(|line| &line[strip_terminator(line).len()..])
            .find(|ending| !ending.is_empty())
            .unwrap_or("\n")
    }

    /// Whether `needle` occurs anywhere in the document.
    ///
    /// Matches across line boundaries too, so multi-line sentinels work.
    /// Line endings are ignored on both sides: a `\n` in the needle matches
    /// any terminator.
    pub fn contains(&self, needle: &str) -> bool {
        if needle.is_empty() {
            return false;
        }
        if !needle.contains('\n') {
            return self.lines().any(|line| line.contains(needle));
        }
        let needle = needle.replace("\r\n", "\n");
        self.lines().collect::<Vec<_>>().join("\n").contains(&needle)
    }

    /// Raw text of a line range, terminators included.
    pub fn slice_text(&self, range: Range<LineIndex>) -> String {
        self.lines[range].concat()
    }

    /// Replace a half-open line range with new raw lines.
    pub(crate) fn splice(&mut self, range: Range<LineIndex>, new_lines: Vec<String>) {
        self.lines.splice(range, new_lines);
    }

    /// Render the document back to text.
    pub fn to_text(&self) -> String {
        self.lines.concat()
    }

    /// Write the document to `path` atomically.
    ///
    /// Content goes to a temporary file in the same directory, is fsynced,
    /// then renamed over the destination. The mtime is bumped afterwards so
    /// build tools notice the change.
    pub fn commit(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let path = path.as_ref();
        atomic_write(path, self.to_text().as_bytes())?;

        let now = filetime::FileTime::now();
        filetime::set_file_mtime(path, now)?;
        Ok(())
    }
}

/// Strip a trailing `\n` or `\r\n`.
pub(crate) fn strip_terminator(line: &str) -> &str {
    line.strip_suffix('\n')
        .map(|rest| rest.strip_suffix('\r').unwrap_or(rest))
        .unwrap_or(line)
}

/// Split `text` into raw lines terminated with `ending`, except the last
/// line which gets `last_terminator`.
///
/// A trailing newline in `text` does not produce an extra empty line.
pub(crate) fn terminated_lines(text: &str, ending: &str, last_terminator: &str) -> Vec<String> {
    let mut lines: Vec<String> = text.lines().map(|line| format!("{line}{ending}")).collect();
    if let (Some(last), Some(content)) = (lines.last_mut(), text.lines().last()) {
        *last = format!("{content}{last_terminator}");
    }
    lines
}

/// Atomic file write: tempfile + fsync + rename.
fn atomic_write(path: &Path, content: &[u8]) -> std::io::Result<()> {
    // Same directory keeps the rename on one filesystem
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        Some(_) => Path::new("."),
        None => {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Path has no parent directory",
            ))
        }
    };

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;

    // Keep the original permissions instead of the tempfile's 0600
    if let Ok(metadata) = fs::metadata(path) {
        temp.as_file().set_permissions(metadata.permissions())?;
    }

    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
