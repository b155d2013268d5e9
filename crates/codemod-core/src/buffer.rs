//! Text buffers and whole-buffer replacement.

use std::ops::Range;

use anyhow::{Result, ensure};

/// Position in a buffer: 0-based line and 0-based column (in characters).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub const ORIGIN: Position = Position { line: 0, column: 0 };

    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }

    /// Position just past the last character of `text`.
    pub fn end_of(text: &str) -> Self {
        let line = text.matches('\n').count() as u32;
        let last_line = text.rsplit('\n').next().unwrap_or("");
        Self {
            line,
            column: last_line.chars().count() as u32,
        }
    }

    /// Byte offset of this position in `text`, if it lies within it.
    pub fn offset_in(&self, text: &str) -> Option<usize> {
        let mut line_start = 0;
        for _ in 0..self.line {
            line_start += text[line_start..].find('\n')? + 1;
        }
        let line = &text[line_start..];
        let line = &line[..line.find('\n').unwrap_or(line.len())];
        if self.column as usize == line.chars().count() {
            return Some(line_start + line.len());
        }
        line.char_indices()
            .nth(self.column as usize)
            .map(|(i, _)| line_start + i)
    }
}

/// A single edit: replace `range` with `new_text`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEdit {
    pub range: Range<Position>,
    pub new_text: String,
}

impl TextEdit {
    /// Apply to an in-memory string.
    pub fn apply_to(&self, text: &mut String) -> Result<()> {
        ensure!(
            self.range.start <= self.range.end,
            "edit range is reversed: {:?}",
            self.range
        );
        let start = self.range.start.offset_in(text);
        let end = self.range.end.offset_in(text);
        let (Some(start), Some(end)) = (start, end) else {
            anyhow::bail!("edit range {:?} is outside the buffer", self.range);
        };
        text.replace_range(start..end, &self.new_text);
        Ok(())
    }
}

/// The document a codemod runs against.
pub trait TextBuffer {
    /// Logical identity shown to transforms (usually a file path).
    fn name(&self) -> String;

    /// Full current text.
    fn text(&self) -> Result<String>;

    /// End-of-document position as of now.
    fn end(&self) -> Result<Position> {
        Ok(Position::end_of(&self.text()?))
    }

    /// Apply `edit` atomically: readers observe either none or all of it.
    fn apply(&mut self, edit: TextEdit) -> Result<()>;
}

/// Replace the whole buffer with `text` in one edit.
///
/// The end position is read when the edit is built, not earlier, so text
/// appended by anyone else in the meantime is covered too.
pub fn replace_all(buffer: &mut dyn TextBuffer, text: &str) -> Result<()> {
    let end = buffer.end()?;
    buffer.apply(TextEdit {
        range: Position::ORIGIN..end,
        new_text: text.to_string(),
    })
}

/// A buffer held in memory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryBuffer {
    name: String,
    text: String,
}

impl MemoryBuffer {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl TextBuffer for MemoryBuffer {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn text(&self) -> Result<String> {
        Ok(self.text.clone())
    }

    fn apply(&mut self, edit: TextEdit) -> Result<()> {
        // Build the result on a copy so a failed edit leaves the buffer as it was.
        let mut next = self.text.clone();
        edit.apply_to(&mut next)?;
        self.text = next;
        Ok(())
    }
}
