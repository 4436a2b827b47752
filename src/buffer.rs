use std::fmt;

/// Growable text buffer used to accumulate a command line one key at a time.
///
/// The buffer only ever grows or shrinks at its end, which is all the line
/// editor needs: typed characters are appended and backspace removes the last
/// one. Length is measured in characters, not bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineBuffer {
    text: String,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a single character at the end of the buffer.
    pub fn append(&mut self, ch: char) {
        self.text.push(ch);
    }

    /// Remove the last character, returning it. `None` on an empty buffer.
    pub fn delete_last(&mut self) -> Option<char> {
        self.text.pop()
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }

    /// Replace the whole contents with `text`.
    pub fn replace(&mut self, text: &str) {
        self.text.clear();
        self.text.push_str(text);
    }

    pub fn contents(&self) -> &str {
        &self.text
    }

    /// Number of characters currently held.
    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

impl From<&str> for LineBuffer {
    fn from(text: &str) -> Self {
        Self {
            text: text.to_string(),
        }
    }
}

impl fmt::Display for LineBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
