use std::fmt;

/// A single finalized command line.
///
/// Entries are immutable once committed; `order` is the zero-based position at
/// which the entry was appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    line: String,
    order: usize,
}

impl HistoryEntry {
    pub fn line(&self) -> &str {
        &self.line
    }

    pub fn order(&self) -> usize {
        self.order
    }
}

/// Append-only log of previously entered command lines.
///
/// Entries live in a single vector and are addressed by index; nothing is ever
/// removed. Every line the user finalizes is recorded, whether or not the
/// command it describes ran successfully.
#[derive(Debug, Clone, Default)]
pub struct History {
    entries: Vec<HistoryEntry>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finalized line. Leading spaces are dropped before storing.
    pub fn append(&mut self, line: &str) {
        let order = self.entries.len();
        self.entries.push(HistoryEntry {
            line: line.trim_start_matches(' ').to_string(),
            order,
        });
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.entries.get(index).map(HistoryEntry::line)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    /// Index of the oldest entry satisfying `predicate`.
    pub fn find_by_match<P>(&self, mut predicate: P) -> Option<usize>
    where
        P: FnMut(&str) -> bool,
    {
        self.entries.iter().position(|e| predicate(&e.line))
    }

    /// Index of the oldest entry whose first character equals the first
    /// character of `input`.
    ///
    /// Only the first character is compared, not the whole prefix. Auto-complete
    /// relies on exactly this behaviour.
    pub fn find_first_char_match(&self, input: &str) -> Option<usize> {
        let first = input.chars().next()?;
        self.find_by_match(|line| line.chars().next() == Some(first))
    }
}

impl fmt::Display for History {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            writeln!(f, "{}", entry.line)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history_of(lines: &[&str]) -> History {
        let mut history = History::new();
        for line in lines {
            history.append(line);
        }
        history
    }

    #[test]
    fn test_append_keeps_insertion_order() {
        let history = history_of(&["ls", "pwd", "cat file"]);
        assert_eq!(history.len(), 3);
        assert_eq!(history.get(0), Some("ls"));
        assert_eq!(history.get(2), Some("cat file"));
        assert_eq!(history.get(3), None);

        let orders: Vec<usize> = history.iter().map(HistoryEntry::order).collect();
        assert_eq!(orders, vec![0, 1, 2]);
    }

    #[test]
    fn test_append_strips_leading_spaces() {
        let history = history_of(&["   echo hi  "]);
        assert_eq!(history.get(0), Some("echo hi  "));
    }

    #[test]
    fn test_find_by_match_returns_oldest() {
        let history = history_of(&["grep a", "ls", "grep b"]);
        assert_eq!(history.find_by_match(|l| l.starts_with("grep")), Some(0));
        assert_eq!(history.find_by_match(|l| l == "nothing"), None);
    }

    #[test]
    fn test_first_char_match_ignores_rest_of_input() {
        let history = history_of(&["cat notes", "ls -l"]);
        // "cx" is not a prefix of "cat notes", but the first character matches.
        assert_eq!(history.find_first_char_match("cx"), Some(0));
        assert_eq!(history.find_first_char_match("l"), Some(1));
        assert_eq!(history.find_first_char_match("z"), None);
        assert_eq!(history.find_first_char_match(""), None);
    }

    #[test]
    fn test_display_lists_one_entry_per_line() {
        let history = history_of(&["ls", "cd /tmp"]);
        assert_eq!(history.to_string(), "ls\ncd /tmp\n");
    }
}
