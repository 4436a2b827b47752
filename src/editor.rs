//! Interactive line editing with history scroll-back and auto-complete.
//!
//! [`LineEditor::read_line`] consumes key events until the user submits a
//! non-empty line. All the per-line state lives in an [`EditSession`], which is
//! created fresh for every line and thrown away once Enter is accepted.
//!
//! The session is either typing a brand-new command or recalling history entry
//! `k`. Recalled entries are edited through private copies ("shadows") so the
//! stored history is never touched.

use crate::autocomplete::AutoComplete;
use crate::buffer::LineBuffer;
use crate::history::History;
use crate::terminal::{Key, KeySource};
use std::fmt;
use std::io::{self, Write};

const CLEAR_LINE: &str = "\x1b[2K\r";
const ERASE_CHAR: &str = "\x08 \x08";

/// Which buffer the user is currently editing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Editing the in-progress buffer for a new command.
    Typing,
    /// Editing the shadow copy of history entry `k`.
    Recalling(usize),
}

/// Reads command lines from a key source, echoing to a terminal.
pub struct LineEditor {
    prompt: String,
    autocomplete: AutoComplete,
}

impl LineEditor {
    pub fn new(prompt: impl Into<String>, autocomplete: AutoComplete) -> Self {
        Self {
            prompt: prompt.into(),
            autocomplete,
        }
    }

    pub fn set_prompt(&mut self, prompt: impl Into<String>) {
        self.prompt = prompt.into();
    }

    /// Read one finished command line.
    ///
    /// Returns `Ok(None)` if the key source is exhausted before a line is
    /// submitted. The returned text never contains the line terminator.
    pub fn read_line(
        &self,
        history: &History,
        keys: &mut dyn KeySource,
        out: &mut dyn Write,
    ) -> io::Result<Option<String>> {
        let mut session = EditSession::new(history, &self.prompt, &self.autocomplete);
        draw(out, format_args!("{}", self.prompt));
        loop {
            let key = keys.read_key()?;
            if key == Key::Eof {
                draw(out, format_args!("\n"));
                return Ok(None);
            }
            if let Some(line) = session.handle_key(key, out) {
                return Ok(Some(line));
            }
        }
    }
}

/// Mutable state of one line-editing interaction.
pub struct EditSession<'a> {
    history: &'a History,
    prompt: &'a str,
    autocomplete: &'a AutoComplete,
    input: LineBuffer,
    cursor: usize,
    shadows: Vec<Option<LineBuffer>>,
    found: bool,
}

impl<'a> EditSession<'a> {
    pub fn new(history: &'a History, prompt: &'a str, autocomplete: &'a AutoComplete) -> Self {
        Self {
            history,
            prompt,
            autocomplete,
            input: LineBuffer::new(),
            cursor: history.len(),
            shadows: vec![None; history.len()],
            found: false,
        }
    }

    pub fn mode(&self) -> Mode {
        if self.cursor >= self.history.len() {
            Mode::Typing
        } else {
            Mode::Recalling(self.cursor)
        }
    }

    /// The in-progress buffer for a new command.
    pub fn input(&self) -> &LineBuffer {
        &self.input
    }

    /// Text of whichever buffer is active right now.
    pub fn active(&self) -> &str {
        match self.mode() {
            Mode::Typing => self.input.contents(),
            Mode::Recalling(k) => match &self.shadows[k] {
                Some(shadow) => shadow.contents(),
                None => self.history.get(k).unwrap_or_default(),
            },
        }
    }

    /// Whether an auto-completion has already been applied to this line.
    pub fn found(&self) -> bool {
        self.found
    }

    /// Feed one key to the state machine.
    ///
    /// Returns the finished line once Enter is accepted on a non-empty buffer.
    pub fn handle_key(&mut self, key: Key, out: &mut dyn Write) -> Option<String> {
        match key {
            Key::Enter => return self.submit(out),
            Key::Up => self.scroll_up(out),
            Key::Down => self.scroll_down(out),
            Key::UnknownEscape | Key::Eof => {}
            Key::Char(ch) => {
                self.active_mut().append(ch);
                draw(out, format_args!("{}", ch));
                self.try_autocomplete(out);
            }
            Key::Backspace => {
                if self.active_mut().delete_last().is_some() {
                    draw(out, format_args!("{}", ERASE_CHAR));
                }
                self.try_autocomplete(out);
            }
            Key::Control(_) => self.try_autocomplete(out),
        }
        None
    }

    fn submit(&mut self, out: &mut dyn Write) -> Option<String> {
        draw(out, format_args!("\n"));
        self.found = false;
        if self.active().trim().is_empty() {
            self.active_mut().clear();
            draw(out, format_args!("{}", self.prompt));
            return None;
        }
        Some(self.active().to_string())
    }

    fn scroll_up(&mut self, out: &mut dyn Write) {
        if self.cursor == 0 {
            return;
        }
        self.cursor -= 1;
        self.redraw(out);
    }

    fn scroll_down(&mut self, out: &mut dyn Write) {
        if self.mode() == Mode::Typing {
            return;
        }
        self.cursor += 1;
        self.redraw(out);
    }

    fn try_autocomplete(&mut self, out: &mut dyn Write) {
        if !self.autocomplete.is_armed()
            || self.found
            || self.mode() != Mode::Typing
            || self.input.is_empty()
        {
            return;
        }
        let history = self.history;
        let Some(entry) = history
            .find_first_char_match(self.input.contents())
            .and_then(|index| history.get(index))
        else {
            return;
        };
        tracing::debug!(entry, "auto-completed from history");
        self.found = true;
        self.input.replace(entry);
        self.redraw(out);
    }

    fn active_mut(&mut self) -> &mut LineBuffer {
        match self.mode() {
            Mode::Typing => &mut self.input,
            Mode::Recalling(k) => {
                let history = self.history;
                self.shadows[k]
                    .get_or_insert_with(|| LineBuffer::from(history.get(k).unwrap_or_default()))
            }
        }
    }

    fn redraw(&mut self, out: &mut dyn Write) {
        // Materialize the shadow so later edits start from what is on screen.
        self.active_mut();
        draw(out, format_args!("{}{}{}", CLEAR_LINE, self.prompt, self.active()));
    }
}

/// Best-effort terminal output; a failed redraw is cosmetic.
fn draw(out: &mut dyn Write, args: fmt::Arguments<'_>) {
    if let Err(e) = out.write_fmt(args).and_then(|_| out.flush()) {
        tracing::trace!("terminal redraw failed: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terminal::KeyReader;
    use std::io::Cursor;

    const PROMPT: &str = "$ ";

    fn history_of(lines: &[&str]) -> History {
        let mut history = History::new();
        for line in lines {
            history.append(line);
        }
        history
    }

    fn type_text(session: &mut EditSession<'_>, text: &str, out: &mut Vec<u8>) {
        for ch in text.chars() {
            assert_eq!(session.handle_key(Key::Char(ch), out), None);
        }
    }

    #[test]
    fn test_typing_without_enter_never_submits() {
        let history = History::new();
        let ac = AutoComplete::new(false);
        let mut session = EditSession::new(&history, PROMPT, &ac);
        let mut out = Vec::new();

        type_text(&mut session, "echo hello | wc", &mut out);

        assert_eq!(session.input().contents(), "echo hello | wc");
        assert_eq!(String::from_utf8(out).unwrap(), "echo hello | wc");
    }

    #[test]
    fn test_backspace_on_empty_buffer_is_noop() {
        let history = History::new();
        let ac = AutoComplete::new(false);
        let mut session = EditSession::new(&history, PROMPT, &ac);
        let mut out = Vec::new();

        assert_eq!(session.handle_key(Key::Backspace, &mut out), None);
        assert!(session.input().is_empty());
        assert!(out.is_empty());

        type_text(&mut session, "ab", &mut out);
        session.handle_key(Key::Backspace, &mut out);
        assert_eq!(session.input().contents(), "a");
        assert!(String::from_utf8(out).unwrap().ends_with(ERASE_CHAR));
    }

    #[test]
    fn test_up_at_oldest_entry_stays_put() {
        let history = history_of(&["ls", "pwd"]);
        let ac = AutoComplete::new(false);
        let mut session = EditSession::new(&history, PROMPT, &ac);
        let mut out = Vec::new();

        session.handle_key(Key::Up, &mut out);
        session.handle_key(Key::Up, &mut out);
        assert_eq!(session.mode(), Mode::Recalling(0));
        session.handle_key(Key::Up, &mut out);
        assert_eq!(session.mode(), Mode::Recalling(0));
        assert_eq!(session.active(), "ls");
    }

    #[test]
    fn test_up_with_empty_history_is_noop() {
        let history = History::new();
        let ac = AutoComplete::new(false);
        let mut session = EditSession::new(&history, PROMPT, &ac);
        let mut out = Vec::new();

        session.handle_key(Key::Up, &mut out);
        assert_eq!(session.mode(), Mode::Typing);
        assert!(out.is_empty());
    }

    #[test]
    fn test_down_while_typing_is_noop() {
        let history = history_of(&["ls"]);
        let ac = AutoComplete::new(false);
        let mut session = EditSession::new(&history, PROMPT, &ac);
        let mut out = Vec::new();

        type_text(&mut session, "ca", &mut out);
        let before = out.len();
        session.handle_key(Key::Down, &mut out);
        assert_eq!(session.mode(), Mode::Typing);
        assert_eq!(session.input().contents(), "ca");
        assert_eq!(out.len(), before);
    }

    #[test]
    fn test_down_from_last_entry_restores_input() {
        let history = history_of(&["ls", "pwd"]);
        let ac = AutoComplete::new(false);
        let mut session = EditSession::new(&history, PROMPT, &ac);
        let mut out = Vec::new();

        type_text(&mut session, "gre", &mut out);
        session.handle_key(Key::Up, &mut out);
        assert_eq!(session.mode(), Mode::Recalling(1));
        assert_eq!(session.active(), "pwd");

        session.handle_key(Key::Down, &mut out);
        assert_eq!(session.mode(), Mode::Typing);
        assert_eq!(session.active(), "gre");
        let screen = String::from_utf8(out).unwrap();
        assert!(screen.ends_with(&format!("{}{}gre", CLEAR_LINE, PROMPT)));
    }

    #[test]
    fn test_recalled_entry_round_trips() {
        let history = history_of(&["cat file > out | grep a", "ls -l"]);
        let ac = AutoComplete::new(false);
        let mut session = EditSession::new(&history, PROMPT, &ac);
        let mut out = Vec::new();

        session.handle_key(Key::Up, &mut out);
        session.handle_key(Key::Up, &mut out);
        let line = session.handle_key(Key::Enter, &mut out);
        assert_eq!(line.as_deref(), history.get(0));
    }

    #[test]
    fn test_editing_recalled_entry_leaves_history_intact() {
        let history = history_of(&["ls -l"]);
        let ac = AutoComplete::new(false);
        let mut session = EditSession::new(&history, PROMPT, &ac);
        let mut out = Vec::new();

        session.handle_key(Key::Up, &mut out);
        session.handle_key(Key::Backspace, &mut out);
        session.handle_key(Key::Char('a'), &mut out);
        // Scroll away and back: the edit is kept in the shadow.
        session.handle_key(Key::Down, &mut out);
        session.handle_key(Key::Up, &mut out);
        assert_eq!(session.active(), "ls -a");

        let line = session.handle_key(Key::Enter, &mut out);
        assert_eq!(line.as_deref(), Some("ls -a"));
        assert_eq!(history.get(0), Some("ls -l"));
    }

    #[test]
    fn test_enter_on_empty_buffer_reprompts() {
        let history = History::new();
        let ac = AutoComplete::new(false);
        let mut session = EditSession::new(&history, PROMPT, &ac);
        let mut out = Vec::new();

        assert_eq!(session.handle_key(Key::Enter, &mut out), None);
        assert_eq!(String::from_utf8(out.clone()).unwrap(), format!("\n{}", PROMPT));

        type_text(&mut session, "  ", &mut out);
        assert_eq!(session.handle_key(Key::Enter, &mut out), None);
        assert!(session.input().is_empty());

        type_text(&mut session, "ls", &mut out);
        assert_eq!(session.handle_key(Key::Enter, &mut out).as_deref(), Some("ls"));
    }

    #[test]
    fn test_autocomplete_substitutes_once_per_line() {
        let history = history_of(&["grep needle haystack", "ls"]);
        let ac = AutoComplete::new(true);
        let mut session = EditSession::new(&history, PROMPT, &ac);
        let mut out = Vec::new();

        session.handle_key(Key::Char('g'), &mut out);
        assert!(session.found());
        assert_eq!(session.input().contents(), "grep needle haystack");

        // Clearing the line and typing again does not trigger a second substitution.
        for _ in 0.."grep needle haystack".len() {
            session.handle_key(Key::Backspace, &mut out);
        }
        session.handle_key(Key::Char('l'), &mut out);
        assert_eq!(session.input().contents(), "l");

        let line = session.handle_key(Key::Enter, &mut out);
        assert_eq!(line.as_deref(), Some("l"));
        assert!(!session.found());
    }

    #[test]
    fn test_empty_enter_rearms_autocomplete_for_the_next_line() {
        let history = history_of(&["grep needle", "ls"]);
        let ac = AutoComplete::new(true);
        let mut session = EditSession::new(&history, PROMPT, &ac);
        let mut out = Vec::new();

        session.handle_key(Key::Char('g'), &mut out);
        assert_eq!(session.input().contents(), "grep needle");
        for _ in 0.."grep needle".len() {
            session.handle_key(Key::Backspace, &mut out);
        }
        assert_eq!(session.handle_key(Key::Enter, &mut out), None);
        assert!(!session.found());

        session.handle_key(Key::Char('l'), &mut out);
        assert_eq!(session.input().contents(), "ls");
        assert!(session.found());
    }

    #[test]
    fn test_autocomplete_matches_first_character_only() {
        let history = history_of(&["cat notes"]);
        let ac = AutoComplete::new(true);
        let mut session = EditSession::new(&history, PROMPT, &ac);
        let mut out = Vec::new();

        session.handle_key(Key::Char('c'), &mut out);
        assert_eq!(session.input().contents(), "cat notes");
        let screen = String::from_utf8(out).unwrap();
        assert!(screen.ends_with(&format!("{}{}cat notes", CLEAR_LINE, PROMPT)));
    }

    #[test]
    fn test_autocomplete_disarmed_or_recalling_does_nothing() {
        let history = history_of(&["cat notes", "ls"]);
        let ac = AutoComplete::new(false);
        let mut session = EditSession::new(&history, PROMPT, &ac);
        let mut out = Vec::new();

        session.handle_key(Key::Char('c'), &mut out);
        assert_eq!(session.input().contents(), "c");

        ac.set_armed(true);
        session.handle_key(Key::Up, &mut out);
        session.handle_key(Key::Char('c'), &mut out);
        assert_eq!(session.active(), "lsc");
        assert!(!session.found());
    }

    #[test]
    fn test_read_line_from_scripted_keys() {
        let history = history_of(&["echo one", "echo two"]);
        let editor = LineEditor::new(PROMPT, AutoComplete::new(false));
        let mut keys = KeyReader::new(Cursor::new(b"\x1b[A\x1b[A\n".to_vec()));
        let mut out = Vec::new();

        let line = editor.read_line(&history, &mut keys, &mut out).unwrap();
        assert_eq!(line.as_deref(), Some("echo one"));
        assert!(String::from_utf8(out).unwrap().starts_with(PROMPT));
    }

    #[test]
    fn test_read_line_returns_none_at_end_of_input() {
        let history = History::new();
        let editor = LineEditor::new(PROMPT, AutoComplete::new(false));
        let mut keys = KeyReader::new(Cursor::new(b"partial".to_vec()));
        let mut out = Vec::new();

        assert_eq!(editor.read_line(&history, &mut keys, &mut out).unwrap(), None);
    }
}
