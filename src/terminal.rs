//! Raw terminal access: switching the controlling terminal into unbuffered,
//! unechoed mode and decoding the byte stream into key events.

use nix::libc;
use nix::sys::termios::{self, LocalFlags, SetArg, SpecialCharacterIndices, Termios};
use std::io::{self, Read};

const ESC: u8 = 0x1b;
const DEL: u8 = 0x7f;
const BS: u8 = 0x08;

/// One decoded key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    /// A character to insert into the line, printable text or tab.
    Char(char),
    Enter,
    Backspace,
    Up,
    Down,
    /// Any other escape sequence (left/right arrows, function keys, ...).
    UnknownEscape,
    /// A control byte with no editing meaning.
    Control(u8),
    /// The input stream was closed.
    Eof,
}

/// Source of key events for the line editor.
pub trait KeySource {
    fn read_key(&mut self) -> io::Result<Key>;
}

/// Decodes keys from any byte stream.
///
/// In production the stream is the raw terminal, in tests it is a scripted
/// byte buffer.
pub struct KeyReader<R> {
    input: R,
}

impl<R: Read> KeyReader<R> {
    pub fn new(input: R) -> Self {
        Self { input }
    }

    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let mut byte = [0u8; 1];
        loop {
            match self.input.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(byte[0])),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn read_escape(&mut self) -> io::Result<Key> {
        match self.read_byte()? {
            Some(b'[') | Some(b'O') => {}
            Some(_) => return Ok(Key::UnknownEscape),
            None => return Ok(Key::Eof),
        }
        match self.read_byte()? {
            Some(b'A') => Ok(Key::Up),
            Some(b'B') => Ok(Key::Down),
            Some(b) if b.is_ascii_digit() || b == b';' => {
                // Parameterised sequence such as "ESC [ 3 ~": swallow up to the final byte.
                while let Some(b) = self.read_byte()? {
                    if (0x40..=0x7e).contains(&b) {
                        break;
                    }
                }
                Ok(Key::UnknownEscape)
            }
            Some(_) => Ok(Key::UnknownEscape),
            None => Ok(Key::Eof),
        }
    }

    fn read_utf8(&mut self, first: u8) -> io::Result<Key> {
        let width = match first {
            0xc0..=0xdf => 2,
            0xe0..=0xef => 3,
            0xf0..=0xf7 => 4,
            _ => return Ok(Key::Control(first)),
        };
        let mut bytes = vec![first];
        for _ in 1..width {
            match self.read_byte()? {
                Some(b) => bytes.push(b),
                None => return Ok(Key::Eof),
            }
        }
        Ok(match std::str::from_utf8(&bytes).ok().and_then(|s| s.chars().next()) {
            Some(ch) => Key::Char(ch),
            None => Key::Control(first),
        })
    }
}

impl<R: Read> KeySource for KeyReader<R> {
    fn read_key(&mut self) -> io::Result<Key> {
        let Some(byte) = self.read_byte()? else {
            return Ok(Key::Eof);
        };
        match byte {
            ESC => self.read_escape(),
            b'\n' | b'\r' => Ok(Key::Enter),
            DEL | BS => Ok(Key::Backspace),
            b'\t' => Ok(Key::Char('\t')),
            b if b < 0x20 => Ok(Key::Control(b)),
            b if b.is_ascii() => Ok(Key::Char(b as char)),
            b => self.read_utf8(b),
        }
    }
}

/// Unbuffered reader over the standard input descriptor.
///
/// `std::io::Stdin` keeps its own buffer; reading the descriptor directly keeps
/// unread typeahead in the kernel where child processes can still see it.
pub struct RawStdin;

impl Read for RawStdin {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        nix::unistd::read(libc::STDIN_FILENO, buf).map_err(io::Error::from)
    }
}

/// Key source reading straight from the controlling terminal.
pub fn stdin_keys() -> KeyReader<RawStdin> {
    KeyReader::new(RawStdin)
}

/// Active raw mode on standard input.
///
/// The saved settings are put back when the guard is restored or dropped, so
/// every exit path (including unwinding) leaves the terminal usable.
pub struct RawMode {
    saved: Option<Termios>,
}

impl RawMode {
    /// Disable line buffering on the terminal, with or without local echo.
    pub fn enable(echo: bool) -> io::Result<Self> {
        let stdin = io::stdin();
        let saved = termios::tcgetattr(&stdin)?;
        let mut raw = saved.clone();
        raw.local_flags.remove(LocalFlags::ICANON);
        if echo {
            raw.local_flags.insert(LocalFlags::ECHO);
        } else {
            raw.local_flags.remove(LocalFlags::ECHO);
        }
        raw.control_chars[SpecialCharacterIndices::VMIN as usize] = 1;
        raw.control_chars[SpecialCharacterIndices::VTIME as usize] = 0;
        termios::tcsetattr(&stdin, SetArg::TCSANOW, &raw)?;
        tracing::trace!(echo, "terminal switched to raw mode");
        Ok(Self { saved: Some(saved) })
    }

    /// Put the terminal back into the mode it had before [`RawMode::enable`].
    pub fn restore(mut self) -> io::Result<()> {
        self.restore_inner()
    }

    fn restore_inner(&mut self) -> io::Result<()> {
        if let Some(saved) = self.saved.take() {
            termios::tcsetattr(io::stdin(), SetArg::TCSANOW, &saved)?;
        }
        Ok(())
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        if let Err(e) = self.restore_inner() {
            tracing::warn!("failed to restore terminal mode: {}", e);
        }
    }
}

/// Whether standard input is attached to a terminal.
pub fn stdin_is_terminal() -> bool {
    use std::io::IsTerminal;
    io::stdin().is_terminal()
}
