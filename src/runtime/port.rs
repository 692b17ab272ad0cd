//! I/O ports of the machine
//!
//! The VM never talks to stdio directly. It reads `^` input from an [`InputPort`] and
//! writes program output and diagnostics to [`OutputPort`]s, which are shared handles so
//! that an embedder (or a test) can keep one end and inspect it.
use core::fmt;
use std::{
    any::Any,
    io::{self, BufRead, BufReader, Read, Write},
    sync::{Arc, Mutex},
};

fn poisoned(kind: &str) -> io::Error {
    io::Error::new(io::ErrorKind::Other, format!("{kind} port was poisoned"))
}

pub trait Writeable: Write + Any {}
impl<T: Write + Any> Writeable for T {}

/// Output port
///
/// Writes block on the inner mutex.
#[derive(Clone)]
pub struct OutputPort {
    port: Arc<Mutex<dyn Writeable>>,
}

impl OutputPort {
    pub fn new(writer: impl Writeable) -> Self {
        Self {
            port: Arc::new(Mutex::new(writer)),
        }
    }

    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }

    /// An in-memory port and the buffer it writes to.
    pub fn buffer() -> (Self, Arc<Mutex<Vec<u8>>>) {
        let buffer = Arc::new(Mutex::new(vec![]));
        (Self::from(buffer.clone()), buffer)
    }
}

impl<T: Writeable> From<Arc<Mutex<T>>> for OutputPort {
    fn from(port: Arc<Mutex<T>>) -> Self {
        Self { port }
    }
}

impl fmt::Debug for OutputPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#<output port {:p}>", Arc::as_ptr(&self.port))
    }
}

impl Write for OutputPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut writer = self.port.lock().map_err(|_| poisoned("output"))?;
        writer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut writer = self.port.lock().map_err(|_| poisoned("output"))?;
        writer.flush()
    }
}

pub trait Readable: BufRead + Any {}
impl<T: BufRead + Any> Readable for T {}

/// Line oriented input port
#[derive(Clone)]
pub struct InputPort {
    port: Arc<Mutex<dyn Readable>>,
}

impl InputPort {
    pub fn new(reader: impl Readable) -> Self {
        Self {
            port: Arc::new(Mutex::new(reader)),
        }
    }

    pub fn stdin() -> Self {
        Self::new(BufReader::new(io::stdin()))
    }

    /// A port that reads the given text.
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(io::Cursor::new(text.into().into_bytes()))
    }

    /// Reads up to and including the next `\n`, but never more than `limit` bytes.
    ///
    /// `None` at end of input.
    pub fn read_line(&self, limit: usize) -> io::Result<Option<String>> {
        let mut reader = self.port.lock().map_err(|_| poisoned("input"))?;
        let mut line = vec![];
        let read = (&mut *reader)
            .take(limit as u64)
            .read_until(b'\n', &mut line)?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&line).into_owned()))
    }
}

impl<T: Readable> From<Arc<Mutex<T>>> for InputPort {
    fn from(port: Arc<Mutex<T>>) -> Self {
        Self { port }
    }
}

impl fmt::Debug for InputPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#<input port {:p}>", Arc::as_ptr(&self.port))
    }
}

/// What `^` pushes for a line of input.
#[derive(Debug, Clone, PartialEq)]
pub enum Scanned {
    Number(f64),
    Text(String),
}

fn strip_line_ending(line: &str) -> &str {
    match line.strip_suffix('\n') {
        Some(line) => line.strip_suffix('\r').unwrap_or(line),
        None => line,
    }
}

/// Classifies a line read by `^`.
///
/// A non-negative fixed point decimal (digits and at most one `.`, with nothing but a
/// `\n` after it) becomes a number. Anything else is kept as text without its line
/// ending.
pub fn scan_line(line: &str) -> Scanned {
    let body = line.strip_suffix('\n').unwrap_or(line);
    let is_decimal = !body.is_empty()
        && body.bytes().all(|b| b.is_ascii_digit() || b == b'.')
        && body.bytes().filter(|b| *b == b'.').count() <= 1;
    if is_decimal {
        let (whole, fraction) = body.split_once('.').unwrap_or((body, ""));
        let whole = if whole.is_empty() { "0" } else { whole };
        let fraction = if fraction.is_empty() { "0" } else { fraction };
        if let Ok(number) = format!("{whole}.{fraction}").parse() {
            return Scanned::Number(number);
        }
    }
    Scanned::Text(strip_line_ending(line).to_owned())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use assert2::check;

    use super::{scan_line, InputPort, OutputPort, Scanned};

    #[test]
    fn decimals_become_numbers() {
        check!(scan_line("3.5\n") == Scanned::Number(3.5));
        check!(scan_line("42") == Scanned::Number(42.0));
        check!(scan_line("7.\n") == Scanned::Number(7.0));
        check!(scan_line(".25\n") == Scanned::Number(0.25));
        check!(scan_line(".\n") == Scanned::Number(0.0));
    }

    #[test]
    fn everything_else_is_text() {
        check!(scan_line("hello\n") == Scanned::Text("hello".into()));
        check!(scan_line("\n") == Scanned::Text("".into()));
        check!(scan_line("-1\n") == Scanned::Text("-1".into()));
        check!(scan_line("1.2.3\n") == Scanned::Text("1.2.3".into()));
        check!(scan_line("12 \n") == Scanned::Text("12 ".into()));
        check!(scan_line("1e5\n") == Scanned::Text("1e5".into()));
        // only a bare newline may follow a number
        check!(scan_line("7.\r\n") == Scanned::Text("7.".into()));
    }

    #[test]
    fn lines_are_read_one_at_a_time() {
        let port = InputPort::text("first\nsecond");
        check!(port.read_line(64).unwrap() == Some("first\n".into()));
        check!(port.read_line(64).unwrap() == Some("second".into()));
        check!(port.read_line(64).unwrap() == None);
    }

    #[test]
    fn long_lines_are_cut_at_the_limit() {
        let port = InputPort::text("abcdefgh\n");
        check!(port.read_line(3).unwrap() == Some("abc".into()));
        check!(port.read_line(64).unwrap() == Some("defgh\n".into()));
    }

    #[test]
    fn buffer_port_collects_output() {
        let (mut port, buffer) = OutputPort::buffer();
        write!(port, "x={}", 1).unwrap();
        check!(buffer.lock().unwrap().as_slice() == b"x=1");
    }
}
