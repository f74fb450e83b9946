//! Splits the byte stream coming from the modem into frames.
//!
//! Lines end at `\r\n`. A prompt (`> ` or `>>>`) at the start of a line is a
//! frame of its own. After a line announcing a binary segment the parser
//! switches to raw mode and hands out exactly the announced number of bytes,
//! whatever they contain.

use heapless::Vec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameKind {
    Line,
    Prompt,
    Binary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    pub kind: FrameKind,
    pub data: &'a [u8],
}

impl<'a> Frame<'a> {
    pub const fn line(data: &'a [u8]) -> Self {
        Self {
            kind: FrameKind::Line,
            data,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Event<'a> {
    Frame(Frame<'a>),
    /// A line or binary segment did not fit the buffer. Its remaining bytes
    /// are dropped.
    Overflow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Text,
    // A `\r` was seen; the line ends if `\n` follows.
    CarriageReturn,
    Raw(usize),
    DiscardLine,
    DiscardRaw(usize),
}

pub struct LineParser<const N: usize> {
    buf: Vec<u8, N>,
    mode: Mode,
    // The buffer still holds the last emitted frame.
    emitted: bool,
}

impl<const N: usize> Default for LineParser<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> LineParser<N> {
    pub const fn new() -> Self {
        Self {
            buf: Vec::new(),
            mode: Mode::Text,
            emitted: false,
        }
    }

    /// Switch to raw mode for the next `len` bytes. Called right after the
    /// announcing line was emitted.
    pub fn expect_binary(&mut self, len: usize) {
        if len > 0 {
            self.mode = Mode::Raw(len);
        }
    }

    pub fn reset(&mut self) {
        self.buf.clear();
        self.mode = Mode::Text;
        self.emitted = false;
    }

    pub fn push(&mut self, byte: u8) -> Option<Event<'_>> {
        if self.emitted {
            self.buf.clear();
            self.emitted = false;
        }

        match self.mode {
            Mode::Raw(remaining) => {
                if self.buf.push(byte).is_err() {
                    self.buf.clear();
                    self.mode = match remaining - 1 {
                        0 => Mode::Text,
                        left => Mode::DiscardRaw(left),
                    };
                    return Some(Event::Overflow);
                }
                if remaining == 1 {
                    self.mode = Mode::Text;
                    return Some(self.emit(FrameKind::Binary));
                }
                self.mode = Mode::Raw(remaining - 1);
                None
            }
            Mode::DiscardRaw(remaining) => {
                self.mode = match remaining - 1 {
                    0 => Mode::Text,
                    left => Mode::DiscardRaw(left),
                };
                None
            }
            Mode::DiscardLine => {
                if byte == b'\n' {
                    self.mode = Mode::Text;
                }
                None
            }
            Mode::CarriageReturn => match byte {
                b'\n' => {
                    self.mode = Mode::Text;
                    if self.buf.is_empty() {
                        None
                    } else {
                        Some(self.emit(FrameKind::Line))
                    }
                }
                // A lone `\r` is data
                b'\r' => self.append(b'\r'),
                other => {
                    self.mode = Mode::Text;
                    if let Some(overflow) = self.append(b'\r') {
                        return Some(overflow);
                    }
                    self.append(other)
                }
            },
            Mode::Text => match byte {
                b'\r' => {
                    self.mode = Mode::CarriageReturn;
                    None
                }
                b'\n' if self.buf.is_empty() => None,
                b' ' if self.buf == b">" => self.prompt(byte),
                b'>' if self.buf == b">>" => self.prompt(byte),
                other => self.append(other),
            },
        }
    }

    fn append(&mut self, byte: u8) -> Option<Event<'static>> {
        if self.buf.push(byte).is_err() {
            self.buf.clear();
            self.mode = Mode::DiscardLine;
            return Some(Event::Overflow);
        }
        None
    }

    fn prompt(&mut self, byte: u8) -> Option<Event<'_>> {
        if let Some(overflow) = self.append(byte) {
            return Some(overflow);
        }
        Some(self.emit(FrameKind::Prompt))
    }

    fn emit(&mut self, kind: FrameKind) -> Event<'_> {
        self.emitted = true;
        Event::Frame(Frame {
            kind,
            data: &self.buf,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    enum Owned {
        Frame(FrameKind, std::vec::Vec<u8>),
        Overflow,
    }

    // Feeds `input` byte by byte. `announce` is consulted for every line and
    // returns the length of the binary segment it announces.
    fn parse<const N: usize>(
        parser: &mut LineParser<N>,
        input: &[u8],
        announce: impl Fn(&[u8]) -> Option<usize>,
    ) -> std::vec::Vec<Owned> {
        let mut out = std::vec::Vec::new();
        for &b in input {
            let mut binary = None;
            match parser.push(b) {
                None => {}
                Some(Event::Overflow) => out.push(Owned::Overflow),
                Some(Event::Frame(f)) => {
                    if f.kind == FrameKind::Line {
                        binary = announce(f.data);
                    }
                    out.push(Owned::Frame(f.kind, f.data.to_vec()));
                }
            }
            if let Some(len) = binary {
                parser.expect_binary(len);
            }
        }
        out
    }

    fn line(s: &[u8]) -> Owned {
        Owned::Frame(FrameKind::Line, s.to_vec())
    }

    #[test]
    fn splits_lines() {
        let mut p = LineParser::<64>::new();
        let frames = parse(&mut p, b"\r\nOK\r\n+CEREG: 5\r\n\r\nERROR\r\n", |_| None);
        assert_eq!(
            frames,
            vec![line(b"OK"), line(b"+CEREG: 5"), line(b"ERROR")]
        );
    }

    #[test]
    fn lone_carriage_return_is_data() {
        let mut p = LineParser::<64>::new();
        let frames = parse(&mut p, b"a\rb\r\r\n", |_| None);
        assert_eq!(frames, vec![line(b"a\rb\r")]);
    }

    #[test]
    fn prompts() {
        let mut p = LineParser::<64>::new();
        let frames = parse(&mut p, b"\r\n> OK\r\n>>>", |_| None);
        assert_eq!(
            frames,
            vec![
                Owned::Frame(FrameKind::Prompt, b"> ".to_vec()),
                line(b"OK"),
                Owned::Frame(FrameKind::Prompt, b">>>".to_vec()),
            ]
        );

        // Only at the start of a line
        let frames = parse(&mut p, b"a> b\r\n", |_| None);
        assert_eq!(frames, vec![line(b"a> b")]);
    }

    #[test]
    fn binary_segment_with_line_breaks() {
        let mut p = LineParser::<64>::new();
        let announce = |l: &[u8]| l.starts_with(b"+SQNSRECV: ").then_some(6);
        let frames = parse(&mut p, b"+SQNSRECV: 1,6\r\nab\r\ncd\r\nOK\r\n", announce);
        assert_eq!(
            frames,
            vec![
                line(b"+SQNSRECV: 1,6"),
                Owned::Frame(FrameKind::Binary, b"ab\r\ncd".to_vec()),
                line(b"OK"),
            ]
        );
    }

    #[test]
    fn line_overflow_resyncs() {
        let mut p = LineParser::<4>::new();
        let frames = parse(&mut p, b"TOOLONG\r\nOK\r\n", |_| None);
        assert_eq!(frames, vec![Owned::Overflow, line(b"OK")]);
    }

    #[test]
    fn binary_overflow_drops_segment() {
        let mut p = LineParser::<8>::new();
        let announce = |l: &[u8]| l.starts_with(b"+R").then_some(10);
        let frames = parse(&mut p, b"+R\r\n0123456789OK\r\n", announce);
        assert_eq!(frames, vec![line(b"+R"), Owned::Overflow, line(b"OK")]);
    }
}
