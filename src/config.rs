use embedded_hal::digital::{ErrorType, OutputPin, PinState};

/// Reset line for boards that drive `RESET_N` through an inverter. Levels
/// are flipped before they reach the wrapped pin, and its errors are passed
/// through so that a failing pin still aborts the reset.
pub struct InvertedPin<P: OutputPin>(pub P);

impl<P: OutputPin> ErrorType for InvertedPin<P> {
    type Error = P::Error;
}

impl<P: OutputPin> OutputPin for InvertedPin<P> {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.0.set_high()
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.0.set_low()
    }

    fn set_state(&mut self, state: PinState) -> Result<(), Self::Error> {
        self.0.set_state(!state)
    }
}

/// Where the byte count of an announced binary segment comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentLength {
    /// Zero based index of the comma separated field after the prefix.
    Field(u8),
    /// Known up front, e.g. from a previous ring.
    Fixed(usize),
}

/// A line prefix after which the modem sends a raw segment of bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryAnnouncer {
    pub prefix: &'static [u8],
    pub length: SegmentLength,
}

impl BinaryAnnouncer {
    pub const fn field(prefix: &'static [u8], index: u8) -> Self {
        Self {
            prefix,
            length: SegmentLength::Field(index),
        }
    }

    pub const fn fixed(prefix: &'static [u8], len: usize) -> Self {
        Self {
            prefix,
            length: SegmentLength::Fixed(len),
        }
    }

    /// Number of raw bytes announced by `line`, if any.
    pub fn segment_len(&self, line: &[u8]) -> Option<usize> {
        let rest = line.strip_prefix(self.prefix)?;
        let len = match self.length {
            SegmentLength::Fixed(len) => len,
            SegmentLength::Field(index) => {
                let field = rest.split(|b| *b == b',').nth(index as usize)?;
                let field = core::str::from_utf8(field).ok()?;
                field.trim().trim_matches('"').parse().ok()?
            }
        };
        (len > 0).then_some(len)
    }
}

/// `+SQNSRECV: <connId>,<length>` followed by the socket payload.
pub const SOCKET_RECV: BinaryAnnouncer = BinaryAnnouncer::field(b"+SQNSRECV: ", 1);

/// Board specific settings of the driver.
///
/// Return `None` from `reset_pin` when `RESET_N` is not wired up, the module
/// is then restarted over AT. Wrap the pin in [`InvertedPin`] when the reset
/// line goes through an inverter.
pub trait ModemConfig {
    type ResetPin: OutputPin;

    /// Prefixes after which the modem switches to raw byte mode.
    const BINARY_ANNOUNCERS: &'static [BinaryAnnouncer] = &[SOCKET_RECV];

    /// Log every line written to and read from the modem.
    const UART_DEBUG: bool = false;

    fn reset_pin(&mut self) -> Option<&mut Self::ResetPin>;
}
