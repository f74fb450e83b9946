//! In-memory modem for the engine tests.

extern crate std;

use core::cell::{Cell, RefCell};
use core::convert::Infallible;
use std::boxed::Box;
use std::rc::Rc;
use std::sync::{Arc, Once};
use std::task::{Wake, Waker};
use std::vec::Vec;

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::pipe::Pipe;
use embedded_hal::digital::{ErrorType, OutputPin};
use embedded_io_async::ErrorKind;

use crate::config::ModemConfig;

const WIRE_SIZE: usize = 2048;

type Wire = Pipe<NoopRawMutex, WIRE_SIZE>;

static INIT: Once = Once::new();

pub fn init_log() {
    INIT.call_once(|| {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug"))
            .is_test(true)
            .init();
    });
}

pub fn noop_waker() -> Waker {
    struct Noop;
    impl Wake for Noop {
        fn wake(self: Arc<Self>) {}
    }
    Waker::from(Arc::new(Noop))
}

/// Host side, receiving.
pub struct WireRx {
    wire: &'static Wire,
    fault: Rc<Cell<bool>>,
}

/// Host side, transmitting.
pub struct WireTx {
    wire: &'static Wire,
    fault: Rc<Cell<bool>>,
}

impl embedded_io_async::ErrorType for WireRx {
    type Error = ErrorKind;
}

impl embedded_io_async::Read for WireRx {
    /// A pending fault swallows the bytes of the read it fails.
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let n = self.wire.read(buf).await;
        if self.fault.take() {
            return Err(ErrorKind::Other);
        }
        Ok(n)
    }
}

impl embedded_io_async::ErrorType for WireTx {
    type Error = ErrorKind;
}

impl embedded_io_async::Write for WireTx {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        if self.fault.take() {
            return Err(ErrorKind::BrokenPipe);
        }
        Ok(self.wire.write(buf).await)
    }
}

/// Modem side of the wire.
pub struct Modem {
    to_host: &'static Wire,
    from_host: &'static Wire,
    rx_fault: Rc<Cell<bool>>,
    tx_fault: Rc<Cell<bool>>,
}

impl Modem {
    /// Fails the next read of the host.
    pub fn break_host_read(&self) {
        self.rx_fault.set(true);
    }

    /// Fails the next write of the host.
    pub fn break_host_write(&self) {
        self.tx_fault.set(true);
    }

    pub async fn send(&self, mut bytes: &[u8]) {
        while !bytes.is_empty() {
            let n = self.to_host.write(bytes).await;
            bytes = &bytes[n..];
        }
    }

    /// Next line written by the host, without its terminator.
    pub async fn line(&self) -> Vec<u8> {
        let mut line = Vec::new();
        loop {
            let mut byte = [0u8; 1];
            self.from_host.read(&mut byte).await;
            match byte[0] {
                b'\n' => break,
                b => line.push(b),
            }
        }
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        line
    }

    pub async fn expect(&self, expected: &[u8]) {
        let line = self.line().await;
        assert_eq!(
            std::string::String::from_utf8_lossy(&line),
            std::string::String::from_utf8_lossy(expected)
        );
    }

    pub async fn read_exact(&self, len: usize) -> Vec<u8> {
        let mut data = std::vec![0u8; len];
        let mut filled = 0;
        while filled < len {
            filled += self.from_host.read(&mut data[filled..]).await;
        }
        data
    }

    /// Whether the host wrote anything not read yet.
    pub fn host_wrote(&self) -> bool {
        !self.from_host.is_empty()
    }
}

pub fn wire() -> (WireRx, WireTx, Modem) {
    let to_host: &'static Wire = Box::leak(Box::new(Pipe::new()));
    let from_host: &'static Wire = Box::leak(Box::new(Pipe::new()));
    let rx_fault = Rc::new(Cell::new(false));
    let tx_fault = Rc::new(Cell::new(false));
    (
        WireRx {
            wire: to_host,
            fault: rx_fault.clone(),
        },
        WireTx {
            wire: from_host,
            fault: tx_fault.clone(),
        },
        Modem {
            to_host,
            from_host,
            rx_fault,
            tx_fault,
        },
    )
}

/// Records every level the pin was driven to.
#[derive(Clone, Default)]
pub struct RecordingPin(pub Rc<RefCell<Vec<bool>>>);

impl RecordingPin {
    pub fn levels(&self) -> Vec<bool> {
        self.0.borrow().clone()
    }
}

impl ErrorType for RecordingPin {
    type Error = Infallible;
}

impl OutputPin for RecordingPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.0.borrow_mut().push(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.0.borrow_mut().push(true);
        Ok(())
    }
}

#[derive(Default)]
pub struct TestConfig {
    pub reset_pin: Option<RecordingPin>,
}

impl ModemConfig for TestConfig {
    type ResetPin = RecordingPin;

    const UART_DEBUG: bool = true;

    fn reset_pin(&mut self) -> Option<&mut Self::ResetPin> {
        self.reset_pin.as_mut()
    }
}
