//! Serial channel to the modem.

use embedded_io_async::{Read, Write};

use crate::error::Error;
use crate::fmt::LossyStr;

/// Owns both directions of the serial link. The runner splits it so that
/// reading and writing can progress concurrently.
pub struct SerialTransport<R: Read, W: Write> {
    rx: RxHalf<R>,
    tx: TxHalf<W>,
}

impl<R: Read, W: Write> SerialTransport<R, W> {
    pub fn new(rx: R, tx: W) -> Self {
        Self {
            rx: RxHalf { inner: rx },
            tx: TxHalf { inner: tx },
        }
    }

    pub fn split(&mut self) -> (&mut RxHalf<R>, &mut TxHalf<W>) {
        (&mut self.rx, &mut self.tx)
    }
}

pub struct RxHalf<R: Read> {
    inner: R,
}

impl<R: Read> RxHalf<R> {
    /// Reads whatever is available. A closed channel is a transport failure.
    pub async fn receive(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        match self.inner.read(buf).await {
            Ok(0) => {
                warn!("Serial channel closed");
                Err(Error::Transport)
            }
            Ok(n) => Ok(n),
            Err(_) => {
                warn!("Serial read failed");
                Err(Error::Transport)
            }
        }
    }
}

pub struct TxHalf<W: Write> {
    inner: W,
}

impl<W: Write> TxHalf<W> {
    pub async fn send(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.inner.write_all(bytes).await.map_err(|_| {
            warn!("Serial write failed: {:?}", LossyStr(bytes));
            Error::Transport
        })?;
        self.inner.flush().await.map_err(|_| {
            warn!("Serial flush failed");
            Error::Transport
        })
    }
}
