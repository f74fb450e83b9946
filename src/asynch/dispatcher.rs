//! Routing tables for unsolicited frames.
//!
//! Ring handlers are looked up by line prefix and all of them see a matching
//! frame, in registration order. Application handlers take precedence over
//! everything else and the first match consumes the frame.

use heapless::Vec;

use crate::error::Error;
use crate::fmt::LossyStr;
use crate::ingress::Frame;

pub const MAX_RING_HANDLERS: usize = 8;
pub const MAX_APP_HANDLERS: usize = 4;

/// Returned by a handler that could not process a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RingError;

/// Receives unsolicited frames. Called on the runner task, must not block.
pub trait RingHandler {
    fn on_ring(&self, frame: &Frame<'_>) -> Result<(), RingError>;
}

pub type HandlerRef = &'static dyn RingHandler;

/// Handlers resolved for one frame.
pub type HandlerSet = Vec<HandlerRef, MAX_RING_HANDLERS>;

#[derive(Clone, Copy)]
struct Registration {
    pattern: &'static [u8],
    handler: HandlerRef,
}

// Zero-sized handlers of different types may share an address, so the
// vtable is compared along with it.
fn same_handler(a: HandlerRef, b: HandlerRef) -> bool {
    core::ptr::eq(a as *const dyn RingHandler, b as *const dyn RingHandler)
}

pub struct Dispatcher {
    rings: Vec<Registration, MAX_RING_HANDLERS>,
    app: Vec<Registration, MAX_APP_HANDLERS>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub const fn new() -> Self {
        Self {
            rings: Vec::new(),
            app: Vec::new(),
        }
    }

    pub fn register(&mut self, pattern: &'static [u8], handler: HandlerRef) -> Result<(), Error> {
        self.rings
            .push(Registration { pattern, handler })
            .map_err(|_| Error::PoolExhausted)
    }

    /// Removes every registration of `handler`. Returns how many there were.
    pub fn unregister(&mut self, handler: HandlerRef) -> usize {
        let before = self.rings.len();
        self.rings.retain(|r| !same_handler(r.handler, handler));
        before - self.rings.len()
    }

    pub fn register_app(&mut self, pattern: &'static [u8], handler: HandlerRef) -> Result<(), Error> {
        self.app
            .push(Registration { pattern, handler })
            .map_err(|_| Error::PoolExhausted)
    }

    pub fn unregister_app(&mut self, handler: HandlerRef) -> usize {
        let before = self.app.len();
        self.app.retain(|r| !same_handler(r.handler, handler));
        before - self.app.len()
    }

    pub fn app_handler(&self, line: &[u8]) -> Option<HandlerRef> {
        self.app
            .iter()
            .find(|r| line.starts_with(r.pattern))
            .map(|r| r.handler)
    }

    /// Whether any ring handler would receive `line`.
    pub fn claims(&self, line: &[u8]) -> bool {
        self.rings.iter().any(|r| line.starts_with(r.pattern))
    }

    pub fn matching(&self, line: &[u8]) -> HandlerSet {
        self.rings
            .iter()
            .filter(|r| line.starts_with(r.pattern))
            .map(|r| r.handler)
            .collect()
    }
}

/// Runs each handler in turn. A failing handler does not keep the frame
/// from the others.
pub(crate) fn deliver(handlers: &[HandlerRef], frame: &Frame<'_>) {
    for handler in handlers {
        if handler.on_ring(frame).is_err() {
            warn!("Ring handler failed on {:?}", LossyStr(frame.data));
        }
    }
}
