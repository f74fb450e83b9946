use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;

use super::{Engine, Shared};

/// Memory backing one engine instance. Must outlive the [`Control`] and
/// [`Runner`] created from it, typically by living in a `static`.
///
/// `QUEUE_DEPTH` bounds both the FIFO and the transaction pool.
///
/// [`Control`]: super::control::Control
/// [`Runner`]: super::runner::Runner
pub struct Resources<const QUEUE_DEPTH: usize> {
    pub(crate) shared: Shared<QUEUE_DEPTH>,
}

impl<const QUEUE_DEPTH: usize> Default for Resources<QUEUE_DEPTH> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const QUEUE_DEPTH: usize> Resources<QUEUE_DEPTH> {
    pub fn new() -> Self {
        Self {
            shared: Mutex::new(RefCell::new(Engine::new())),
        }
    }
}
