pub mod control;
pub mod dispatcher;
pub mod queue;
mod reset;
pub mod resources;
pub mod runner;
pub mod sleep;
pub mod state;

use core::cell::RefCell;

use embassy_sync::blocking_mutex::{raw::NoopRawMutex, Mutex};
use embedded_io_async::{Read, Write};

use crate::config::ModemConfig;

use self::control::Control;
use self::dispatcher::Dispatcher;
use self::queue::TransactionQueue;
use self::reset::ResetTracker;
use self::resources::Resources;
use self::runner::Runner;
use self::state::StateTracker;

/// Everything the runner and the control handles share. Only ever touched
/// inside short, non-awaiting critical sections.
pub(crate) struct Engine<const Q: usize> {
    pub(crate) queue: TransactionQueue<Q>,
    pub(crate) state: StateTracker,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) uart_debug: bool,
    pub(crate) reset: ResetTracker,
}

impl<const Q: usize> Engine<Q> {
    fn new() -> Self {
        Self {
            queue: TransactionQueue::new(),
            state: StateTracker::new(),
            dispatcher: Dispatcher::new(),
            uart_debug: false,
            reset: ResetTracker::new(),
        }
    }
}

pub(crate) type Shared<const Q: usize> = Mutex<NoopRawMutex, RefCell<Engine<Q>>>;

/// Creates the control handle and the runner of an engine.
///
/// `N` is the size of the ingress line buffer. The runner has to be polled
/// continuously, in its own task, for any command to make progress.
pub fn new<'d, R, W, C, const Q: usize, const N: usize>(
    resources: &'d mut Resources<Q>,
    rx: R,
    tx: W,
    config: C,
) -> (Control<'d, Q>, Runner<'d, R, W, C, Q, N>)
where
    R: Read,
    W: Write,
    C: ModemConfig,
{
    resources.shared.get_mut().get_mut().uart_debug = C::UART_DEBUG;
    let shared = &resources.shared;

    (Control::new(shared), Runner::new(shared, rx, tx, config))
}
