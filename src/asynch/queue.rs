//! Transaction pool and FIFO.
//!
//! Every submitted command occupies one slot until its result is taken by
//! the caller, or until completion when the caller stopped waiting. Slots
//! are handed to the writer strictly in submission order and only one of
//! them is ever active.

use core::task::{Context, Poll};

use embassy_sync::waitqueue::WakerRegistration;
use heapless::{Deque, Vec};

use crate::command::{Command, CommandKind, CommandMeta, Reply};
use crate::error::Error;
use crate::fmt::LossyStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransactionState {
    Queued,
    Sent,
    AwaitingReply,
    Completed,
    TimedOut,
    Failed,
}

impl TransactionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::TimedOut | Self::Failed)
    }

    pub fn is_in_flight(self) -> bool {
        matches!(self, Self::Sent | Self::AwaitingReply)
    }
}

/// What woke the writer while it waits on the active transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ActiveEvent {
    Done,
    Prompt,
}

const ECHO_HEAD: usize = 32;

// Enough of the command line to recognise its echo.
#[derive(Default)]
struct Echo {
    head: Vec<u8, ECHO_HEAD>,
    len: usize,
}

impl Echo {
    fn of(at_cmd: &[u8]) -> Self {
        let n = at_cmd.len().min(ECHO_HEAD);
        Self {
            head: Vec::from_slice(&at_cmd[..n]).unwrap_or_default(),
            len: at_cmd.len(),
        }
    }

    // The echo ends in the `\r` of the command line.
    fn matches(&self, mut line: &[u8]) -> bool {
        while let [rest @ .., b'\r'] = line {
            line = rest;
        }
        self.len > 0 && line.len() == self.len && line.starts_with(&self.head)
    }
}

struct Slot {
    // `None` while the slot is free.
    state: Option<TransactionState>,
    meta: Option<CommandMeta>,
    // Taken by the writer on activation.
    command: Option<Command>,
    echo: Echo,
    reply: Reply,
    result: Option<Result<(), Error>>,
    abandoned: bool,
    prompt: bool,
    data_sent: bool,
    waker: WakerRegistration,
}

impl Slot {
    fn new() -> Self {
        Self {
            state: None,
            meta: None,
            command: None,
            echo: Echo::default(),
            reply: Reply::default(),
            result: None,
            abandoned: false,
            prompt: false,
            data_sent: false,
            waker: WakerRegistration::new(),
        }
    }

    fn release(&mut self) {
        self.state = None;
        self.meta = None;
        self.command = None;
        self.echo = Echo::default();
        self.reply.clear();
        self.result = None;
        self.abandoned = false;
        self.prompt = false;
        self.data_sent = false;
    }
}

pub struct TransactionQueue<const N: usize> {
    slots: [Slot; N],
    fifo: Deque<usize, N>,
    active: Option<usize>,
    driver_waker: WakerRegistration,
}

impl<const N: usize> Default for TransactionQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> TransactionQueue<N> {
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| Slot::new()),
            fifo: Deque::new(),
            active: None,
            driver_waker: WakerRegistration::new(),
        }
    }

    /// Queued transactions plus the active one.
    pub fn pending(&self) -> usize {
        self.fifo.len() + usize::from(self.active.is_some())
    }

    /// The active transaction counts against the queue depth, so a full
    /// queue is reported before the pool runs dry.
    pub fn submit(&mut self, command: Command) -> Result<usize, Error> {
        if self.pending() >= N {
            return Err(Error::QueueFull);
        }
        let idx = self
            .slots
            .iter()
            .position(|s| s.state.is_none())
            .ok_or(Error::PoolExhausted)?;

        let slot = &mut self.slots[idx];
        slot.release();
        slot.state = Some(TransactionState::Queued);
        slot.meta = Some(*command.meta());
        slot.echo = Echo::of(command.at_cmd());
        slot.command = Some(command);

        self.fifo.push_back(idx).map_err(|_| Error::QueueFull)?;
        self.driver_waker.wake();
        Ok(idx)
    }

    pub fn state(&self, idx: usize) -> Option<TransactionState> {
        self.slots.get(idx).and_then(|s| s.state)
    }

    pub fn active(&self) -> Option<usize> {
        self.active
    }

    /// Number of transactions sent but not yet completed. Never above one.
    pub fn in_flight(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.state.map(|s| s.is_in_flight()).unwrap_or(false))
            .count()
    }

    /// Nothing queued and nothing in flight.
    pub fn is_idle(&self) -> bool {
        self.active.is_none() && self.fifo.is_empty()
    }

    pub(crate) fn register_driver(&mut self, cx: &mut Context<'_>) {
        self.driver_waker.register(cx.waker());
    }

    pub(crate) fn wake_driver(&mut self) {
        self.driver_waker.wake();
    }

    /// Promotes the head of the FIFO unless a transaction is active, and
    /// hands its command to the writer.
    pub(crate) fn activate_next(&mut self) -> Option<(usize, Command)> {
        if self.active.is_some() {
            return None;
        }
        let idx = self.fifo.pop_front()?;
        let slot = &mut self.slots[idx];
        slot.state = Some(TransactionState::Sent);
        self.active = Some(idx);
        match slot.command.take() {
            Some(command) => Some((idx, command)),
            None => {
                // Unreachable in practice: a queued slot always holds its command.
                self.complete(idx, Err(Error::Transport));
                None
            }
        }
    }

    pub(crate) fn mark_awaiting(&mut self, idx: usize) {
        if self.active == Some(idx) {
            self.slots[idx].state = Some(TransactionState::AwaitingReply);
        }
    }

    /// Routing rules of the transaction that may currently receive reply
    /// lines. Replies can overtake the end of the write, so this includes a
    /// transaction still in `Sent`.
    pub(crate) fn awaiting(&self) -> Option<&CommandMeta> {
        let slot = &self.slots[self.active?];
        match (slot.state, slot.meta.as_ref()) {
            (Some(state), Some(meta)) if state.is_in_flight() && meta.kind != CommandKind::Tx => {
                Some(meta)
            }
            _ => None,
        }
    }

    pub(crate) fn is_echo(&self, line: &[u8]) -> bool {
        self.active
            .map(|idx| self.slots[idx].echo.matches(line))
            .unwrap_or(false)
    }

    /// Appends a fragment to the reply of the active transaction. Failing
    /// that completes it with `ParseOverflow`.
    pub(crate) fn append_reply(&mut self, fragment: &[u8]) {
        let Some(idx) = self.active else {
            return;
        };
        if self.slots[idx].reply.push_fragment(fragment).is_err() {
            warn!("Reply overflow, dropping {:?}", LossyStr(fragment));
            self.complete(idx, Err(Error::ParseOverflow));
        }
    }

    /// A data prompt arrived. The writer is told once per transaction.
    pub(crate) fn signal_prompt(&mut self) {
        let Some(idx) = self.active else {
            return;
        };
        let slot = &mut self.slots[idx];
        let data_cmd = slot.meta.map(|m| m.kind) == Some(CommandKind::DataTxWait);
        if data_cmd && !slot.data_sent {
            slot.prompt = true;
            self.driver_waker.wake();
        }
    }

    pub(crate) fn complete_active(&mut self, result: Result<(), Error>) {
        if let Some(idx) = self.active {
            self.complete(idx, result);
        }
    }

    pub(crate) fn fail_active(&mut self, err: Error) {
        self.complete_active(Err(err));
    }

    /// Moves a transaction to its terminal state. Later calls for the same
    /// transaction are ignored.
    pub(crate) fn complete(&mut self, idx: usize, result: Result<(), Error>) {
        let slot = &mut self.slots[idx];
        match slot.state {
            Some(state) if !state.is_terminal() => {}
            _ => return,
        }

        let state = match result {
            Ok(()) => TransactionState::Completed,
            Err(Error::Timeout) => TransactionState::TimedOut,
            Err(_) => TransactionState::Failed,
        };
        match result {
            Ok(()) => debug!("Transaction {} completed", idx),
            Err(e) => warn!("Transaction {} failed: {:?}", idx, e),
        }

        slot.state = Some(state);
        slot.result = Some(result);
        slot.command = None;
        slot.prompt = false;

        if self.active == Some(idx) {
            self.active = None;
        }
        if slot.abandoned {
            slot.release();
        } else {
            slot.waker.wake();
        }
        self.driver_waker.wake();
    }

    /// Polled by the writer while `idx` is active.
    pub(crate) fn poll_active(&mut self, idx: usize, cx: &mut Context<'_>) -> Poll<ActiveEvent> {
        if self.active != Some(idx) {
            return Poll::Ready(ActiveEvent::Done);
        }
        let slot = &mut self.slots[idx];
        if slot.prompt {
            slot.prompt = false;
            slot.data_sent = true;
            return Poll::Ready(ActiveEvent::Prompt);
        }
        self.driver_waker.register(cx.waker());
        Poll::Pending
    }

    /// Polled by the caller. Taking the result frees the slot.
    pub(crate) fn poll_result(
        &mut self,
        idx: usize,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Reply, Error>> {
        let slot = &mut self.slots[idx];
        match slot.result.take() {
            Some(result) => {
                let reply = core::mem::take(&mut slot.reply);
                slot.release();
                Poll::Ready(result.map(|()| reply))
            }
            None => {
                slot.waker.register(cx.waker());
                Poll::Pending
            }
        }
    }

    /// The caller stopped waiting. The transaction still runs to completion.
    pub(crate) fn abandon(&mut self, idx: usize) {
        let slot = &mut self.slots[idx];
        if slot.state.is_none() {
            return;
        }
        if slot.result.is_some() {
            slot.release();
        } else {
            slot.abandoned = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::noop_waker;

    fn cmd(s: &[u8]) -> Command {
        Command::new(s).unwrap()
    }

    #[test]
    fn fifo_order_and_single_active() {
        let mut q = TransactionQueue::<4>::new();
        let a = q.submit(cmd(b"AT+A")).unwrap();
        let b = q.submit(cmd(b"AT+B")).unwrap();

        let (idx, c) = q.activate_next().unwrap();
        assert_eq!(idx, a);
        assert_eq!(c.at_cmd(), b"AT+A");
        assert!(q.activate_next().is_none());
        assert_eq!(q.in_flight(), 1);

        q.complete(a, Ok(()));
        assert_eq!(q.state(a), Some(TransactionState::Completed));
        let (idx, _) = q.activate_next().unwrap();
        assert_eq!(idx, b);
        assert_eq!(q.in_flight(), 1);
    }

    #[test]
    fn queue_full() {
        let mut q = TransactionQueue::<2>::new();
        q.submit(cmd(b"AT")).unwrap();
        q.submit(cmd(b"AT")).unwrap();
        assert_eq!(q.submit(cmd(b"AT")).err(), Some(Error::QueueFull));
    }

    #[test]
    fn queue_full_with_transaction_in_flight() {
        let mut q = TransactionQueue::<4>::new();
        q.submit(cmd(b"AT+A")).unwrap();
        q.activate_next().unwrap();
        for _ in 0..3 {
            q.submit(cmd(b"AT")).unwrap();
        }
        assert_eq!(q.pending(), 4);
        assert_eq!(q.submit(cmd(b"AT")).err(), Some(Error::QueueFull));

        q.complete_active(Ok(()));
        assert_eq!(q.submit(cmd(b"AT")).err(), Some(Error::PoolExhausted));
    }

    #[test]
    fn pool_exhausted_by_unclaimed_results() {
        let mut q = TransactionQueue::<2>::new();
        for _ in 0..2 {
            q.submit(cmd(b"AT")).unwrap();
            let (idx, _) = q.activate_next().unwrap();
            q.complete(idx, Ok(()));
        }
        assert_eq!(q.submit(cmd(b"AT")).err(), Some(Error::PoolExhausted));
    }

    #[test]
    fn completes_once() {
        let mut q = TransactionQueue::<2>::new();
        let idx = q.submit(cmd(b"AT")).unwrap();
        q.activate_next().unwrap();
        q.mark_awaiting(idx);
        q.complete(idx, Err(Error::Timeout));
        q.complete(idx, Ok(()));
        assert_eq!(q.state(idx), Some(TransactionState::TimedOut));
        let waker = noop_waker();
        assert_eq!(
            q.poll_result(idx, &mut Context::from_waker(&waker)),
            Poll::Ready(Err(Error::Timeout))
        );
        assert_eq!(q.state(idx), None);
    }

    #[test]
    fn abandoned_slot_released_at_completion() {
        let mut q = TransactionQueue::<1>::new();
        let idx = q.submit(cmd(b"AT")).unwrap();
        q.abandon(idx);
        assert_eq!(q.state(idx), Some(TransactionState::Queued));

        q.activate_next().unwrap();
        q.complete(idx, Ok(()));
        assert_eq!(q.state(idx), None);
        assert!(q.submit(cmd(b"AT")).is_ok());
    }

    #[test]
    fn reply_overflow_fails_transaction() {
        let mut q = TransactionQueue::<1>::new();
        let idx = q.submit(cmd(b"AT")).unwrap();
        q.activate_next().unwrap();
        q.mark_awaiting(idx);
        q.append_reply(&[b'x'; crate::command::MAX_REPLY_LEN + 1]);
        assert_eq!(q.state(idx), Some(TransactionState::Failed));
        let waker = noop_waker();
        assert_eq!(
            q.poll_result(idx, &mut Context::from_waker(&waker)),
            Poll::Ready(Err(Error::ParseOverflow))
        );
    }

    #[test]
    fn echo_is_recognised() {
        let mut q = TransactionQueue::<1>::new();
        q.submit(cmd(b"AT+CFUN?")).unwrap();
        q.activate_next().unwrap();
        assert!(q.is_echo(b"AT+CFUN?"));
        assert!(q.is_echo(b"AT+CFUN?\r"));
        assert!(!q.is_echo(b"+CFUN: 1"));
    }
}
