use core::future::poll_fn;
use core::task::{Context, Poll};

use embassy_futures::select::{select, Either};
use embassy_time::{with_timeout, Instant, Timer};
use embedded_hal::digital::OutputPin;
use embedded_io_async::{Read, Write};

use super::dispatcher::{deliver, HandlerRef, HandlerSet};
use super::queue::ActiveEvent;
use super::reset::ResetOutcome;
use super::{Engine, Shared};
use crate::command::{status, Command, CommandKind, Status};
use crate::config::{BinaryAnnouncer, ModemConfig};
use crate::error::Error;
use crate::fmt::LossyStr;
use crate::ingress::{Event, Frame, FrameKind, LineParser};
use crate::module_timing::{reset_time, rx_backoff};
use crate::transport::{RxHalf, SerialTransport, TxHalf};

const RX_CHUNK: usize = 64;

/// Background runner for the modem.
///
/// You must call `.run()` in a background task for the modem to operate.
pub struct Runner<'d, R: Read, W: Write, C: ModemConfig, const Q: usize, const N: usize> {
    shared: &'d Shared<Q>,
    transport: SerialTransport<R, W>,
    config: C,
    parser: LineParser<N>,
}

impl<'d, R: Read, W: Write, C: ModemConfig, const Q: usize, const N: usize>
    Runner<'d, R, W, C, Q, N>
{
    pub(crate) fn new(shared: &'d Shared<Q>, rx: R, tx: W, config: C) -> Self {
        Self {
            shared,
            transport: SerialTransport::new(rx, tx),
            config,
            parser: LineParser::new(),
        }
    }

    /// Drives ingress and the writer side by side. Never returns.
    pub async fn run(&mut self) -> ! {
        let shared = self.shared;
        let (rx, tx) = self.transport.split();

        match select(
            ingress(shared, rx, &mut self.parser, C::BINARY_ANNOUNCERS),
            writer(shared, tx, &mut self.config),
        )
        .await
        {
            Either::First(never) | Either::Second(never) => never,
        }
    }
}

enum Next {
    Reset(u32),
    Command(usize, Command),
}

/// Destination of the last classified line. Binary segments follow the
/// line that announced them.
#[derive(Clone)]
enum Route {
    Application(HandlerRef),
    Transaction,
    Rings(HandlerSet),
    Unclassified,
}

impl<const Q: usize> Engine<Q> {
    fn poll_next(&mut self, cx: &mut Context<'_>) -> Poll<Next> {
        if self.queue.active().is_none() {
            if let Some(generation) = self.reset.take_request() {
                return Poll::Ready(Next::Reset(generation));
            }
        }
        if let Some((idx, command)) = self.queue.activate_next() {
            return Poll::Ready(Next::Command(idx, command));
        }
        self.queue.register_driver(cx);
        Poll::Pending
    }

    fn classify(&self, frame: &Frame<'_>) -> Route {
        let awaiting = self.queue.awaiting();

        if frame.kind == FrameKind::Prompt {
            return match awaiting {
                Some(meta) if meta.kind == CommandKind::DataTxWait => Route::Transaction,
                _ => Route::Unclassified,
            };
        }

        let line = frame.data;
        if let Some(handler) = self.dispatcher.app_handler(line) {
            return Route::Application(handler);
        }

        let claimed_by_ring = self.dispatcher.claims(line);
        if let Some(meta) = awaiting {
            if self.queue.is_echo(line) {
                trace!("Echo: {:?}", LossyStr(line));
                return Route::Unclassified;
            }
            if status(line).is_some() || meta.completes_on(line) {
                return Route::Transaction;
            }
            if !claimed_by_ring && meta.claims(line, false) {
                return Route::Transaction;
            }
        }

        if claimed_by_ring {
            return Route::Rings(self.dispatcher.matching(line));
        }
        Route::Unclassified
    }

    fn on_reply(&mut self, frame: &Frame<'_>) {
        let Some(meta) = self.queue.awaiting().copied() else {
            return;
        };

        match frame.kind {
            FrameKind::Prompt => self.queue.signal_prompt(),
            FrameKind::Binary => self.queue.append_reply(frame.data),
            FrameKind::Line => match status(frame.data) {
                // Intermediate OK of a command that completes on a later line
                Some(Status::Ok) if meta.complete_on.is_some() => {}
                Some(Status::Ok) => self.queue.complete_active(Ok(())),
                Some(Status::Error(e)) => self.queue.fail_active(Error::Protocol(e)),
                None => {
                    self.queue.append_reply(frame.data);
                    if meta.completes_on(frame.data) {
                        self.queue.complete_active(Ok(()));
                    }
                }
            },
        }
    }

    /// Length of the raw segment that follows `line`, if it announces one.
    fn announced_len(&self, line: &[u8], announcers: &[BinaryAnnouncer]) -> Option<usize> {
        if status(line).is_some() {
            return None;
        }
        self.queue
            .awaiting()
            .and_then(|meta| meta.binary)
            .and_then(|a| a.segment_len(line))
            .or_else(|| announcers.iter().find_map(|a| a.segment_len(line)))
    }

    /// Routes one frame. Returns the handlers to run once the engine is
    /// unlocked, and the length of a binary segment announced by the frame.
    fn process_frame(
        &mut self,
        frame: &Frame<'_>,
        route: &mut Route,
        announcers: &[BinaryAnnouncer],
    ) -> (HandlerSet, Option<usize>) {
        if self.uart_debug {
            info!("RX: {:?}", LossyStr(frame.data));
        }

        if frame.kind != FrameKind::Binary {
            *route = self.classify(frame);
        }
        let binary = match frame.kind {
            FrameKind::Line => self.announced_len(frame.data, announcers),
            _ => None,
        };

        let handlers = match route {
            Route::Application(handler) => {
                let mut set = HandlerSet::new();
                set.push(*handler).ok();
                return (set, binary);
            }
            Route::Transaction => {
                self.on_reply(frame);
                HandlerSet::new()
            }
            Route::Rings(set) => set.clone(),
            Route::Unclassified => {
                if frame.kind != FrameKind::Binary {
                    debug!("Unclassified frame: {:?}", LossyStr(frame.data));
                }
                HandlerSet::new()
            }
        };

        if frame.kind == FrameKind::Line {
            self.state.observe(frame.data);
        }
        (handlers, binary)
    }
}

async fn ingress<R: Read, const Q: usize, const N: usize>(
    shared: &Shared<Q>,
    rx: &mut RxHalf<R>,
    parser: &mut LineParser<N>,
    announcers: &[BinaryAnnouncer],
) -> ! {
    let mut buf = [0u8; RX_CHUNK];
    let mut route = Route::Unclassified;

    loop {
        let n = match rx.receive(&mut buf).await {
            Ok(n) => n,
            Err(e) => {
                shared.lock(|s| s.borrow_mut().queue.fail_active(e));
                parser.reset();
                Timer::after(rx_backoff()).await;
                continue;
            }
        };

        for &byte in &buf[..n] {
            let binary = match parser.push(byte) {
                None => None,
                Some(Event::Overflow) => {
                    warn!("Ingress line overflow, resynchronizing");
                    shared.lock(|s| s.borrow_mut().queue.fail_active(Error::ParseOverflow));
                    None
                }
                Some(Event::Frame(frame)) => {
                    let (handlers, binary) = shared.lock(|s| {
                        s.borrow_mut()
                            .process_frame(&frame, &mut route, announcers)
                    });
                    // Handlers may call back into the engine, so they run unlocked.
                    deliver(&handlers, &frame);
                    binary
                }
            };

            if let Some(len) = binary {
                parser.expect_binary(len);
            }
        }
    }
}

async fn writer<W: Write, C: ModemConfig, const Q: usize>(
    shared: &Shared<Q>,
    tx: &mut TxHalf<W>,
    config: &mut C,
) -> ! {
    loop {
        let next = poll_fn(|cx| shared.lock(|s| s.borrow_mut().poll_next(cx))).await;
        match next {
            Next::Reset(generation) => {
                let outcome = hard_reset(config).await;
                shared.lock(|s| {
                    let mut s = s.borrow_mut();
                    s.state.reset_mirror_state();
                    s.reset.pulsed(generation, outcome);
                });
            }
            Next::Command(idx, command) => execute(shared, tx, idx, &command).await,
        }
    }
}

async fn execute<W: Write, const Q: usize>(
    shared: &Shared<Q>,
    tx: &mut TxHalf<W>,
    idx: usize,
    command: &Command,
) {
    let meta = *command.meta();
    let complete = |result| shared.lock(|s| s.borrow_mut().queue.complete(idx, result));

    if meta.kind != CommandKind::Wait {
        if shared.lock(|s| s.borrow().uart_debug) {
            info!("TX: {:?}", LossyStr(command.at_cmd()));
        }
        let written = match tx.send(command.at_cmd()).await {
            Ok(()) => tx.send(command.terminator()).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            complete(Err(e));
            return;
        }
    }

    if meta.kind == CommandKind::Tx {
        complete(Ok(()));
        return;
    }

    shared.lock(|s| s.borrow_mut().queue.mark_awaiting(idx));
    let deadline = Instant::now() + meta.timeout;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let event = with_timeout(
            remaining,
            poll_fn(|cx| shared.lock(|s| s.borrow_mut().queue.poll_active(idx, cx))),
        )
        .await;

        match event {
            Ok(ActiveEvent::Done) => return,
            Ok(ActiveEvent::Prompt) => {
                if shared.lock(|s| s.borrow().uart_debug) {
                    info!("TX: {} bytes of data", command.data().len());
                }
                if let Err(e) = tx.send(command.data()).await {
                    complete(Err(e));
                    return;
                }
            }
            Err(_) => {
                warn!("Timeout waiting for reply to {:?}", LossyStr(command.at_cmd()));
                complete(Err(Error::Timeout));
                return;
            }
        }
    }
}

/// Pulses the reset line, if there is one.
async fn hard_reset<C: ModemConfig>(config: &mut C) -> ResetOutcome {
    warn!("Hard resetting modem");
    let Some(pin) = config.reset_pin() else {
        warn!("No reset pin configured");
        return ResetOutcome::NoPin;
    };

    if pin.set_low().is_err() {
        error!("Failed to assert reset pin");
        return ResetOutcome::PinFault;
    }
    Timer::after(reset_time()).await;
    if pin.set_high().is_err() {
        error!("Failed to release reset pin");
        return ResetOutcome::PinFault;
    }
    ResetOutcome::Pulsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asynch::dispatcher::{RingError, RingHandler};
    use crate::command::ReplyMatcher;
    use crate::config::SOCKET_RECV;

    fn awaiting_engine(command: Command) -> Engine<2> {
        let mut engine = Engine::new();
        let idx = engine.queue.submit(command).unwrap();
        engine.queue.activate_next().unwrap();
        engine.queue.mark_awaiting(idx);
        engine
    }

    #[test]
    fn unsolicited_lines_are_not_replies() {
        struct Nop;
        impl RingHandler for Nop {
            fn on_ring(&self, _: &Frame<'_>) -> Result<(), RingError> {
                Ok(())
            }
        }
        static NOP: Nop = Nop;

        let mut engine = awaiting_engine(
            Command::new(b"AT+CGSN")
                .unwrap()
                .reply(ReplyMatcher::Unclaimed),
        );
        engine.dispatcher.register(b"+SQNSRING", &NOP).unwrap();

        assert!(matches!(
            engine.classify(&Frame::line(b"+SQNSRING: 1,5")),
            Route::Rings(_)
        ));
        assert!(matches!(
            engine.classify(&Frame::line(b"AT+CGSN")),
            Route::Unclassified
        ));
        assert!(matches!(
            engine.classify(&Frame::line(b"350123451234560")),
            Route::Transaction
        ));
        assert!(matches!(
            engine.classify(&Frame::line(b"OK")),
            Route::Transaction
        ));
    }

    #[test]
    fn status_only_ignores_payload_lines() {
        let engine = awaiting_engine(
            Command::new(b"AT+CEREG=1")
                .unwrap()
                .reply(ReplyMatcher::StatusOnly),
        );
        assert!(matches!(
            engine.classify(&Frame::line(b"+CEREG: 2")),
            Route::Unclassified
        ));
    }

    #[test]
    fn prompt_only_for_data_commands() {
        let engine = awaiting_engine(Command::new(b"AT").unwrap());
        let prompt = Frame {
            kind: FrameKind::Prompt,
            data: b"> ",
        };
        assert!(matches!(engine.classify(&prompt), Route::Unclassified));
    }

    #[test]
    fn intermediate_ok_does_not_complete() {
        let mut engine = awaiting_engine(
            Command::new(b"AT+SQNSMQTTSUBSCRIBE=0,\"a\",1")
                .unwrap()
                .complete_on(b"+SQNSMQTTONSUBSCRIBE:0,"),
        );
        engine.on_reply(&Frame::line(b"OK"));
        assert!(engine.queue.active().is_some());
        engine.on_reply(&Frame::line(b"+SQNSMQTTONSUBSCRIBE:0,\"a\",0"));
        assert!(engine.queue.active().is_none());
    }

    #[test]
    fn announced_segment_length() {
        let engine: Engine<2> = Engine::new();
        assert_eq!(
            engine.announced_len(b"+SQNSRECV: 1,12", &[SOCKET_RECV]),
            Some(12)
        );
        assert_eq!(engine.announced_len(b"+SQNSRECV: 1,12", &[]), None);
        assert_eq!(engine.announced_len(b"OK", &[SOCKET_RECV]), None);
    }
}
