use core::future::{poll_fn, Future};
use core::pin::Pin;
use core::task::{Context, Poll};

use heapless::Vec;

use super::dispatcher::HandlerRef;
use super::queue::TransactionState;
use super::sleep::{PersistOptions, SleepSnapshot, SnapshotStore, SNAPSHOT_SIZE};
use super::state::{Subscription, MAX_SUBSCRIPTIONS};
use super::reset::{ResetOutcome, ResetTicket};
use super::Shared;
use crate::command::control::types::{
    EPSNetworkRegistrationUrcConfig, Functionality, TerminationErrorMode,
};
use crate::command::control::{
    GetClock, GetModuleFunctionality, SetEPSNetworkRegistrationStatus, SetModuleFunctionality,
    SetReportMobileTerminationError, SoftReset,
};
use crate::command::{Command, ReplyMatcher};
use crate::error::Error;
use crate::module_timing::boot_time;
use crate::registration::{OperationalState, RegistrationState};
use crate::ModemResult;

/// Cloneable handle used to issue commands and observe the modem.
#[derive(Clone, Copy)]
pub struct Control<'d, const Q: usize> {
    shared: &'d Shared<Q>,
}

impl<'d, const Q: usize> Control<'d, Q> {
    pub(crate) fn new(shared: &'d Shared<Q>) -> Self {
        Self { shared }
    }

    /// Queues a command without waiting for it. Fails right away when the
    /// queue or the transaction pool is full.
    pub fn submit(&self, command: Command) -> Result<Pending<'d, Q>, Error> {
        let idx = self
            .shared
            .lock(|s| s.borrow_mut().queue.submit(command))?;
        Ok(Pending {
            shared: self.shared,
            idx,
            done: false,
        })
    }

    /// Queues a command and waits for its outcome.
    pub async fn run(&self, command: Command) -> ModemResult {
        self.submit(command)?.await
    }

    /// Send an AT command to the modem. This is useful if you have special
    /// configuration, but might break the drivers functionality if your
    /// settings interfere with the drivers settings.
    pub async fn send<Cmd: atat::AtatCmd>(&self, cmd: &Cmd) -> Result<Cmd::Response, Error> {
        self.send_with(cmd, ReplyMatcher::Unclaimed).await
    }

    pub(crate) async fn send_with<Cmd: atat::AtatCmd>(
        &self,
        cmd: &Cmd,
        matcher: ReplyMatcher,
    ) -> Result<Cmd::Response, Error> {
        let reply = self
            .run(Command::from_atat(cmd)?.reply(matcher))
            .await?;
        cmd.parse(Ok(reply.payload())).map_err(|_| {
            warn!("Failed to parse reply: {:?}", crate::fmt::LossyStr(reply.payload()));
            Error::Parse
        })
    }

    pub fn register_ring_handler(
        &self,
        pattern: &'static [u8],
        handler: HandlerRef,
    ) -> Result<(), Error> {
        self.shared
            .lock(|s| s.borrow_mut().dispatcher.register(pattern, handler))
    }

    pub fn unregister_ring_handler(&self, handler: HandlerRef) -> usize {
        self.shared
            .lock(|s| s.borrow_mut().dispatcher.unregister(handler))
    }

    /// Registers a handler that takes precedence over transactions and ring
    /// handlers for lines starting with `pattern`.
    pub fn register_app_handler(
        &self,
        pattern: &'static [u8],
        handler: HandlerRef,
    ) -> Result<(), Error> {
        self.shared
            .lock(|s| s.borrow_mut().dispatcher.register_app(pattern, handler))
    }

    pub fn unregister_app_handler(&self, handler: HandlerRef) -> usize {
        self.shared
            .lock(|s| s.borrow_mut().dispatcher.unregister_app(handler))
    }

    pub fn set_uart_debug(&self, enabled: bool) {
        self.shared.lock(|s| s.borrow_mut().uart_debug = enabled);
    }

    /// Nothing queued and nothing in flight.
    pub fn is_idle(&self) -> bool {
        self.shared.lock(|s| s.borrow().queue.is_idle())
    }

    pub fn operational_state(&self) -> OperationalState {
        self.shared
            .lock(|s| s.borrow_mut().state.operational_state(None))
    }

    pub fn registration_state(&self) -> RegistrationState {
        self.shared
            .lock(|s| s.borrow_mut().state.registration_state(None))
    }

    pub fn is_registered(&self) -> bool {
        self.registration_state().is_registered()
    }

    /// Waits until the registration state differs from its current value.
    pub async fn wait_registration_change(&self) -> RegistrationState {
        let old = self.registration_state();
        poll_fn(|cx| {
            let current = self
                .shared
                .lock(|s| s.borrow_mut().state.registration_state(Some(cx)));
            if current != old {
                Poll::Ready(current)
            } else {
                Poll::Pending
            }
        })
        .await
    }

    pub async fn wait_for_registered(&self) {
        poll_fn(|cx| {
            let current = self
                .shared
                .lock(|s| s.borrow_mut().state.registration_state(Some(cx)));
            if current.is_registered() {
                Poll::Ready(())
            } else {
                Poll::Pending
            }
        })
        .await
    }

    pub fn subscriptions(&self) -> Vec<Subscription, MAX_SUBSCRIPTIONS> {
        self.shared
            .lock(|s| s.borrow().state.subscriptions().iter().cloned().collect())
    }

    pub(crate) fn record_subscription(&self, topic: &str, qos: u8) -> Result<(), Error> {
        self.shared
            .lock(|s| s.borrow_mut().state.add_subscription(topic, qos))
    }

    pub(crate) fn forget_subscription(&self, topic: &str) {
        self.shared
            .lock(|s| s.borrow_mut().state.remove_subscription(topic));
    }

    /// Plain `AT`, answered with `OK` by a responsive modem.
    pub async fn check_comm(&self) -> Result<(), Error> {
        self.run(Command::new(b"AT")?).await.map(drop)
    }

    pub async fn config_cme_error_reports(&self, n: TerminationErrorMode) -> Result<(), Error> {
        self.send_with(
            &SetReportMobileTerminationError { n },
            ReplyMatcher::StatusOnly,
        )
        .await
        .map(drop)
    }

    pub async fn config_cereg_reports(
        &self,
        n: EPSNetworkRegistrationUrcConfig,
    ) -> Result<(), Error> {
        self.send_with(
            &SetEPSNetworkRegistrationStatus { n },
            ReplyMatcher::StatusOnly,
        )
        .await
        .map(drop)
    }

    pub async fn get_op_state(&self) -> Result<OperationalState, Error> {
        let res = self
            .send_with(&GetModuleFunctionality, ReplyMatcher::Prefix(b"+CFUN:"))
            .await?;
        Ok(OperationalState::from(res.fun))
    }

    pub async fn set_op_state(&self, fun: Functionality) -> Result<(), Error> {
        self.send_with(&SetModuleFunctionality { fun }, ReplyMatcher::StatusOnly)
            .await
            .map(drop)
    }

    /// Network time as seconds since the Unix epoch, `None` while the
    /// module clock has not been synchronized yet.
    pub async fn get_clock(&self) -> Result<Option<i64>, Error> {
        let clock = self
            .send_with(&GetClock, ReplyMatcher::Prefix(b"+CCLK:"))
            .await?;
        Ok(clock.unix_timestamp())
    }

    /// Restarts the module over AT and waits for it to report `+SYSSTART`.
    pub async fn soft_reset(&self) -> Result<(), Error> {
        let command = Command::from_atat(&SoftReset)?
            .reply(ReplyMatcher::StatusOnly)
            .complete_on(b"+SYSSTART");

        match self.run(command).await {
            Ok(_) => {
                info!("Successfully soft reset modem!");
                self.shared
                    .lock(|s| s.borrow_mut().state.reset_mirror_state());
                Ok(())
            }
            Err(err) => {
                error!("Failed to soft reset modem: {:?}", err);
                Err(err)
            }
        }
    }

    /// Pulses the reset pin once the active transaction is done, then waits
    /// for the module to boot. Without a reset pin the module is restarted
    /// over AT instead. Joins the reset in progress, if there is one.
    pub async fn reset(&self) -> Result<(), Error> {
        let ticket = self.shared.lock(|s| {
            let mut s = s.borrow_mut();
            let ticket = s.reset.request();
            s.queue.wake_driver();
            ticket
        });

        let generation = match ticket {
            ResetTicket::Owner(generation) => generation,
            ResetTicket::Joined(generation) => {
                debug!("Joining reset in progress");
                return poll_fn(|cx| {
                    self.shared
                        .lock(|s| s.borrow_mut().reset.poll_joined(generation, cx))
                })
                .await;
            }
        };

        let mut guard = ResetGuard {
            shared: self.shared,
            generation,
            finished: false,
        };
        let result = self.drive_reset(generation).await;
        guard.finish(result);
        result
    }

    async fn drive_reset(&self, generation: u32) -> Result<(), Error> {
        let outcome = poll_fn(|cx| {
            self.shared
                .lock(|s| s.borrow_mut().reset.poll_pulse(generation, cx))
        })
        .await;

        match outcome {
            ResetOutcome::Pulsed => self
                .run(Command::wait_for(b"+SYSSTART").timeout(boot_time()))
                .await
                .map(drop),
            ResetOutcome::NoPin => self.soft_reset().await,
            ResetOutcome::PinFault => Err(Error::IoPin),
        }
    }

    /// Brings the module into a known state. Resumes from `store` when it
    /// holds a snapshot, resets the module otherwise.
    pub async fn begin<S: SnapshotStore>(&self, store: &mut S) -> Result<(), Error> {
        if self.restore(store)? {
            debug!("Resumed from sleep snapshot");
            self.refresh_state().await?;
        } else {
            self.reset().await?;
        }

        self.config_cme_error_reports(TerminationErrorMode::Enabled)
            .await?;
        self.config_cereg_reports(EPSNetworkRegistrationUrcConfig::UrcPsmWithCause)
            .await
    }

    /// Queries functionality and registration, updating the mirrored state.
    pub async fn refresh_state(&self) -> Result<(), Error> {
        self.run(Command::new(b"AT+CFUN?")?.reply(ReplyMatcher::Prefix(b"+CFUN:")))
            .await?;
        self.run(Command::new(b"AT+CEREG?")?.reply(ReplyMatcher::Prefix(b"+CEREG:")))
            .await?;
        Ok(())
    }

    /// Writes the state selected by `options` to `store`. Refused while
    /// anything is queued or in flight.
    pub fn prepare_for_sleep<S: SnapshotStore>(
        &self,
        store: &mut S,
        options: PersistOptions,
    ) -> Result<(), Error> {
        let snapshot = self.shared.lock(|s| {
            let mut s = s.borrow_mut();
            if !s.queue.is_idle() {
                return Err(Error::Busy);
            }
            Ok(SleepSnapshot::capture(&mut s.state, options))
        })?;

        let mut buf = [0u8; SNAPSHOT_SIZE];
        let bytes = snapshot.encode(&mut buf)?;
        store.store(bytes)?;
        info!(
            "Saved sleep snapshot, {} bytes, {} subscriptions",
            bytes.len(),
            snapshot.subscriptions().len()
        );
        Ok(())
    }

    /// Applies a snapshot from `store`, if there is one, and clears the
    /// store. No command is sent to the modem.
    pub fn restore<S: SnapshotStore>(&self, store: &mut S) -> Result<bool, Error> {
        let mut buf = [0u8; SNAPSHOT_SIZE];
        let len = store.load(&mut buf)?;
        if len == 0 {
            return Ok(false);
        }

        let decoded = SleepSnapshot::decode(&buf[..len]);
        store.clear()?;
        let snapshot = decoded?;

        self.shared
            .lock(|s| snapshot.apply(&mut s.borrow_mut().state));
        Ok(true)
    }
}

/// Ends the reset of its owner, also when the owner stops waiting.
struct ResetGuard<'d, const Q: usize> {
    shared: &'d Shared<Q>,
    generation: u32,
    finished: bool,
}

impl<'d, const Q: usize> ResetGuard<'d, Q> {
    fn finish(&mut self, result: Result<(), Error>) {
        self.finished = true;
        self.shared
            .lock(|s| s.borrow_mut().reset.finish(self.generation, result));
    }
}

impl<'d, const Q: usize> Drop for ResetGuard<'d, Q> {
    fn drop(&mut self) {
        if !self.finished {
            // Joined callers see the abandoned reset as timed out
            self.finish(Err(Error::Timeout));
        }
    }
}

/// A submitted transaction. Resolves to its reply once completed.
///
/// Dropping it before completion does not cancel the transaction: it still
/// runs, and its slot is released when it completes.
pub struct Pending<'d, const Q: usize> {
    shared: &'d Shared<Q>,
    idx: usize,
    done: bool,
}

impl<'d, const Q: usize> Pending<'d, Q> {
    pub fn state(&self) -> Option<TransactionState> {
        if self.done {
            return None;
        }
        self.shared.lock(|s| s.borrow().queue.state(self.idx))
    }
}

impl<'d, const Q: usize> Future for Pending<'d, Q> {
    type Output = ModemResult;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if this.done {
            return Poll::Pending;
        }
        let res = this
            .shared
            .lock(|s| s.borrow_mut().queue.poll_result(this.idx, cx));
        if res.is_ready() {
            this.done = true;
        }
        res
    }
}

impl<'d, const Q: usize> Drop for Pending<'d, Q> {
    fn drop(&mut self) {
        if !self.done {
            self.shared
                .lock(|s| s.borrow_mut().queue.abandon(self.idx));
        }
    }
}
