//! Coordination of module resets between control handles and the runner.
//!
//! Only one reset runs at a time. A caller asking for a reset while one is
//! in progress joins it and receives the same result.

use core::task::{Context, Poll};

use embassy_sync::waitqueue::{MultiWakerRegistration, WakerRegistration};

use crate::error::Error;

/// Callers that can join a running reset.
const MAX_RESET_WAITERS: usize = 4;

/// Result of a reset pulse, handed from the runner back to the requester.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResetOutcome {
    Pulsed,
    NoPin,
    PinFault,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResetTicket {
    /// The caller drives the reset and has to `finish` it.
    Owner(u32),
    /// The caller waits for the reset of this generation to finish.
    Joined(u32),
}

pub(crate) struct ResetTracker {
    in_progress: bool,
    // Pulse not yet picked up by the runner.
    requested: bool,
    generation: u32,
    pulse: Option<(u32, ResetOutcome)>,
    result: Result<(), Error>,
    owner: WakerRegistration,
    joined: MultiWakerRegistration<MAX_RESET_WAITERS>,
}

impl ResetTracker {
    pub(crate) const fn new() -> Self {
        Self {
            in_progress: false,
            requested: false,
            generation: 0,
            pulse: None,
            result: Ok(()),
            owner: WakerRegistration::new(),
            joined: MultiWakerRegistration::new(),
        }
    }

    pub(crate) fn request(&mut self) -> ResetTicket {
        if self.in_progress {
            return ResetTicket::Joined(self.generation);
        }
        self.in_progress = true;
        self.requested = true;
        self.pulse = None;
        ResetTicket::Owner(self.generation)
    }

    /// Taken by the runner once nothing is in flight.
    pub(crate) fn take_request(&mut self) -> Option<u32> {
        if self.requested {
            self.requested = false;
            Some(self.generation)
        } else {
            None
        }
    }

    pub(crate) fn pulsed(&mut self, generation: u32, outcome: ResetOutcome) {
        if self.in_progress && generation == self.generation {
            self.pulse = Some((generation, outcome));
            self.owner.wake();
        }
    }

    pub(crate) fn poll_pulse(&mut self, generation: u32, cx: &mut Context<'_>) -> Poll<ResetOutcome> {
        match self.pulse {
            Some((g, outcome)) if g == generation => Poll::Ready(outcome),
            _ => {
                self.owner.register(cx.waker());
                Poll::Pending
            }
        }
    }

    /// Ends the reset of `generation` and hands `result` to everyone who
    /// joined it.
    pub(crate) fn finish(&mut self, generation: u32, result: Result<(), Error>) {
        if !self.in_progress || generation != self.generation {
            return;
        }
        self.in_progress = false;
        self.requested = false;
        self.pulse = None;
        self.result = result;
        self.generation = self.generation.wrapping_add(1);
        self.joined.wake();
    }

    pub(crate) fn poll_joined(
        &mut self,
        generation: u32,
        cx: &mut Context<'_>,
    ) -> Poll<Result<(), Error>> {
        if self.generation != generation {
            return Poll::Ready(self.result);
        }
        self.joined.register(cx.waker());
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::noop_waker;

    #[test]
    fn second_request_joins_the_first() {
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut reset = ResetTracker::new();

        let ResetTicket::Owner(owner) = reset.request() else {
            panic!("first request must own the reset");
        };
        let ResetTicket::Joined(joined) = reset.request() else {
            panic!("second request must join");
        };
        assert_eq!(owner, joined);

        assert_eq!(reset.take_request(), Some(owner));
        assert_eq!(reset.take_request(), None);
        assert!(reset.poll_pulse(owner, &mut cx).is_pending());
        reset.pulsed(owner, ResetOutcome::Pulsed);
        assert_eq!(
            reset.poll_pulse(owner, &mut cx),
            Poll::Ready(ResetOutcome::Pulsed)
        );

        assert!(reset.poll_joined(joined, &mut cx).is_pending());
        reset.finish(owner, Err(Error::IoPin));
        assert_eq!(reset.poll_joined(joined, &mut cx), Poll::Ready(Err(Error::IoPin)));

        assert!(matches!(reset.request(), ResetTicket::Owner(g) if g != owner));
    }

    #[test]
    fn stale_pulse_is_ignored() {
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut reset = ResetTracker::new();

        let ResetTicket::Owner(first) = reset.request() else {
            panic!("expected owner");
        };
        reset.take_request();
        reset.finish(first, Err(Error::Timeout));

        let ResetTicket::Owner(second) = reset.request() else {
            panic!("expected owner");
        };
        reset.pulsed(first, ResetOutcome::Pulsed);
        assert!(reset.poll_pulse(second, &mut cx).is_pending());
    }
}
