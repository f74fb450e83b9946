use core::task::Context;

use embassy_sync::waitqueue::WakerRegistration;
use heapless::{String, Vec};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::registration::{parse_cereg, parse_cfun, OperationalState, RegistrationState};

pub const MAX_SUBSCRIPTIONS: usize = 8;
pub const MAX_TOPIC_LEN: usize = 64;

/// An MQTT subscription known to be active on the module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub topic: String<MAX_TOPIC_LEN>,
    pub qos: u8,
}

/// Mirror of the module state, kept current from parsed lines.
pub struct StateTracker {
    operational_state: OperationalState,
    registration_state: RegistrationState,
    subscriptions: Vec<Subscription, MAX_SUBSCRIPTIONS>,
    state_waker: WakerRegistration,
    registration_waker: WakerRegistration,
}

impl Default for StateTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StateTracker {
    pub const fn new() -> Self {
        Self {
            operational_state: OperationalState::Minimum,
            registration_state: RegistrationState::NotSearching,
            subscriptions: Vec::new(),
            state_waker: WakerRegistration::new(),
            registration_waker: WakerRegistration::new(),
        }
    }

    /// Picks up `+CEREG` and `+CFUN` lines, whether solicited or not.
    pub fn observe(&mut self, line: &[u8]) {
        if let Some(state) = parse_cereg(line) {
            self.set_registration_state(state);
        } else if let Some(state) = parse_cfun(line) {
            self.set_operational_state(state);
        }
    }

    /// Back to the values of a freshly booted module.
    pub fn reset_mirror_state(&mut self) {
        self.set_operational_state(OperationalState::Minimum);
        self.set_registration_state(RegistrationState::NotSearching);
    }

    pub fn set_operational_state(&mut self, state: OperationalState) {
        if self.operational_state != state {
            debug!("Operational state changed: {:?}", state);
        }
        self.operational_state = state;
        self.state_waker.wake();
    }

    pub fn operational_state(&mut self, cx: Option<&mut Context>) -> OperationalState {
        if let Some(cx) = cx {
            self.state_waker.register(cx.waker());
        }
        self.operational_state
    }

    pub fn set_registration_state(&mut self, state: RegistrationState) {
        if self.registration_state != state {
            info!(
                "Registration status changed! {:?}, registered: {:?}",
                state,
                state.is_registered()
            );
        }
        self.registration_state = state;
        self.registration_waker.wake();
    }

    pub fn registration_state(&mut self, cx: Option<&mut Context>) -> RegistrationState {
        if let Some(cx) = cx {
            self.registration_waker.register(cx.waker());
        }
        self.registration_state
    }

    pub fn subscriptions(&self) -> &[Subscription] {
        &self.subscriptions
    }

    pub fn add_subscription(&mut self, topic: &str, qos: u8) -> Result<(), Error> {
        let topic = String::try_from(topic).map_err(|_| Error::CommandTooLong)?;
        if let Some(sub) = self.subscriptions.iter_mut().find(|s| s.topic == topic) {
            sub.qos = qos;
            return Ok(());
        }
        self.subscriptions
            .push(Subscription { topic, qos })
            .map_err(|_| Error::PoolExhausted)
    }

    pub fn remove_subscription(&mut self, topic: &str) {
        self.subscriptions.retain(|s| s.topic != topic);
    }

    pub(crate) fn replace_subscriptions(&mut self, subs: Vec<Subscription, MAX_SUBSCRIPTIONS>) {
        self.subscriptions = subs;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observes_registration_and_functionality() {
        let mut s = StateTracker::new();
        s.observe(b"+CEREG: 5");
        assert_eq!(s.registration_state(None), RegistrationState::RegisteredRoaming);
        s.observe(b"+CFUN: 1");
        assert_eq!(s.operational_state(None), OperationalState::Full);
        s.observe(b"+SQNSRING: 1,10");
        assert_eq!(s.registration_state(None), RegistrationState::RegisteredRoaming);

        s.reset_mirror_state();
        assert_eq!(s.operational_state(None), OperationalState::Minimum);
        assert_eq!(s.registration_state(None), RegistrationState::NotSearching);
    }

    #[test]
    fn subscriptions_are_unique_per_topic() {
        let mut s = StateTracker::new();
        s.add_subscription("a", 0).unwrap();
        s.add_subscription("b", 1).unwrap();
        s.add_subscription("a", 2).unwrap();
        assert_eq!(s.subscriptions().len(), 2);
        assert_eq!(s.subscriptions()[0].qos, 2);

        s.remove_subscription("a");
        assert_eq!(s.subscriptions().len(), 1);
        assert_eq!(s.subscriptions()[0].topic, "b");
    }
}
