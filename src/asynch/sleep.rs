//! State carried across a deep sleep of the host.
//!
//! Before sleeping, the session state worth keeping is serialized with
//! `postcard` into a [`SnapshotStore`], typically memory that survives the
//! sleep. After wake up the snapshot is applied to a fresh engine without
//! any traffic towards the modem, and the store is cleared.

use heapless::Vec;
use serde::{Deserialize, Serialize};

use super::state::{StateTracker, Subscription, MAX_SUBSCRIPTIONS};
use crate::error::SnapshotError;
use crate::registration::{OperationalState, RegistrationState};

/// Upper bound of an encoded snapshot.
pub const SNAPSHOT_SIZE: usize = 768;

const SNAPSHOT_VERSION: u8 = 1;

/// What to keep across the sleep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistOptions {
    pub mqtt_subscriptions: bool,
    pub cached_state: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SleepSnapshot {
    version: u8,
    subscriptions: Vec<Subscription, MAX_SUBSCRIPTIONS>,
    cached_state: Option<(OperationalState, RegistrationState)>,
}

impl SleepSnapshot {
    pub(crate) fn capture(state: &mut StateTracker, options: PersistOptions) -> Self {
        let subscriptions = if options.mqtt_subscriptions {
            state.subscriptions().iter().cloned().collect()
        } else {
            Vec::new()
        };
        let cached_state = options
            .cached_state
            .then(|| (state.operational_state(None), state.registration_state(None)));

        Self {
            version: SNAPSHOT_VERSION,
            subscriptions,
            cached_state,
        }
    }

    pub(crate) fn apply(self, state: &mut StateTracker) {
        state.replace_subscriptions(self.subscriptions);
        if let Some((op, reg)) = self.cached_state {
            state.set_operational_state(op);
            state.set_registration_state(reg);
        }
    }

    pub fn subscriptions(&self) -> &[Subscription] {
        &self.subscriptions
    }

    pub fn encode<'b>(&self, buf: &'b mut [u8]) -> Result<&'b mut [u8], SnapshotError> {
        postcard::to_slice(self, buf).map_err(|_| SnapshotError::TooLarge)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, SnapshotError> {
        let snapshot: Self = postcard::from_bytes(bytes).map_err(|_| SnapshotError::Corrupt)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::Corrupt);
        }
        Ok(snapshot)
    }
}

/// Storage that outlives the sleep, e.g. RTC memory.
pub trait SnapshotStore {
    fn store(&mut self, bytes: &[u8]) -> Result<(), SnapshotError>;

    /// Copies the stored snapshot into `buf`. Returns 0 when empty.
    fn load(&mut self, buf: &mut [u8]) -> Result<usize, SnapshotError>;

    fn clear(&mut self) -> Result<(), SnapshotError>;
}

/// A [`SnapshotStore`] backed by a plain byte array. Place it in a memory
/// section that is retained during sleep.
pub struct MemoryStore<const N: usize> {
    buf: [u8; N],
    len: usize,
}

impl<const N: usize> Default for MemoryStore<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> MemoryStore<N> {
    pub const fn new() -> Self {
        Self {
            buf: [0; N],
            len: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<const N: usize> SnapshotStore for MemoryStore<N> {
    fn store(&mut self, bytes: &[u8]) -> Result<(), SnapshotError> {
        let dst = self.buf.get_mut(..bytes.len()).ok_or(SnapshotError::TooLarge)?;
        dst.copy_from_slice(bytes);
        self.len = bytes.len();
        Ok(())
    }

    fn load(&mut self, buf: &mut [u8]) -> Result<usize, SnapshotError> {
        let dst = buf.get_mut(..self.len).ok_or(SnapshotError::TooLarge)?;
        dst.copy_from_slice(&self.buf[..self.len]);
        Ok(self.len)
    }

    fn clear(&mut self) -> Result<(), SnapshotError> {
        self.len = 0;
        Ok(())
    }
}
