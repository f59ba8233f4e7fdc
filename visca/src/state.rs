//! Camera state store
//!
//! The engine task is the only writer. Readers hold a `watch::Receiver` and
//! clone the current snapshot; a write copies the map only while an older
//! snapshot is still borrowed somewhere.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::trace;
use visca_core::{Address, InquiryValue, StateEffect};
use visca_types::{CameraState, ConnectionState, Speeds};

use crate::event::{EventSender, StatusEvent};

/// Immutable view of every camera
pub type Snapshot = Arc<BTreeMap<Address, CameraState>>;

pub struct StateStore {
    tx: watch::Sender<Snapshot>,
    events: EventSender,
    default_speeds: Speeds,
    optimistic: bool,
}

impl StateStore {
    pub fn new(cameras: &[Address], speeds: Speeds, optimistic: bool, events: EventSender) -> Self {
        let map = cameras
            .iter()
            .map(|address| (*address, CameraState::new(speeds)))
            .collect();
        let (tx, _rx) = watch::channel(Arc::new(map));
        Self {
            tx,
            events,
            default_speeds: speeds,
            optimistic,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.tx.borrow().clone()
    }

    pub fn get(&self, address: Address) -> Option<CameraState> {
        self.tx.borrow().get(&address).cloned()
    }

    /// Operator speeds for `address`
    pub fn speeds(&self, address: Address) -> Speeds {
        self.get(address)
            .map(|state| state.speeds)
            .unwrap_or(self.default_speeds)
    }

    /// Apply `f` to one camera; publish when it reports a change
    fn update(&self, address: Address, f: impl FnOnce(&mut CameraState) -> bool) {
        let default_speeds = self.default_speeds;
        let mut changed_state = None;

        self.tx.send_if_modified(|map| {
            let state = Arc::make_mut(map)
                .entry(address)
                .or_insert_with(|| CameraState::new(default_speeds));
            if !f(state) {
                return false;
            }
            state.touch();
            changed_state = Some(state.clone());
            true
        });

        if let Some(state) = changed_state {
            trace!(%address, %state, "camera state changed");
            let _ = self.events.send(StatusEvent::CameraChanged { address, state });
        }
    }

    /// Record the effect of an issued command before the camera confirms it
    pub fn propose(&self, address: Address, effect: StateEffect) {
        if !self.optimistic {
            return;
        }
        self.update(address, |state| match effect {
            StateEffect::Power(p) => {
                state.power.propose(p);
                true
            }
            StateEffect::WhiteBalance(wb) => {
                state.white_balance.propose(wb);
                true
            }
            StateEffect::FocusMode(mode) => {
                state.focus_mode.propose(mode);
                true
            }
            StateEffect::Preset(slot) => {
                state.preset.propose(slot);
                true
            }
            StateEffect::PresetCleared | StateEffect::ZoomPosition(_) | StateEffect::FocusPosition(_) => {
                false
            }
        });
    }

    /// The camera completed a command with this effect
    pub fn confirm(&self, address: Address, effect: StateEffect) {
        self.update(address, |state| {
            match effect {
                StateEffect::Power(p) => state.power.confirm(p),
                StateEffect::WhiteBalance(wb) => state.white_balance.confirm(wb),
                StateEffect::FocusMode(mode) => state.focus_mode.confirm(mode),
                StateEffect::Preset(slot) => state.preset.confirm(slot),
                StateEffect::PresetCleared => state.preset.clear(),
                StateEffect::ZoomPosition(p) => state.zoom_position = Some(p),
                StateEffect::FocusPosition(p) => state.focus_position = Some(p),
            }
            true
        });
    }

    /// A command with this effect failed
    pub fn discard(&self, address: Address, effect: StateEffect) {
        if !self.optimistic {
            return;
        }
        self.update(address, |state| {
            let before = state.clone();
            match effect {
                StateEffect::Power(p) => state.power.discard(p),
                StateEffect::WhiteBalance(wb) => state.white_balance.discard(wb),
                StateEffect::FocusMode(mode) => state.focus_mode.discard(mode),
                StateEffect::Preset(slot) => state.preset.discard(slot),
                _ => {}
            }
            *state != before
        });
    }

    /// Record a value the camera reported
    pub fn apply_inquiry(&self, address: Address, value: &InquiryValue) {
        self.update(address, |state| {
            match *value {
                InquiryValue::Power(p) => state.power.confirm(p),
                InquiryValue::WhiteBalance(wb) => state.white_balance.confirm(wb),
                InquiryValue::FocusMode(mode) => state.focus_mode.confirm(mode),
                InquiryValue::AeMode(mode) => state.ae_mode = Some(mode),
                InquiryValue::ZoomPosition(p) => state.zoom_position = Some(p),
                InquiryValue::FocusPosition(p) => state.focus_position = Some(p),
                InquiryValue::PanTiltPosition { pan, tilt } => {
                    state.pan_tilt_position = Some((pan, tilt))
                }
                InquiryValue::PanTiltMaxSpeed { .. } | InquiryValue::Version(_) => return false,
            }
            true
        });
    }

    pub fn set_speeds(&self, address: Address, speeds: Speeds) {
        self.update(address, |state| {
            let changed = state.speeds != speeds;
            state.speeds = speeds;
            changed
        });
    }

    /// Mirror the link state into every camera
    pub fn set_connection(&self, connection: ConnectionState) {
        let addresses: Vec<Address> = self.tx.borrow().keys().copied().collect();
        for address in addresses {
            self.update(address, |state| {
                let changed = state.connection != connection;
                state.connection = connection;
                changed
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::event_channel;
    use pretty_assertions::assert_eq;
    use visca_types::{PowerState, WhiteBalance};

    fn store(optimistic: bool) -> (StateStore, crate::event::EventReceiver) {
        let (tx, rx) = event_channel(16);
        (StateStore::new(&[Address::DEFAULT], Speeds::default(), optimistic, tx), rx)
    }

    #[test]
    fn test_propose_confirm() {
        let (store, mut events) = store(true);
        let cam = Address::DEFAULT;

        store.propose(cam, StateEffect::Power(PowerState::On));
        let state = store.get(cam).unwrap();
        assert_eq!(state.power.current(), Some(PowerState::On));
        assert!(state.power.is_pending());
        assert!(state.updated_at.is_some());

        store.confirm(cam, StateEffect::Power(PowerState::On));
        assert!(!store.get(cam).unwrap().power.is_pending());

        assert!(matches!(events.try_recv(), Ok(StatusEvent::CameraChanged { .. })));
        assert!(matches!(events.try_recv(), Ok(StatusEvent::CameraChanged { .. })));
    }

    #[test]
    fn test_discard_reverts() {
        let (store, _events) = store(true);
        let cam = Address::DEFAULT;
        store.confirm(cam, StateEffect::WhiteBalance(WhiteBalance::Auto));
        store.propose(cam, StateEffect::WhiteBalance(WhiteBalance::Indoor));
        store.discard(cam, StateEffect::WhiteBalance(WhiteBalance::Indoor));
        assert_eq!(store.get(cam).unwrap().white_balance.current(), Some(WhiteBalance::Auto));
    }

    #[test]
    fn test_non_optimistic_skips_pending() {
        let (store, mut events) = store(false);
        store.propose(Address::DEFAULT, StateEffect::Power(PowerState::Off));
        assert_eq!(store.get(Address::DEFAULT).unwrap().power.current(), None);
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_snapshot_is_immutable() {
        let (store, _events) = store(true);
        let before = store.snapshot();
        store.apply_inquiry(Address::DEFAULT, &InquiryValue::ZoomPosition(0x1000));
        assert_eq!(before[&Address::DEFAULT].zoom_position, None);
        assert_eq!(store.snapshot()[&Address::DEFAULT].zoom_position, Some(0x1000));
    }

    #[test]
    fn test_connection_mirrored() {
        let (store, _events) = store(true);
        store.set_connection(ConnectionState::Connected);
        assert_eq!(store.get(Address::DEFAULT).unwrap().connection, ConnectionState::Connected);
    }

    #[test]
    fn test_preset_cleared_by_movement() {
        let (store, _events) = store(true);
        let cam = Address::DEFAULT;
        store.confirm(cam, StateEffect::Preset(3));
        store.confirm(cam, StateEffect::PresetCleared);
        assert_eq!(store.get(cam).unwrap().preset.current(), None);
    }
}
