//! Held-note accumulation
//!
//! [`HeldNoteSet`] is a persistent set of sounding keys. Applying an event
//! that does not change the set hands back the same allocation, so watchers
//! can skip redraws with a pointer comparison instead of a set comparison.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::trace;

use crate::midi::MidiEvent;
use crate::session::InputEvent;

const PITCH_NAMES: [&str; 12] = [
    "c", "c#", "d", "d#", "e", "f", "f#", "g", "g#", "a", "a#", "b",
];

/// Staff pitch descriptor for a MIDI key (`c#/4` style, key 60 is `c/4`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pitch {
    key: u8,
}

impl Pitch {
    pub fn new(key: u8) -> Self {
        Self { key }
    }

    pub fn key(&self) -> u8 {
        self.key
    }

    /// Lowercase note name with sharp, e.g. `f#`
    pub fn name(&self) -> &'static str {
        PITCH_NAMES[(self.key % 12) as usize]
    }

    /// Scientific octave number
    pub fn octave(&self) -> i8 {
        (self.key / 12) as i8 - 1
    }
}

impl fmt::Display for Pitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name(), self.octave())
    }
}

/// Set of currently held keys
#[derive(Debug, Clone, Default)]
pub struct HeldNoteSet {
    keys: Arc<BTreeSet<u8>>,
}

impl HeldNoteSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one decoded event and return the resulting set.
    ///
    /// Returns a clone sharing this set's allocation when the event leaves
    /// the set logically unchanged (repeated Note-On, Note-Off for a key
    /// that is not held, or an unknown message).
    pub fn apply(&self, event: &MidiEvent) -> HeldNoteSet {
        match *event {
            MidiEvent::NoteOn { key, .. } if !self.keys.contains(&key) => {
                let mut keys = (*self.keys).clone();
                keys.insert(key);
                Self { keys: Arc::new(keys) }
            }
            MidiEvent::NoteOff { key, .. } if self.keys.contains(&key) => {
                let mut keys = (*self.keys).clone();
                keys.remove(&key);
                Self { keys: Arc::new(keys) }
            }
            _ => self.clone(),
        }
    }

    /// True when both sets share the same allocation
    pub fn ptr_eq(a: &HeldNoteSet, b: &HeldNoteSet) -> bool {
        Arc::ptr_eq(&a.keys, &b.keys)
    }

    pub fn contains(&self, key: u8) -> bool {
        self.keys.contains(&key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Keys in ascending order
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        self.keys.iter().copied()
    }

    /// Pitch descriptors in ascending order, ready for a staff renderer
    pub fn pitches(&self) -> Vec<Pitch> {
        self.iter().map(Pitch::new).collect()
    }
}

impl PartialEq for HeldNoteSet {
    fn eq(&self, other: &Self) -> bool {
        HeldNoteSet::ptr_eq(self, other) || self.keys == other.keys
    }
}

impl Eq for HeldNoteSet {}

impl FromIterator<u8> for HeldNoteSet {
    fn from_iter<I: IntoIterator<Item = u8>>(iter: I) -> Self {
        Self {
            keys: Arc::new(iter.into_iter().collect()),
        }
    }
}

/// Owns the current held-note set for a consumer of decoded events and
/// publishes it to watchers only when it actually changes.
///
/// The tracker follows one input device at a time. Events tagged with any
/// other device are ignored, and switching devices clears the set.
pub struct NoteTracker {
    current: HeldNoteSet,
    tx: watch::Sender<HeldNoteSet>,
    source: Option<String>,
}

impl NoteTracker {
    pub fn new() -> Self {
        let current = HeldNoteSet::new();
        let (tx, _rx) = watch::channel(current.clone());
        Self {
            current,
            tx,
            source: None,
        }
    }

    /// Receiver notified after every change to the held-note set
    pub fn subscribe(&self) -> watch::Receiver<HeldNoteSet> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> &HeldNoteSet {
        &self.current
    }

    /// Apply an event; returns true if watchers were notified
    pub fn apply(&mut self, event: &MidiEvent) -> bool {
        let next = self.current.apply(event);
        if HeldNoteSet::ptr_eq(&next, &self.current) {
            trace!("Held notes unchanged by {}", event);
            return false;
        }

        self.current = next;
        self.tx.send_replace(self.current.clone());
        true
    }

    /// Follow another input device; returns true if watchers were notified.
    ///
    /// Notes held on the previous device can never be released, so they are
    /// dropped.
    pub fn set_source(&mut self, device_id: Option<&str>) -> bool {
        if self.source.as_deref() == device_id {
            return false;
        }
        self.source = device_id.map(str::to_string);
        self.clear()
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Apply a tagged event if it came from the followed device
    pub fn apply_input(&mut self, input: &InputEvent) -> bool {
        if self.source.as_deref() != Some(input.device_id.as_str()) {
            trace!("Ignoring {} from '{}'", input.event, input.device_id);
            return false;
        }
        self.apply(&input.event)
    }

    /// Drop every held note
    pub fn clear(&mut self) -> bool {
        if self.current.is_empty() {
            return false;
        }

        self.current = HeldNoteSet::new();
        self.tx.send_replace(self.current.clone());
        true
    }
}

impl Default for NoteTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::decode;
    use proptest::prelude::*;

    fn on(key: u8) -> MidiEvent {
        MidiEvent::NoteOn { key, velocity: 100 }
    }

    fn off(key: u8) -> MidiEvent {
        MidiEvent::NoteOff { key, velocity: 0 }
    }

    #[test]
    fn test_note_on_then_off_returns_to_empty() {
        let empty = HeldNoteSet::new();
        let held = empty.apply(&on(60));
        assert!(held.contains(60));

        let released = held.apply(&off(60));
        assert_eq!(released, empty);
        assert!(released.is_empty());
    }

    #[test]
    fn test_unchanged_results_share_allocation() {
        let held = HeldNoteSet::new().apply(&on(60));

        assert!(HeldNoteSet::ptr_eq(&held, &held.apply(&on(60))));
        assert!(HeldNoteSet::ptr_eq(&held, &held.apply(&off(61))));
        let unknown = MidiEvent::Unknown { data: vec![0xB0, 1, 2] };
        assert!(HeldNoteSet::ptr_eq(&held, &held.apply(&unknown)));
        assert!(!HeldNoteSet::ptr_eq(&held, &held.apply(&on(64))));
    }

    #[test]
    fn test_out_of_order_release_is_tolerated() {
        let set = HeldNoteSet::new().apply(&off(60)).apply(&on(62)).apply(&on(62));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![62]);
    }

    #[test]
    fn test_pitches_are_ordered() {
        let set: HeldNoteSet = [67, 60, 64].into_iter().collect();
        let names: Vec<String> = set.pitches().iter().map(|p| p.to_string()).collect();
        assert_eq!(names, vec!["c/4", "e/4", "g/4"]);
    }

    #[test]
    fn test_pitch_names() {
        assert_eq!(Pitch::new(0).to_string(), "c/-1");
        assert_eq!(Pitch::new(61).to_string(), "c#/4");
        assert_eq!(Pitch::new(69).to_string(), "a/4");
        assert_eq!(Pitch::new(127).to_string(), "g/9");
    }

    #[test]
    fn test_malformed_input_leaves_set_alone() {
        let held = HeldNoteSet::new().apply(&on(64));
        let after = match decode(&[0x90, 60]) {
            Ok(event) => held.apply(&event),
            Err(_) => held.clone(),
        };
        assert!(HeldNoteSet::ptr_eq(&held, &after));
    }

    #[tokio::test]
    async fn test_tracker_notifies_only_on_change() {
        let mut tracker = NoteTracker::new();
        let mut rx = tracker.subscribe();

        assert!(tracker.apply(&on(60)));
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().contains(60));

        assert!(!tracker.apply(&on(60)));
        assert!(!rx.has_changed().unwrap());

        assert!(tracker.clear());
        assert!(rx.borrow_and_update().is_empty());
        assert!(!tracker.clear());
        assert!(!rx.has_changed().unwrap());
    }

    fn tagged(device_id: &str, event: MidiEvent) -> InputEvent {
        InputEvent {
            device_id: device_id.to_string(),
            event,
        }
    }

    #[test]
    fn test_tracker_follows_selected_input() {
        let mut tracker = NoteTracker::new();

        // Nothing followed yet
        assert!(!tracker.apply_input(&tagged("A", on(60))));

        assert!(!tracker.set_source(Some("A")));
        assert!(tracker.apply_input(&tagged("A", on(60))));
        assert!(!tracker.apply_input(&tagged("B", on(62))));
        assert_eq!(tracker.current().iter().collect::<Vec<_>>(), vec![60]);
    }

    #[test]
    fn test_switching_input_keeps_new_device_notes() {
        let mut tracker = NoteTracker::new();
        tracker.set_source(Some("A"));
        tracker.apply_input(&tagged("A", on(60)));

        // Switch observed before the new device's first event
        assert!(tracker.set_source(Some("B")));
        assert!(tracker.current().is_empty());
        assert!(tracker.apply_input(&tagged("B", on(64))));

        // A late release from the old device does not disturb the new one
        assert!(!tracker.apply_input(&tagged("A", off(60))));
        assert!(!tracker.apply_input(&tagged("A", on(67))));
        assert_eq!(tracker.current().iter().collect::<Vec<_>>(), vec![64]);

        // Same device again is not a switch
        assert!(!tracker.set_source(Some("B")));
        assert!(tracker.current().contains(64));
        assert_eq!(tracker.source(), Some("B"));
    }

    proptest! {
        #[test]
        fn note_on_is_idempotent(
            keys in proptest::collection::vec(0u8..=127, 0..8),
            key in 0u8..=127,
            velocity in 1u8..=127,
        ) {
            let set: HeldNoteSet = keys.into_iter().collect();
            let event = MidiEvent::NoteOn { key, velocity };
            let once = set.apply(&event);
            let twice = once.apply(&event);
            prop_assert_eq!(&once, &twice);
            prop_assert!(HeldNoteSet::ptr_eq(&once, &twice));
        }

        #[test]
        fn note_off_is_idempotent(
            keys in proptest::collection::vec(0u8..=127, 0..8),
            key in 0u8..=127,
        ) {
            let set: HeldNoteSet = keys.into_iter().collect();
            let once = set.apply(&off(key));
            prop_assert!(!once.contains(key));
            prop_assert!(HeldNoteSet::ptr_eq(&once, &once.apply(&off(key))));
        }
    }
}
