//! MIDI message decoding
//!
//! Turns raw input bytes into the note events the held-note tracker consumes.
//! Only Note-On and Note-Off are interpreted; every other status is passed
//! through as [`MidiEvent::Unknown`].

use std::fmt;

use crate::error::DecodeError;

/// Note-On status byte
pub const NOTE_ON: u8 = 0x90;

/// Note-Off status byte
pub const NOTE_OFF: u8 = 0x80;

/// Active Sensing keep-alive
pub const ACTIVE_SENSING: u8 = 0xFE;

/// Status bytes dropped before decoding
pub const IGNORED_STATUSES: &[u8] = &[ACTIVE_SENSING];

/// Decoded MIDI input event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MidiEvent {
    /// Key pressed: key (0-127), velocity (1-127)
    NoteOn { key: u8, velocity: u8 },

    /// Key released: key (0-127), velocity (0-127)
    NoteOff { key: u8, velocity: u8 },

    /// Any status the decoder does not interpret, raw bytes included
    Unknown { data: Vec<u8> },
}

impl MidiEvent {
    /// Key number for note events, None otherwise
    pub fn key(&self) -> Option<u8> {
        match *self {
            MidiEvent::NoteOn { key, .. } | MidiEvent::NoteOff { key, .. } => Some(key),
            MidiEvent::Unknown { .. } => None,
        }
    }

    /// Check if this is a note event
    pub fn is_note(&self) -> bool {
        self.key().is_some()
    }
}

impl fmt::Display for MidiEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MidiEvent::NoteOn { key, velocity } => write!(f, "NoteOn n:{} v:{}", key, velocity),
            MidiEvent::NoteOff { key, velocity } => write!(f, "NoteOff n:{} v:{}", key, velocity),
            MidiEvent::Unknown { data } => write!(f, "Unknown [{}]", format_hex(data)),
        }
    }
}

/// Check whether the message carries a status the pipeline drops unseen.
///
/// Callers run this before [`decode`]; the decoder itself never filters.
pub fn is_ignored(data: &[u8]) -> bool {
    data.first()
        .map(|status| IGNORED_STATUSES.contains(status))
        .unwrap_or(false)
}

/// Decode a raw MIDI message.
///
/// A Note-On with velocity 0 is reported as a Note-Off. Recognized note
/// statuses shorter than three bytes fail with
/// [`DecodeError::MalformedMessage`] instead of guessing the missing bytes.
pub fn decode(data: &[u8]) -> Result<MidiEvent, DecodeError> {
    let status = *data.first().ok_or(DecodeError::Empty)?;

    match status {
        NOTE_ON | NOTE_OFF if data.len() < 3 => Err(DecodeError::MalformedMessage {
            status,
            len: data.len(),
        }),
        NOTE_ON => {
            let key = data[1];
            let velocity = data[2];

            if velocity == 0 {
                Ok(MidiEvent::NoteOff { key, velocity })
            } else {
                Ok(MidiEvent::NoteOn { key, velocity })
            }
        }
        NOTE_OFF => Ok(MidiEvent::NoteOff {
            key: data[1],
            velocity: data[2],
        }),
        _ => Ok(MidiEvent::Unknown {
            data: data.to_vec(),
        }),
    }
}

/// Format MIDI bytes as hex string for debugging
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
