//! midi-staff - live MIDI keyboard input as held notes
//!
//! Acquires MIDI access, tracks input devices across hot-plug, forwards
//! note events from the selected input and accumulates them into the set of
//! currently held notes for a staff renderer.

pub mod config;
pub mod error;
pub mod midi;
pub mod notes;
pub mod paths;
pub mod platform;
pub mod render;
pub mod session;

pub use config::AppConfig;
pub use error::{AccessError, DecodeError, PlatformError, SessionError};
pub use midi::MidiEvent;
pub use notes::{HeldNoteSet, NoteTracker, Pitch};
pub use render::{ConsoleRenderer, StaffRenderer};
pub use session::{InputEvent, SessionHandle, SessionOptions, SessionState};
