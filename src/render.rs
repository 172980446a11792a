//! Staff rendering of the held-note set
//!
//! The session never draws anything itself; a [`StaffRenderer`] receives the
//! ordered pitch descriptors of the held notes whenever the set changes.

use std::io::{self, Write};

use anyhow::{Context, Result};
use colored::Colorize;

use crate::midi::MidiEvent;
use crate::notes::Pitch;

/// Consumer of held-note changes
pub trait StaffRenderer {
    /// Draw the held notes, ordered from lowest to highest. An empty slice
    /// means nothing is held.
    fn render(&mut self, keys: &[Pitch]) -> Result<()>;
}

/// Writes one line per change to a terminal or any other writer
pub struct ConsoleRenderer<W: Write> {
    out: W,
    color: bool,
}

impl ConsoleRenderer<io::Stdout> {
    pub fn stdout(color: bool) -> Self {
        Self::new(io::stdout(), color)
    }
}

impl<W: Write> ConsoleRenderer<W> {
    pub fn new(out: W, color: bool) -> Self {
        Self { out, color }
    }

    /// Print a single decoded event (`display.show_events`)
    pub fn event(&mut self, event: &MidiEvent) -> Result<()> {
        let line = event.to_string();
        let line = match (self.color, event) {
            (true, MidiEvent::NoteOn { .. }) => line.green().to_string(),
            (true, MidiEvent::NoteOff { .. }) => line.yellow().to_string(),
            (true, MidiEvent::Unknown { .. }) => line.dimmed().to_string(),
            (false, _) => line,
        };
        writeln!(self.out, "  {}", line).context("Failed to write event")?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> StaffRenderer for ConsoleRenderer<W> {
    fn render(&mut self, keys: &[Pitch]) -> Result<()> {
        let line = if keys.is_empty() {
            let rest = "rest";
            if self.color {
                rest.dimmed().to_string()
            } else {
                rest.to_string()
            }
        } else {
            keys.iter()
                .map(|p| {
                    let text = p.to_string();
                    if self.color {
                        text.cyan().bold().to_string()
                    } else {
                        text
                    }
                })
                .collect::<Vec<_>>()
                .join(" ")
        };

        writeln!(self.out, "♪ {}", line).context("Failed to write staff line")?;
        self.out.flush().context("Failed to flush staff output")?;
        Ok(())
    }
}
