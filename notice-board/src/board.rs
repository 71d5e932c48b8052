//! Shared in-memory board of notes and pins.
//!
//! All note and pin state lives behind one readers-writer lock. Writers
//! (`post`, `pin`, `unpin`, `shake`, `clear`) run to completion while holding
//! the exclusive guard, so readers only ever see whole operations. Queries
//! copy what they need into a [`Listing`] before the guard is released; no
//! I/O happens under the lock.

use std::{collections::HashSet, fmt, sync::Arc};

use tokio::sync::RwLock;

use crate::config::BoardConfig;

/// A point that holds notes down. Compared by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pin {
    pub x: u32,
    pub y: u32,
}

impl fmt::Display for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PIN {} {}", self.x, self.y)
    }
}

#[derive(Debug, Clone)]
pub struct Note {
    pub x: u32,
    pub y: u32,
    pub color: String,
    pub message: String,
    /// Creation order; never used for identity.
    pub seq: u64,
    /// Points currently pinning this note, in the order they were added.
    pub pins: Vec<Pin>,
}

impl Note {
    fn has_pin(&self, pin: Pin) -> bool {
        self.pins.contains(&pin)
    }

    fn is_pinned(&self) -> bool {
        !self.pins.is_empty()
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "NOTE {} {} {} {}",
            self.x, self.y, self.color, self.message
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostOutcome {
    Posted,
    OutOfBounds,
    CompleteOverlap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinOutcome {
    Pinned,
    NoNoteAtCoordinate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnpinOutcome {
    Unpinned,
    PinNotFound,
}

/// Snapshot returned by the read-only queries.
///
/// Renders as `OK <n> RESULTS`, one line per entry, then `END`, each line
/// newline-terminated.
#[derive(Debug, Clone)]
pub enum Listing {
    Notes(Vec<Note>),
    Pins(Vec<Pin>),
}

impl Listing {
    pub fn len(&self) -> usize {
        match self {
            Listing::Notes(notes) => notes.len(),
            Listing::Pins(pins) => pins.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for Listing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "OK {} RESULTS", self.len())?;
        match self {
            Listing::Notes(notes) => {
                for note in notes {
                    writeln!(f, "{note}")?;
                }
            }
            Listing::Pins(pins) => {
                for pin in pins {
                    writeln!(f, "{pin}")?;
                }
            }
        }
        writeln!(f, "END")
    }
}

#[derive(Default)]
struct BoardState {
    notes: Vec<Note>,
    last_seq: u64,
}

pub struct Board {
    config: Arc<BoardConfig>,
    state: RwLock<BoardState>,
}

impl Board {
    pub fn new(config: Arc<BoardConfig>) -> Self {
        Self {
            config,
            state: RwLock::new(BoardState::default()),
        }
    }

    pub fn config(&self) -> &Arc<BoardConfig> {
        &self.config
    }

    /// True when the point lies on the board surface.
    pub fn is_on_board_point(&self, x: u32, y: u32) -> bool {
        x < self.config.board_width() && y < self.config.board_height()
    }

    fn note_fits(&self, x: u32, y: u32) -> bool {
        u64::from(x) + u64::from(self.config.note_width()) <= u64::from(self.config.board_width())
            && u64::from(y) + u64::from(self.config.note_height())
                <= u64::from(self.config.board_height())
    }

    fn footprint_contains(&self, note: &Note, x: u32, y: u32) -> bool {
        let (x, y) = (u64::from(x), u64::from(y));
        let (left, top) = (u64::from(note.x), u64::from(note.y));
        left <= x
            && x < left + u64::from(self.config.note_width())
            && top <= y
            && y < top + u64::from(self.config.note_height())
    }

    pub async fn post(&self, x: u32, y: u32, color: &str, message: &str) -> PostOutcome {
        if !self.note_fits(x, y) {
            return PostOutcome::OutOfBounds;
        }

        let mut state = self.state.write().await;
        if state.notes.iter().any(|note| note.x == x && note.y == y) {
            return PostOutcome::CompleteOverlap;
        }

        state.last_seq += 1;
        let seq = state.last_seq;
        state.notes.push(Note {
            x,
            y,
            color: color.to_string(),
            message: message.to_string(),
            seq,
            pins: Vec::new(),
        });
        PostOutcome::Posted
    }

    /// Pins every note under the point that is not already held by it.
    pub async fn pin(&self, x: u32, y: u32) -> PinOutcome {
        let pin = Pin { x, y };
        let mut state = self.state.write().await;

        let mut pinned_any = false;
        for note in state.notes.iter_mut() {
            if !note.has_pin(pin) && self.footprint_contains(note, x, y) {
                note.pins.push(pin);
                pinned_any = true;
            }
        }

        if pinned_any {
            PinOutcome::Pinned
        } else {
            PinOutcome::NoNoteAtCoordinate
        }
    }

    /// Removes the point from the oldest note holding it. Other notes sharing
    /// the same point keep their pin.
    pub async fn unpin(&self, x: u32, y: u32) -> UnpinOutcome {
        let pin = Pin { x, y };
        let mut state = self.state.write().await;

        for note in state.notes.iter_mut() {
            if let Some(index) = note.pins.iter().position(|held| *held == pin) {
                note.pins.remove(index);
                return UnpinOutcome::Unpinned;
            }
        }
        UnpinOutcome::PinNotFound
    }

    /// Drops every unpinned note and reports how many went.
    pub async fn shake(&self) -> usize {
        let mut state = self.state.write().await;
        let before = state.notes.len();
        state.notes.retain(Note::is_pinned);
        before - state.notes.len()
    }

    pub async fn clear(&self) {
        self.state.write().await.notes.clear();
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.notes.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn all_notes(&self) -> Listing {
        let state = self.state.read().await;
        Listing::Notes(state.notes.clone())
    }

    pub async fn notes_by_color(&self, color: &str) -> Listing {
        let state = self.state.read().await;
        Listing::Notes(
            state
                .notes
                .iter()
                .filter(|note| note.color == color)
                .cloned()
                .collect(),
        )
    }

    pub async fn notes_at(&self, x: u32, y: u32) -> Listing {
        let state = self.state.read().await;
        Listing::Notes(
            state
                .notes
                .iter()
                .filter(|note| self.footprint_contains(note, x, y))
                .cloned()
                .collect(),
        )
    }

    /// Union of all pin points, first-seen order.
    pub async fn all_pins(&self) -> Listing {
        let state = self.state.read().await;
        let mut seen = HashSet::new();
        let pins = state
            .notes
            .iter()
            .flat_map(|note| note.pins.iter().copied())
            .filter(|pin| seen.insert(*pin))
            .collect();
        Listing::Pins(pins)
    }
}
