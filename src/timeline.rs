use crate::types::key_signature::KeySignature;
use crate::types::time_signature::TimeSignature;
use std::fmt;

pub const CONTROLLER_VOLUME: u8 = 7;
pub const CONTROLLER_PAN: u8 = 10;
pub const CONTROLLER_REVERB: u8 = 91;
pub const CONTROLLER_CHORUS: u8 = 93;

/// The channel General MIDI reserves for percussion.
pub const DRUM_CHANNEL: u8 = 9;

pub const DEFAULT_MICROS_PER_QUARTER: u32 = 500_000;

#[derive(Debug, Clone, PartialEq)]
pub enum TimelineEvent {
    NoteOn {
        channel: u8,
        key: u8,
        velocity: u8,
    },
    NoteOff {
        channel: u8,
        key: u8,
    },
    ProgramChange {
        channel: u8,
        program: u8,
    },
    Controller {
        channel: u8,
        controller: u8,
        value: u8,
    },
    Tempo {
        micros_per_quarter: u32,
    },
    TimeSignature(TimeSignature),
    KeySignature(KeySignature),
    TrackName(String),
}

impl TimelineEvent {
    pub fn channel(&self) -> Option<u8> {
        match self {
            TimelineEvent::NoteOn { channel, .. }
            | TimelineEvent::NoteOff { channel, .. }
            | TimelineEvent::ProgramChange { channel, .. }
            | TimelineEvent::Controller { channel, .. } => Some(*channel),
            _ => None,
        }
    }

    /// Note-ons with zero velocity count as note-offs.
    pub fn is_note_off(&self) -> bool {
        matches!(
            self,
            TimelineEvent::NoteOff { .. } | TimelineEvent::NoteOn { velocity: 0, .. }
        )
    }

    pub fn is_note_on(&self) -> bool {
        matches!(self, TimelineEvent::NoteOn { velocity, .. } if *velocity > 0)
    }
}

impl fmt::Display for TimelineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimelineEvent::NoteOn {
                channel,
                key,
                velocity,
            } => write!(f, "on ch={} key={} vel={}", channel, key, velocity),
            TimelineEvent::NoteOff { channel, key } => write!(f, "off ch={} key={}", channel, key),
            TimelineEvent::ProgramChange { channel, program } => {
                write!(f, "program ch={} {}", channel, program)
            }
            TimelineEvent::Controller {
                channel,
                controller,
                value,
            } => write!(f, "cc ch={} {}={}", channel, controller, value),
            TimelineEvent::Tempo { micros_per_quarter } => write!(
                f,
                "tempo {:.2}",
                60_000_000.0 / *micros_per_quarter as f64
            ),
            TimelineEvent::TimeSignature(meter) => write!(f, "meter {}", meter),
            TimelineEvent::KeySignature(key) => write!(f, "key {}", key),
            TimelineEvent::TrackName(name) => write!(f, "name \"{}\"", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimedEvent {
    pub tick: u64,
    pub event: TimelineEvent,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Track {
    events: Vec<TimedEvent>,
}

impl Track {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event and returns its index. Indices stay valid until
    /// [`Track::sort`] is called.
    pub fn add(&mut self, tick: u64, event: TimelineEvent) -> usize {
        self.events.push(TimedEvent { tick, event });
        self.events.len() - 1
    }

    pub fn insert(&mut self, index: usize, tick: u64, event: TimelineEvent) {
        let index = index.min(self.events.len());
        self.events.insert(index, TimedEvent { tick, event });
    }

    pub fn events(&self) -> &[TimedEvent] {
        &self.events
    }

    pub fn event_mut(&mut self, index: usize) -> &mut TimedEvent {
        &mut self.events[index]
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn last_tick(&self) -> u64 {
        self.events.iter().map(|e| e.tick).max().unwrap_or(0)
    }

    pub fn name(&self) -> Option<&str> {
        self.events.iter().find_map(|e| match &e.event {
            TimelineEvent::TrackName(name) => Some(name.as_str()),
            _ => None,
        })
    }

    pub fn has_notes(&self) -> bool {
        self.events.iter().any(|e| e.event.is_note_on())
    }

    /// Orders events by tick. Events sharing a tick keep the order they were added in.
    pub fn sort(&mut self) {
        self.events.sort_by_key(|e| e.tick);
    }
}

/// A tick-timed event sequence. Track 0 holds the tempo map and song
/// metadata, each following track holds one part.
#[derive(Debug, Clone, PartialEq)]
pub struct Timeline {
    ppqn: u32,
    tracks: Vec<Track>,
}

impl Timeline {
    pub fn new(ppqn: u32) -> Self {
        Self {
            ppqn,
            tracks: Vec::new(),
        }
    }

    /// Ticks per quarter note.
    pub fn ppqn(&self) -> u32 {
        self.ppqn
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    pub fn track_mut(&mut self, index: usize) -> Option<&mut Track> {
        self.tracks.get_mut(index)
    }

    pub fn create_track(&mut self) -> usize {
        self.tracks.push(Track::new());
        self.tracks.len() - 1
    }

    pub fn last_tick(&self) -> u64 {
        self.tracks.iter().map(Track::last_tick).max().unwrap_or(0)
    }

    pub fn sort(&mut self) {
        for track in &mut self.tracks {
            track.sort();
        }
    }
}

impl fmt::Display for Timeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ppqn {}", self.ppqn)?;
        for (i, track) in self.tracks.iter().enumerate() {
            writeln!(f, "track {}", i)?;
            for e in track.events() {
                writeln!(f, "{:>8} {}", e.tick, e.event)?;
            }
        }
        Ok(())
    }
}
