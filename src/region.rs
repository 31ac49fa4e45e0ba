use crate::types::note::Note;
use std::cmp::Ordering;

/// Index of a region in [`crate::info::AbcInfo::regions`].
pub type RegionId = usize;

/// The span of source text that produced a note, rest or chord, and the
/// ticks it plays for. Lets a caller highlight what is playing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbcRegion {
    /// 0-based line, counted across all input files.
    pub line: usize,
    /// Character range within the line.
    pub start_index: usize,
    pub end_index: usize,
    pub start_tick: u64,
    pub end_tick: u64,
    /// `None` for a whole chord.
    pub note: Option<Note>,
    pub track_number: usize,
    pub ties_from: Option<RegionId>,
    pub ties_to: Option<RegionId>,
}

impl AbcRegion {
    pub fn new(
        line: usize,
        start_index: usize,
        end_index: usize,
        start_tick: u64,
        end_tick: u64,
        note: Option<Note>,
        track_number: usize,
    ) -> Self {
        Self {
            line,
            start_index,
            end_index,
            start_tick,
            end_tick,
            note,
            track_number,
            ties_from: None,
            ties_to: None,
        }
    }

    pub fn is_chord(&self) -> bool {
        self.note.is_none()
    }

    /// Playback order: by ticks, then by source position.
    pub fn cmp_position(&self, other: &AbcRegion) -> Ordering {
        self.start_tick
            .cmp(&other.start_tick)
            .then(self.end_tick.cmp(&other.end_tick))
            .then(self.line.cmp(&other.line))
            .then(self.start_index.cmp(&other.start_index))
            .then(self.end_index.cmp(&other.end_index))
    }
}
