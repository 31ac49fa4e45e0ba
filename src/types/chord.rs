use crate::types::dynamics::Dynamics;
use crate::types::note_event::{EventId, NoteEvents};

/// Notes that start together. The chord ends when its shortest note ends.
#[derive(Debug, Clone)]
pub struct Chord {
    start_tick: i64,
    end_tick: i64,
    has_too_many_notes: bool,
    notes: Vec<EventId>,
}

impl Chord {
    /// The game can't play more notes than this at once.
    pub const MAX_CHORD_NOTES: usize = 6;

    pub fn new(first: EventId, events: &NoteEvents) -> Self {
        let event = events.get(first);
        Self {
            start_tick: event.start_tick(),
            end_tick: event.end_tick(),
            has_too_many_notes: false,
            notes: vec![first],
        }
    }

    pub fn start_tick(&self) -> i64 {
        self.start_tick
    }

    pub fn end_tick(&self) -> i64 {
        self.end_tick
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn has_too_many_notes(&self) -> bool {
        self.has_too_many_notes
    }

    pub fn get(&self, i: usize) -> EventId {
        self.notes[i]
    }

    pub fn notes(&self) -> &[EventId] {
        &self.notes
    }

    /// Adds a note. Fails for zero-length notes and when the chord is full.
    pub fn add(&mut self, id: EventId, events: &NoteEvents) -> bool {
        let event = events.get(id);
        if event.length_ticks() == 0 {
            self.has_too_many_notes = true;
            return false;
        }
        if self.notes.len() >= Self::MAX_CHORD_NOTES {
            return false;
        }
        self.notes.push(id);
        self.end_tick = self.end_tick.min(event.end_tick());
        true
    }

    /// Removes the note at position `i`. The last remaining note is never removed.
    pub fn remove(&mut self, i: usize, events: &NoteEvents) -> Option<EventId> {
        if self.notes.len() <= 1 {
            return None;
        }
        let id = self.notes.remove(i);
        if events.get(id).end_tick() == self.end_tick {
            self.recalc_end_tick(events);
        }
        Some(id)
    }

    pub fn recalc_end_tick(&mut self, events: &NoteEvents) {
        if let Some(end) = self.notes.iter().map(|&id| events.get(id).end_tick()).min() {
            self.end_tick = end;
        }
    }

    /// Dynamics of the loudest note that isn't a rest or a tie continuation.
    pub fn calc_dynamics(&self, events: &NoteEvents) -> Option<Dynamics> {
        self.notes
            .iter()
            .map(|&id| events.get(id))
            .filter(|e| !e.note.is_rest() && e.ties_from.is_none())
            .map(|e| e.velocity)
            .max()
            .map(Dynamics::from_midi_velocity)
    }

    pub fn sort(&mut self, events: &NoteEvents) {
        self.notes.sort_by(|a, b| events.cmp(*a, *b));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::note::Note;
    use crate::types::note_event::NoteEvent;

    fn push(events: &mut NoteEvents, id: i32, start: i64, end: i64) -> EventId {
        events.push(NoteEvent::new(Note::from_id(id).unwrap(), 80, start, end))
    }

    #[test]
    fn test_end_tick_is_shortest_note() {
        let mut events = NoteEvents::new();
        let a = push(&mut events, 60, 0, 100);
        let b = push(&mut events, 64, 0, 50);
        let c = push(&mut events, 67, 0, 75);

        let mut chord = Chord::new(a, &events);
        assert!(chord.add(b, &events));
        assert!(chord.add(c, &events));
        assert_eq!(chord.end_tick(), 50);

        assert_eq!(chord.remove(1, &events), Some(b));
        assert_eq!(chord.end_tick(), 75);
    }

    #[test]
    fn test_capacity() {
        let mut events = NoteEvents::new();
        let first = push(&mut events, 48, 0, 10);
        let mut chord = Chord::new(first, &events);
        for i in 1..Chord::MAX_CHORD_NOTES as i32 {
            let id = push(&mut events, 48 + i, 0, 10);
            assert!(chord.add(id, &events));
        }
        let extra = push(&mut events, 60, 0, 10);
        assert!(!chord.add(extra, &events));
        assert_eq!(chord.len(), Chord::MAX_CHORD_NOTES);

        let empty = push(&mut events, 61, 0, 0);
        assert!(!chord.add(empty, &events));
        assert!(chord.has_too_many_notes());
    }

    #[test]
    fn test_remove_last_note() {
        let mut events = NoteEvents::new();
        let a = push(&mut events, 60, 0, 100);
        let mut chord = Chord::new(a, &events);
        assert_eq!(chord.remove(0, &events), None);
        assert_eq!(chord.len(), 1);
    }

    #[test]
    fn test_calc_dynamics() {
        let mut events = NoteEvents::new();
        let rest = events.push(NoteEvent::new(Note::REST, 127, 0, 10));
        let mut chord = Chord::new(rest, &events);
        assert_eq!(chord.calc_dynamics(&events), None);

        let quiet = events.push(NoteEvent::new(Note::C4, 32, 0, 10));
        let loud = events.push(NoteEvent::new(Note::C5, 96, 0, 10));
        chord.add(quiet, &events);
        chord.add(loud, &events);
        assert_eq!(chord.calc_dynamics(&events), Some(Dynamics::F));
    }
}
