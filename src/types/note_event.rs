use crate::types::note::Note;
use std::cmp::Ordering;

/// Index of a [`NoteEvent`] inside a [`NoteEvents`] arena.
pub type EventId = usize;

/// A note (or rest) with a start and end tick. Tie links point at other
/// events of the same pitch in the same arena.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteEvent {
    pub note: Note,
    pub velocity: i32,
    start_tick: i64,
    end_tick: i64,
    pub ties_from: Option<EventId>,
    pub ties_to: Option<EventId>,
}

impl NoteEvent {
    pub fn new(note: Note, velocity: i32, start_tick: i64, end_tick: i64) -> Self {
        Self {
            note,
            velocity,
            start_tick,
            end_tick,
            ties_from: None,
            ties_to: None,
        }
    }

    pub fn start_tick(&self) -> i64 {
        self.start_tick
    }

    pub fn end_tick(&self) -> i64 {
        self.end_tick
    }

    pub fn set_start_tick(&mut self, tick: i64) {
        self.start_tick = tick;
    }

    pub fn set_end_tick(&mut self, tick: i64) {
        self.end_tick = tick;
    }

    pub fn length_ticks(&self) -> i64 {
        self.end_tick - self.start_tick
    }

    pub fn set_length_ticks(&mut self, length: i64) {
        self.end_tick = self.start_tick + length;
    }

    /// Start tick, then pitch, then end tick.
    pub fn cmp_position(&self, other: &NoteEvent) -> Ordering {
        self.start_tick
            .cmp(&other.start_tick)
            .then(self.note.id().cmp(&other.note.id()))
            .then(self.end_tick.cmp(&other.end_tick))
    }
}

/// Owns the note events of one part while it is being exported, so tie
/// links can be plain indices.
#[derive(Debug, Clone, Default)]
pub struct NoteEvents {
    events: Vec<NoteEvent>,
}

impl NoteEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: NoteEvent) -> EventId {
        self.events.push(event);
        self.events.len() - 1
    }

    pub fn get(&self, id: EventId) -> &NoteEvent {
        &self.events[id]
    }

    pub fn get_mut(&mut self, id: EventId) -> &mut NoteEvent {
        &mut self.events[id]
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn cmp(&self, a: EventId, b: EventId) -> Ordering {
        self.events[a].cmp_position(&self.events[b])
    }

    /// Index at which `id` should be inserted to keep `list` sorted.
    pub fn insertion_point(&self, list: &[EventId], id: EventId) -> usize {
        list.partition_point(|&other| self.cmp(other, id) == Ordering::Less)
    }

    /// First event of the tie chain `id` belongs to.
    pub fn tie_start(&self, mut id: EventId) -> EventId {
        while let Some(prev) = self.events[id].ties_from {
            id = prev;
        }
        id
    }

    /// Last event of the tie chain `id` belongs to.
    pub fn tie_end(&self, mut id: EventId) -> EventId {
        while let Some(next) = self.events[id].ties_to {
            id = next;
        }
        id
    }

    /// Splits an event in two at `tick`. The second half is returned. Notes
    /// are tied across the split; rests are not.
    pub fn split_with_tie_at_tick(&mut self, id: EventId, tick: i64) -> EventId {
        debug_assert!(tick > self.events[id].start_tick && tick < self.events[id].end_tick);

        let (note, velocity, end_tick, ties_to) = {
            let event = &self.events[id];
            (event.note, event.velocity, event.end_tick, event.ties_to)
        };
        let next = self.push(NoteEvent::new(note, velocity, tick, end_tick));
        self.events[id].end_tick = tick;

        if !note.is_rest() {
            if let Some(after) = ties_to {
                self.events[next].ties_to = Some(after);
                self.events[after].ties_from = Some(next);
            }
            self.events[next].ties_from = Some(id);
            self.events[id].ties_to = Some(next);
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(id: i32) -> Note {
        Note::from_id(id).unwrap()
    }

    #[test]
    fn test_split_with_tie() {
        let mut events = NoteEvents::new();
        let a = events.push(NoteEvent::new(note(60), 80, 0, 100));
        let b = events.split_with_tie_at_tick(a, 40);
        let c = events.split_with_tie_at_tick(a, 20);

        assert_eq!(events.get(a).end_tick(), 20);
        assert_eq!(events.get(c).start_tick(), 20);
        assert_eq!(events.get(c).end_tick(), 40);
        assert_eq!(events.get(b).end_tick(), 100);

        assert_eq!(events.get(a).ties_to, Some(c));
        assert_eq!(events.get(c).ties_to, Some(b));
        assert_eq!(events.get(b).ties_from, Some(c));
        assert_eq!(events.tie_start(b), a);
        assert_eq!(events.tie_end(a), b);
    }

    #[test]
    fn test_split_rest_has_no_tie() {
        let mut events = NoteEvents::new();
        let a = events.push(NoteEvent::new(Note::REST, 80, 0, 100));
        let b = events.split_with_tie_at_tick(a, 50);
        assert_eq!(events.get(a).ties_to, None);
        assert_eq!(events.get(b).ties_from, None);
        assert_eq!(events.get(b).length_ticks(), 50);
    }

    #[test]
    fn test_ordering() {
        let mut events = NoteEvents::new();
        let a = events.push(NoteEvent::new(note(62), 80, 0, 100));
        let b = events.push(NoteEvent::new(note(60), 80, 0, 200));
        let c = events.push(NoteEvent::new(note(60), 80, 0, 50));
        let d = events.push(NoteEvent::new(note(40), 80, 10, 20));

        let mut list = vec![a, b, c, d];
        list.sort_by(|x, y| events.cmp(*x, *y));
        assert_eq!(list, vec![c, b, a, d]);

        let e = events.push(NoteEvent::new(note(61), 80, 0, 10));
        assert_eq!(events.insertion_point(&list, e), 2);
    }
}
