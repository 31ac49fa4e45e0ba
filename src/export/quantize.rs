use super::PartView;
use crate::timing::{QuantizedTimingInfo, floor_grid};
use crate::types::chord::Chord;
use crate::types::dynamics::Dynamics;
use crate::types::instrument::Instrument;
use crate::types::note::Note;
use crate::types::note_event::{EventId, NoteEvent, NoteEvents};
use log::{debug, trace};

/// A part's notes on the export grid, grouped into chords in tick order.
#[derive(Debug, Clone, Default)]
pub struct Quantized {
    pub events: NoteEvents,
    pub chords: Vec<Chord>,
}

fn rest(start_tick: i64, end_tick: i64) -> NoteEvent {
    NoteEvent::new(Note::REST, Dynamics::DEFAULT.midi_vol(), start_tick, end_tick)
}

fn insert_sorted(events: &NoteEvents, list: &mut Vec<EventId>, id: EventId) -> usize {
    let index = events.insertion_point(list, id);
    list.insert(index, id);
    index
}

/// Merges the enabled tracks of a part, snaps every note to the grid and
/// groups the result into chords.
///
/// Without `add_ties` chords are shortened with rests instead of split notes,
/// which sounds the same in game but is harder to read.
pub fn combine_and_quantize<P: PartView + ?Sized>(
    part: &P,
    qtm: &QuantizedTimingInfo,
    add_ties: bool,
    song_start_tick: i64,
    song_end_tick: i64,
) -> Quantized {
    let mut events = NoteEvents::new();
    let mut list = Vec::new();

    for t in (0..part.track_count()).filter(|&t| part.is_track_enabled(t)) {
        let volume_adjust = part.track_volume_adjust(t);
        for ne in part.track_events(t) {
            if ne.end_tick() <= song_start_tick || ne.start_tick() >= song_end_tick {
                continue;
            }
            if let Some(note) = part.map_note(t, ne.note.id()) {
                list.push(events.push(NoteEvent::new(
                    note,
                    ne.velocity + volume_adjust,
                    ne.start_tick().max(song_start_tick),
                    ne.end_tick().min(song_end_tick),
                )));
            }
        }
    }

    if list.is_empty() {
        return Quantized::default();
    }
    list.sort_by(|a, b| events.cmp(*a, *b));

    list.retain(|&id| {
        let start = qtm.quantize(events.get(id).start_tick());
        let end = qtm.quantize(events.get(id).end_tick());
        let event = events.get_mut(id);
        event.set_start_tick(start);
        event.set_end_tick(end);
        if event.length_ticks() > 0 {
            return true;
        }
        if event.note.is_rest() {
            return false;
        }
        event.set_length_ticks(qtm.timing_info(start).min_note_length_ticks());
        true
    });
    if list.is_empty() {
        return Quantized::default();
    }

    let start = qtm.quantize(song_start_tick);
    let first_start = events.get(list[0]).start_tick();
    if first_start > start {
        list.insert(0, events.push(rest(start, first_start)));
    }

    let end = qtm.quantize(song_end_tick);
    if let Some(&last) = list.last() {
        let last_end = events.get(last).end_tick();
        if last_end < end {
            if events.get(last).note.is_rest() {
                events.get_mut(last).set_end_tick(end);
            } else {
                list.push(events.push(rest(last_end, end)));
            }
        }
    }

    remove_duplicates(&mut events, &mut list);
    break_long_notes(part.instrument(), qtm, &mut events, &mut list, add_ties);
    let chords = build_chords(part.instrument(), qtm, &mut events, &mut list, add_ties);

    debug!(
        "Part {}: {} notes in {} chords",
        part.part_number(),
        list.len(),
        chords.len()
    );
    Quantized { events, chords }
}

/// Notes of the same pitch that start together are merged into the longer
/// one. A note that overlaps a later one of the same pitch is cut where the
/// later one starts.
fn remove_duplicates(events: &mut NoteEvents, list: &mut Vec<EventId>) {
    let mut notes_on: Vec<EventId> = Vec::new();
    let mut i = 0;
    'next: while i < list.len() {
        let id = list[i];
        let mut j = 0;
        while j < notes_on.len() {
            let on = notes_on[j];
            let (on_start, on_end, on_pitch) = {
                let e = events.get(on);
                (e.start_tick(), e.end_tick(), e.note.id())
            };
            let (start, end, pitch) = {
                let e = events.get(id);
                (e.start_tick(), e.end_tick(), e.note.id())
            };

            if on_end < start {
                notes_on.remove(j);
                continue;
            }
            if on_pitch == pitch {
                if on_start == start {
                    if on_end < end {
                        events.get_mut(on).set_end_tick(end);
                    }
                    list.remove(i);
                    continue 'next;
                }
                if end < on_end {
                    events.get_mut(id).set_end_tick(on_end);
                }
                events.get_mut(on).set_end_tick(start);
                notes_on.remove(j);
                continue;
            }
            j += 1;
        }
        notes_on.push(id);
        i += 1;
    }
}

/// Cuts notes the game can't hold and, with `add_ties`, ties notes across
/// bar lines, tempo changes and the beat grid of their bar.
fn break_long_notes(
    instrument: Instrument,
    qtm: &QuantizedTimingInfo,
    events: &mut NoteEvents,
    list: &mut Vec<EventId>,
    add_ties: bool,
) {
    let mut i = 0;
    while i < list.len() {
        let id = list[i];
        let (note, velocity, start, end) = {
            let e = events.get(id);
            (e.note, e.velocity, e.start_tick(), e.end_tick())
        };
        let tm = *qtm.timing_info(start);
        let mut max_end = start + tm.max_note_length_ticks();

        // Bagpipe drones hold forever.
        let is_drone = instrument == Instrument::Bagpipe && note.id() <= Note::B2.id();
        if end > max_end && !note.is_rest() && !is_drone {
            let end_bar_tick = qtm.tick_to_bar_start_tick(max_end);
            if qtm.tick_to_bar_end_tick(start) < end_bar_tick {
                max_end = end_bar_tick;
            }

            if instrument.is_sustainable(note.id()) {
                let next = events.push(NoteEvent::new(note, velocity, max_end, end));
                insert_sorted(events, list, next);

                // A short tail is tied on rather than struck again.
                let bar_length = qtm.timing_info(max_end).bar_length_ticks();
                if add_ties && end - max_end < bar_length {
                    events.get_mut(next).ties_from = Some(id);
                    events.get_mut(id).ties_to = Some(next);
                }
            }
            trace!("Cut {} at tick {} to {}", note, start, max_end);
            events.get_mut(id).set_end_tick(max_end);
        }

        if add_ties {
            let (start, end) = {
                let e = events.get(id);
                (e.start_tick(), e.end_tick())
            };
            let mut target = end.min(qtm.tick_to_bar_end_tick(start));
            if let Some(next_tempo) = qtm.next_timing_event(start) {
                target = target.min(next_tempo.tick);
            }

            // Quarter notes start on quarter-note boundaries inside the bar,
            // eighths on eighth-note boundaries and so on. Dotted lengths are
            // allowed.
            let bar_start = qtm.tick_to_bar_start_tick(start);
            let grid = tm.min_note_length_ticks();
            let meter = tm.meter();
            let whole_note =
                tm.bar_length_ticks() * meter.denominator() as i64 / meter.numerator() as i64;
            let offset = start - bar_start;
            let mut unit = whole_note;
            while unit > grid * 2 {
                if floor_grid(offset, unit) == offset && target >= start + unit {
                    if target != start + unit * 3 / 2 {
                        target = start + unit;
                    }
                    break;
                }
                unit /= 2;
            }

            if end > target {
                let next = events.split_with_tie_at_tick(id, target);
                insert_sorted(events, list, next);
            }
        }
        i += 1;
    }
}

/// Removes the note at `index` along with the rest of its tie chain. An
/// incoming tie is broken.
fn remove_note(events: &mut NoteEvents, list: &mut Vec<EventId>, index: usize) {
    let id = list.remove(index);
    if let Some(prev) = events.get(id).ties_from {
        events.get_mut(prev).ties_to = None;
        events.get_mut(id).ties_from = None;
    }
    let mut next = events.get(id).ties_to;
    while let Some(tied) = next {
        if let Some(position) = list.iter().position(|&other| other == tied) {
            list.remove(position);
        }
        next = events.get(tied).ties_to;
    }
}

fn build_chords(
    instrument: Instrument,
    qtm: &QuantizedTimingInfo,
    events: &mut NoteEvents,
    list: &mut Vec<EventId>,
    add_ties: bool,
) -> Vec<Chord> {
    let mut chords = Vec::with_capacity(list.len() / 2);
    let Some(&first) = list.first() else {
        return chords;
    };
    let mut dropped = 0;
    let mut cur = Chord::new(first, events);

    let mut i = 1;
    while i < list.len() {
        let id = list[i];
        if cur.start_tick() == events.get(id).start_tick() {
            if cur.add(id, events) {
                i += 1;
            } else {
                remove_note(events, list, i);
                dropped += 1;
            }
            continue;
        }

        let next = Chord::new(id, events);
        if add_ties {
            // Every note of the chord ends when the chord does, and no later
            // than the next chord starts.
            let target = next.start_tick().min(cur.end_tick());
            let mut reprocess = false;
            for &note in cur.notes() {
                if events.get(note).end_tick() > target {
                    let tail = events.split_with_tie_at_tick(note, target);
                    if insert_sorted(events, list, tail) == i {
                        reprocess = true;
                    }
                }
            }
            if target < cur.end_tick() {
                cur.recalc_end_tick(events);
            }
            if reprocess {
                continue;
            }
        } else {
            if cur.end_tick() > next.start_tick() {
                while cur.len() >= Chord::MAX_CHORD_NOTES {
                    let Some(removed) = cur.remove(cur.len() - 1, events) else {
                        break;
                    };
                    if let Some(index) = list.iter().position(|&other| other == removed) {
                        remove_note(events, list, index);
                        dropped += 1;
                    }
                }
                if let Some(index) = list.iter().position(|&other| other == id) {
                    i = index;
                }
            }
            if cur.end_tick() > next.start_tick() {
                let shortener = events.push(rest(cur.start_tick(), next.start_tick()));
                cur.add(shortener, events);
            }
        }

        let gap = (cur.end_tick() < next.start_tick())
            .then(|| events.push(rest(cur.end_tick(), next.start_tick())));
        chords.push(cur);
        if let Some(gap) = gap {
            let mut rests = vec![gap];
            break_long_notes(instrument, qtm, events, &mut rests, add_ties);
            chords.extend(rests.into_iter().map(|r| Chord::new(r, &*events)));
        }

        cur = next;
        i += 1;
    }
    chords.push(cur);

    if dropped > 0 {
        debug!("Dropped {} notes from chords that were too large", dropped);
    }
    chords
}
