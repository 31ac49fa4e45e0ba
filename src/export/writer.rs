use crate::timing::QuantizedTimingInfo;
use crate::types::chord::Chord;
use crate::types::dynamics::Dynamics;
use crate::types::note::Note;
use crate::types::note_event::{NoteEvent, NoteEvents};
use crate::util::{format_duration, gcd};

/// Longest line written to the tune body.
const LINE_LENGTH: usize = 160;

/// Wraps long bars at a space, continuing on a tab-indented line.
fn add_line_breaks(bar: &str) -> String {
    let mut out = bar.trim_end().to_string();
    let mut line_start = 0;
    while out.len() - line_start > LINE_LENGTH {
        let window = &out[line_start..line_start + LINE_LENGTH];
        let Some(space) = window.rfind(' ') else {
            break;
        };
        let at = line_start + space;
        out.replace_range(at..at + 1, "\n\t");
        line_start = at + 1;
    }
    out
}

/// Accidentals already written in the current bar, by natural pitch.
struct Accidentals {
    sharps: [bool; 128],
    flats: [bool; 128],
}

impl Accidentals {
    fn new() -> Self {
        Self {
            sharps: [false; 128],
            flats: [false; 128],
        }
    }

    fn reset(&mut self) {
        self.sharps = [false; 128];
        self.flats = [false; 128];
    }

    /// Spells `note` for the current bar. An accidental is written once and
    /// carries to the end of the bar; a natural cancels it with `=`.
    fn spell(&mut self, note: Note) -> String {
        if note.is_rest() {
            return note.abc();
        }
        let slot = note.natural_id() as usize;
        if slot >= self.sharps.len() {
            return note.abc();
        }
        let plain = || Note::from_id(slot as i32).map(|n| n.abc()).unwrap_or_default();

        if note.is_sharp() {
            if self.sharps[slot] {
                return plain();
            }
            self.sharps[slot] = true;
            self.flats[slot] = false;
            note.abc()
        } else if note.is_flat() {
            if self.flats[slot] {
                return plain();
            }
            self.flats[slot] = true;
            self.sharps[slot] = false;
            note.abc()
        } else if self.sharps[slot] || self.flats[slot] {
            self.sharps[slot] = false;
            self.flats[slot] = false;
            format!("={}", note.abc())
        } else {
            note.abc()
        }
    }
}

/// ABC length multiplier of `event`, relative to `L:` at the primary tempo.
fn note_length(event: &NoteEvent, qtm: &QuantizedTimingInfo) -> String {
    let tm = qtm.timing_info(event.start_tick());
    let mut numerator = (event.length_ticks() / tm.min_note_length_ticks()) * tm.default_divisor();
    let mut denominator = tm.min_note_divisor();

    // Notes under a tempo change are written at the primary tempo and
    // stretched to fit.
    let primary_bpm = qtm.primary_export_tempo_bpm() as i64;
    let bpm = tm.export_tempo_bpm() as i64;
    if bpm != primary_bpm {
        numerator *= primary_bpm;
        denominator *= bpm;
    }

    let divisor = gcd(numerator, denominator);
    if divisor > 1 {
        numerator /= divisor;
        denominator /= divisor;
    }

    match (numerator, denominator) {
        (1, 2) => "/".to_string(),
        (1, 4) => "//".to_string(),
        _ => {
            let mut out = String::new();
            if numerator != 1 {
                out.push_str(&numerator.to_string());
            }
            if denominator != 1 {
                out.push_str(&format!("/{}", denominator));
            }
            out
        }
    }
}

/// Writes the tune body for one part: bars, dynamics, tempo changes and the
/// final bar line.
pub(crate) fn write_chords(
    out: &mut String,
    events: &NoteEvents,
    chords: &mut [Chord],
    qtm: &QuantizedTimingInfo,
    song_start_tick: i64,
) {
    let start_bar = qtm.tick_to_bar_number(song_start_tick);
    let start_micros = qtm.tick_to_micros(song_start_tick);

    let mut bar = String::new();
    let mut accidentals = Accidentals::new();
    let mut cur_dyn: Option<Dynamics> = None;
    // The part header carries the primary tempo.
    let mut cur_tempo_mpq = qtm.primary_export_tempo_mpq();
    let mut last_bar_number = start_bar;

    for chord in chords.iter_mut() {
        let bar_number = qtm.tick_to_bar_number(chord.start_tick());
        if bar_number != last_bar_number {
            last_bar_number = bar_number;
            if !bar.is_empty() {
                out.push_str(&add_line_breaks(&bar));
                out.push_str(" |\n");
                bar.clear();
            }
            accidentals.reset();

            let bars_in = bar_number - start_bar + 1;
            if bars_in % 10 == 0 {
                let micros = qtm.bar_number_to_micros(bar_number) - start_micros;
                out.push_str(&format!("% Bar {} ({})\n", bars_in, format_duration(micros)));
            }
        }

        let tm = qtm.timing_info(chord.start_tick());
        if tm.export_tempo_mpq() != cur_tempo_mpq {
            cur_tempo_mpq = tm.export_tempo_mpq();
            if !bar.is_empty() {
                out.push_str(&add_line_breaks(&bar));
                out.push('\n');
                bar.clear();
                bar.push('\t');
            }
            out.push_str(&format!("%%Q: {}\n", tm.export_tempo_bpm()));
        }

        if let Some(dynamics) = chord.calc_dynamics(events) {
            if cur_dyn != Some(dynamics) {
                bar.push_str(&format!("+{}+ ", dynamics));
                cur_dyn = Some(dynamics);
            }
        }

        chord.sort(events);
        let bracketed = chord.len() > 1;
        if bracketed {
            bar.push('[');
        }
        let mut written = 0;
        for &id in chord.notes() {
            let event = events.get(id);
            if event.length_ticks() <= 0 {
                continue;
            }
            bar.push_str(&accidentals.spell(event.note));
            bar.push_str(&note_length(event, qtm));
            if event.ties_to.is_some() {
                bar.push('-');
            }
            written += 1;
        }
        if bracketed {
            if written == 0 {
                bar.pop();
            } else {
                bar.push(']');
            }
        }
        if written > 0 {
            bar.push(' ');
        }
    }

    out.push_str(&add_line_breaks(&bar));
    out.push_str(" |]\n\n");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(id: i32) -> Note {
        Note::from_id(id).unwrap()
    }

    #[test]
    fn test_line_breaks() {
        let bar = "c2 ".repeat(60);
        let wrapped = add_line_breaks(&bar);
        let lines: Vec<&str> = wrapped.split('\n').collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].len() <= LINE_LENGTH);
        assert!(lines[1].starts_with('\t'));
        assert!(!wrapped.ends_with(' '));
        assert_eq!(wrapped.matches("c2").count(), 60);

        assert_eq!(add_line_breaks("c2 d2 "), "c2 d2");
    }

    #[test]
    fn test_accidentals_carry_through_bar() {
        let mut acc = Accidentals::new();
        assert_eq!(acc.spell(note(61)), "^c");
        assert_eq!(acc.spell(note(61)), "c");
        assert_eq!(acc.spell(note(60)), "=c");
        assert_eq!(acc.spell(note(61)), "^c");

        let flat = note(58).enharmonic(false);
        assert_eq!(acc.spell(flat), "_B");
        assert_eq!(acc.spell(flat), "B");

        acc.reset();
        assert_eq!(acc.spell(note(61)), "^c");
        assert_eq!(acc.spell(Note::REST), "z");
    }
}
