use crate::config::ParseParams;
use crate::error::ParseError;
use crate::file::AbcFile;
use crate::info::AbcInfo;
use crate::note_parser::{NoteToken, Scanner, Token, Tuplet};
use crate::pan::{CENTER, PanGenerator};
use crate::region::{AbcRegion, RegionId};
use crate::timeline::{
    CONTROLLER_CHORUS, CONTROLLER_PAN, CONTROLLER_REVERB, CONTROLLER_VOLUME, DRUM_CHANNEL,
    Timeline, TimelineEvent,
};
use crate::tune::{TuneInfo, UNIT_NOTE_TICKS};
use crate::types::chord::Chord;
use crate::types::field::AbcField;
use crate::types::instrument::Instrument;
use crate::types::key_signature::KeyMode;
use crate::types::note::{LETTER_DELTA, Note};
use crate::util::gcd;
use log::{debug, trace};
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use std::collections::HashMap;

static INFO_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Z]):\s*(.*)\s*$").expect("valid pattern"));
static EXTENDED_INFO_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*%%([A-Za-z\-]+)((:?)|\s)\s*(.*)\s*$").expect("valid pattern")
});

pub const MAX_CHANNELS: u8 = 16;
pub const SHORTEST_NOTE_MICROS: f64 = 60_000.0;
pub const LONGEST_NOTE_MICROS: f64 = 8_000_000.0;
/// How long a plucked or struck note rings in game.
pub const NON_SUSTAINED_NOTE_SECONDS: f64 = 1.0;
/// The shortest sound a held note makes in game.
pub const SUSTAINED_NOTE_MIN_SECONDS: f64 = 0.25;
pub const REVERB_SEND: u8 = 40;
pub const CHORUS_SEND: u8 = 0;
/// General MIDI pitches used for cowbells when not rendering game voices.
const GM_COWBELL: i32 = 76;
const GM_MOOR_COWBELL: i32 = 71;
const GAME_COWBELL_NOTE: i32 = 71;

/// Channel for a track, skipping the percussion channel.
pub fn track_channel(track_index: usize) -> usize {
    if track_index < DRUM_CHANNEL as usize {
        track_index
    } else {
        track_index + 1
    }
}

/// Byte offset in `s` to character column.
fn column_of(s: &str, byte_offset: usize) -> usize {
    s[..byte_offset].chars().count()
}

/// Multiplies a note length by `by_numerator / by_denominator`, kept in
/// lowest terms. `None` when the length no longer fits.
fn scale_length(length: (i64, i64), by_numerator: i64, by_denominator: i64) -> Option<(i64, i64)> {
    let numerator = length.0.checked_mul(by_numerator)?;
    let denominator = length.1.checked_mul(by_denominator)?;
    let divisor = gcd(numerator, denominator);
    if divisor == 0 {
        return None;
    }
    Some((numerator / divisor, denominator / divisor))
}

/// Where an open tie was written.
#[derive(Debug, Clone)]
struct TieSource {
    file: String,
    line: usize,
    column: usize,
}

/// A note-off that may still be cut short by a re-struck note of the same pitch.
#[derive(Debug, Clone, Copy)]
struct PendingNoteOff {
    event: usize,
    key: i32,
}

/// Parse state carried from line to line and file to file.
struct AbcParser<'p> {
    params: &'p mut ParseParams,
    info: TuneInfo,
    abc_info: AbcInfo,
    timeline: Option<Timeline>,
    ppqn: u64,

    file: String,
    line_number: usize,
    global_line: Option<usize>,
    part_start_line: usize,
    note_divisor_change_line: usize,

    /// Count of `X:` parts seen so far.
    track_number: usize,
    /// Timeline track the current part writes to.
    track: Option<usize>,
    track_index: usize,
    channel: u8,
    track_parts: Vec<(usize, usize)>,

    chord_start_index: usize,
    chord_start_tick: f64,
    chord_end_tick: f64,

    tied_notes: HashMap<i32, TieSource>,
    tied_regions: HashMap<i32, RegionId>,
    accidentals: HashMap<i32, i32>,
    note_offs: Vec<PendingNoteOff>,
}

/// Per-line scanning state.
#[derive(Debug, Default)]
struct LineState {
    in_chord: bool,
    chord_size: usize,
    tuplet: Option<Tuplet>,
    broken_numerator: i64,
    broken_denominator: i64,
}

impl LineState {
    fn new() -> Self {
        Self {
            broken_numerator: 1,
            broken_denominator: 1,
            ..Default::default()
        }
    }

    fn has_broken_rhythm(&self) -> bool {
        self.broken_numerator != 1 || self.broken_denominator != 1
    }
}

/// Converts ABC text into a timeline plus the song metadata. Files are read
/// in order as one song.
pub fn convert(
    sources: &[AbcFile],
    params: &mut ParseParams,
) -> Result<(Timeline, AbcInfo), ParseError> {
    let mut parser = AbcParser::new(params);
    for source in sources {
        parser.begin_file(&source.name);
        for line in &source.lines {
            parser.parse_line(line)?;
        }
        parser.end_file()?;
    }
    parser.finish()
}

impl<'p> AbcParser<'p> {
    fn new(params: &'p mut ParseParams) -> Self {
        Self {
            params,
            info: TuneInfo::new(),
            abc_info: AbcInfo::new(),
            timeline: None,
            ppqn: 0,
            file: String::new(),
            line_number: 0,
            global_line: None,
            part_start_line: 0,
            note_divisor_change_line: 0,
            track_number: 0,
            track: None,
            track_index: 0,
            channel: 0,
            track_parts: Vec::new(),
            chord_start_index: 0,
            chord_start_tick: 0.0,
            chord_end_tick: 0.0,
            tied_notes: HashMap::new(),
            tied_regions: HashMap::new(),
            accidentals: HashMap::new(),
            note_offs: Vec::new(),
        }
    }

    fn structural(&self, column: usize, message: impl Into<String>) -> ParseError {
        ParseError::structural(&self.file, self.line_number, Some(column), message)
    }

    fn validation(&self, column: usize, message: impl Into<String>) -> ParseError {
        ParseError::validation(&self.file, self.line_number, Some(column), message)
    }

    fn global_line(&self) -> usize {
        self.global_line.unwrap_or(0)
    }

    fn override_for(&self, track_number: usize) -> Option<Instrument> {
        self.params
            .instrument_overrides
            .get(&(track_number as u32))
            .copied()
    }

    fn open_tie_error(&self) -> Option<ParseError> {
        self.tied_notes
            .values()
            .min_by_key(|tie| (tie.line, tie.column))
            .map(|tie| {
                ParseError::structural(
                    &tie.file,
                    tie.line,
                    Some(tie.column),
                    "Tied note does not connect to another note",
                )
            })
    }

    fn begin_file(&mut self, name: &str) {
        self.file = name.to_string();
        self.line_number = 0;
        self.part_start_line = 0;
        self.track = None;
    }

    fn end_file(&mut self) -> Result<(), ParseError> {
        if self.timeline.is_none() {
            return Err(ParseError::structural(
                &self.file,
                self.line_number,
                None,
                "The file contains no notes",
            ));
        }
        match self.open_tie_error() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn parse_line(&mut self, raw_line: &str) -> Result<(), ParseError> {
        self.global_line = Some(self.global_line.map_or(0, |l| l + 1));
        self.line_number += 1;

        if let Some(caps) = EXTENDED_INFO_LINE.captures(raw_line) {
            let name = format!(
                "{}{}",
                caps.get(1).map_or("", |m| m.as_str()),
                caps.get(3).map_or("", |m| m.as_str())
            );
            if let Some(field) = AbcField::from_name(&name) {
                let value_match = caps.get(4);
                let value = value_match.map_or("", |m| m.as_str()).trim();
                let column = value_match.map_or(0, |m| column_of(raw_line, m.start()));
                self.extended_info(field, value, column)?;
            }
            return Ok(());
        }

        let line = match raw_line.find('%') {
            Some(comment) => &raw_line[..comment],
            None => raw_line,
        };
        if line.trim().is_empty() {
            return Ok(());
        }

        if let Some(caps) = INFO_LINE.captures(line) {
            let kind = caps
                .get(1)
                .and_then(|m| m.as_str().chars().next())
                .unwrap_or(' ');
            let value_match = caps.get(2);
            let value = value_match.map_or("", |m| m.as_str()).trim();
            let column = value_match.map_or(0, |m| column_of(line, m.start()));
            self.abc_info.set_metadata(kind, value);
            self.header(kind, value, column)
        } else {
            self.notes(line)
        }
    }

    fn extended_info(&mut self, field: AbcField, value: &str, column: usize) -> Result<(), ParseError> {
        match field {
            AbcField::Tempo => {
                let tick = self.chord_start_tick.round() as u64;
                self.info
                    .add_tempo_event(tick, value)
                    .map_err(|e| self.structural(column, e.to_string()))?;
                debug!("Tempo change to {} at tick {}", value, tick);
            }
            AbcField::PartName => {
                self.abc_info.set_extended_metadata(field, value);
                self.info.set_title(value, true);
                self.abc_info.set_part_name(self.track_number, value, true);
                if self.override_for(self.track_number).is_none() {
                    if let Some(instrument) = Instrument::find_in_name(value) {
                        self.info.set_instrument(instrument);
                    }
                }
            }
            _ => self.abc_info.set_extended_metadata(field, value),
        }
        Ok(())
    }

    fn header(&mut self, kind: char, value: &str, column: usize) -> Result<(), ParseError> {
        let to_err = |parser: &Self, e: anyhow::Error| parser.structural(column, e.to_string());
        match kind {
            'X' => {
                if let Some(err) = self.open_tie_error() {
                    return Err(err);
                }
                self.accidentals.clear();
                self.note_offs.clear();

                if self.track_number > 0 {
                    let end = self.global_line().saturating_sub(1);
                    self.abc_info.set_part_end_line(self.track_number, end);
                }

                let number: u32 = value
                    .parse()
                    .map_err(|_| self.structural(column, format!("Invalid part number \"{}\"", value)))?;
                self.info.new_part(number);
                self.track_number += 1;
                self.part_start_line = self.line_number;
                self.chord_start_tick = 0.0;
                self.chord_end_tick = 0.0;
                self.abc_info.set_part_number(self.track_number, number);
                self.abc_info
                    .set_part_start_line(self.track_number, self.global_line());
                self.track = None;
                if let Some(instrument) = self.override_for(self.track_number) {
                    self.info.set_instrument(instrument);
                }
                debug!(
                    "Part {} (X:{}) starts at line {}",
                    self.track_number, number, self.line_number
                );
            }
            'T' => {
                if self.track.is_some() {
                    return Err(self.structural(0, "Can't specify the title in the middle of a part"));
                }
                self.info.set_title(value, false);
                self.abc_info.set_part_name(self.track_number, value, false);
                if self.override_for(self.track_number).is_none() && !self.info.is_instrument_set() {
                    if let Some(instrument) = Instrument::find_in_name(value) {
                        self.info.set_instrument(instrument);
                    }
                }
            }
            'K' => self.info.set_key(value).map_err(|e| to_err(self, e))?,
            'L' => {
                self.info.set_note_divisor(value).map_err(|e| to_err(self, e))?;
                self.note_divisor_change_line = self.line_number;
            }
            'M' => {
                self.info.set_meter(value).map_err(|e| to_err(self, e))?;
                self.note_divisor_change_line = self.line_number;
            }
            'Q' => {
                let tempo = self.info.primary_tempo_bpm();
                self.info.set_primary_tempo(value).map_err(|e| to_err(self, e))?;
                if self.timeline.is_some() && self.info.primary_tempo_bpm() != tempo {
                    return Err(ParseError::structural(
                        &self.file,
                        self.line_number,
                        None,
                        "The tempo must be the same for all parts of the song",
                    ));
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn start_song(&mut self) {
        self.ppqn = self.info.ppqn();
        let mut timeline = Timeline::new(self.ppqn as u32);
        timeline.create_track();
        self.timeline = Some(timeline);
        self.abc_info
            .set_primary_tempo_bpm(self.info.primary_tempo_bpm());
        self.abc_info.set_part_number(0, 0);
        self.abc_info.set_part_name(0, self.info.title(), false);
        self.abc_info.set_time_signature(self.info.meter());
        self.abc_info.set_key_signature(self.info.key());
        self.track = None;
        debug!("Song resolution is {} ticks per quarter note", self.ppqn);
    }

    /// Creates the song track on the first note line and a part track on
    /// the first note line of each part.
    fn ensure_track(&mut self) -> Result<usize, ParseError> {
        if self.track_number == 0 {
            self.track_number = 1;
            if let Some(instrument) = self.override_for(1) {
                self.info.set_instrument(instrument);
            }
        }

        if self.timeline.is_none() {
            self.start_song();
        }
        if let Some(track) = self.track {
            return Ok(track);
        }

        let ppqn = self.ppqn as u32;
        let timeline = self.timeline.get_or_insert_with(|| Timeline::new(ppqn));
        let track_index = timeline.tracks().len();
        let channel = track_channel(track_index);
        if channel > (MAX_CHANNELS - 1) as usize {
            return Err(ParseError::structural(
                &self.file,
                self.part_start_line,
                None,
                format!("Too many parts (max = {})", MAX_CHANNELS - 1),
            ));
        }
        let channel = channel as u8;
        let track_index = timeline.create_track();
        let instrument = self.info.instrument();
        if let Some(track) = timeline.track_mut(track_index) {
            track.add(
                0,
                TimelineEvent::ProgramChange {
                    channel,
                    program: instrument.program(),
                },
            );
            if self.params.use_native_instruments {
                for (controller, value) in [
                    (CONTROLLER_VOLUME, 127),
                    (CONTROLLER_REVERB, REVERB_SEND),
                    (CONTROLLER_CHORUS, CHORUS_SEND),
                ] {
                    track.add(
                        1,
                        TimelineEvent::Controller {
                            channel,
                            controller,
                            value,
                        },
                    );
                }
            }
        }
        debug!(
            "Track {} for part {} on channel {} plays {}",
            track_index, self.track_number, channel, instrument
        );

        self.abc_info
            .set_part_instrument(self.track_number, instrument);
        self.track_parts.push((track_index, self.track_number));
        self.abc_info.set_track_part(track_index, self.track_number);
        self.note_offs.clear();
        self.track = Some(track_index);
        self.track_index = track_index;
        self.channel = channel;
        Ok(track_index)
    }

    fn notes(&mut self, line: &str) -> Result<(), ParseError> {
        self.ensure_track()?;

        let mut state = LineState::new();
        let mut scanner = Scanner::new(line);
        loop {
            let spanned = scanner
                .next_token()
                .map_err(|e| self.structural(e.column, e.message))?;
            let Some(spanned) = spanned else {
                break;
            };
            let column = spanned.column;
            trace!("{}:{}:{} {:?}", self.file, self.line_number, column, spanned.token);

            match spanned.token {
                Token::Whitespace => {
                    if state.in_chord {
                        return Err(self.structural(column, "Unexpected whitespace inside a chord"));
                    }
                }
                Token::ChordStart => {
                    if state.in_chord {
                        return Err(self.structural(column, "Unexpected '[' inside a chord"));
                    }
                    if state.has_broken_rhythm() {
                        return Err(self.structural(
                            column,
                            "Can't have broken rhythm (< or >) within a chord",
                        ));
                    }
                    state.chord_size = 0;
                    state.in_chord = true;
                    self.chord_start_index = column;
                }
                Token::ChordEnd => {
                    if !state.in_chord {
                        return Err(self.structural(column, "Unexpected ']'"));
                    }
                    state.in_chord = false;
                    if self.params.generate_regions {
                        self.abc_info.add_region(AbcRegion::new(
                            self.global_line(),
                            self.chord_start_index,
                            column + 1,
                            self.chord_start_tick.round() as u64,
                            self.chord_end_tick.round() as u64,
                            None,
                            self.track_index,
                        ));
                    }
                    self.chord_start_tick = self.chord_end_tick;
                }
                Token::BarLine => {
                    if state.in_chord {
                        return Err(self.structural(column, "Unexpected '|' inside a chord"));
                    }
                    if self.track_number == 1 {
                        self.abc_info.add_bar(self.chord_start_tick.round() as u64);
                    }
                    self.accidentals.clear();
                }
                Token::Decoration(text) => {
                    self.info
                        .set_dynamics(&text)
                        .map_err(|_| self.structural(column, "Unsupported +decoration+"))?;
                    if self.params.strict_validation && state.in_chord {
                        return Err(self.validation(column, "Can't include a +decoration+ inside a chord"));
                    }
                }
                Token::Tuplet(text) => {
                    if state.tuplet.is_some() {
                        return Err(self.structural(column, "Unexpected '(' before end of tuplet"));
                    }
                    let tuplet = Tuplet::parse(&text, self.info.is_compound_meter())
                        .map_err(|_| self.structural(column, "Invalid tuplet"))?;
                    state.tuplet = Some(tuplet);
                }
                Token::SlurStart if state.in_chord => {
                    return Err(self.structural(column, "Unexpected '(' inside a chord"));
                }
                Token::SlurEnd if state.in_chord => {
                    return Err(self.structural(column, "Unexpected ')' inside a chord"));
                }
                Token::SlurStart | Token::SlurEnd => {}
                Token::Note(note) => self.note(&note, &mut state)?,
            }
        }

        let end = scanner.position();
        if state.tuplet.is_some() {
            return Err(self.structural(end, "Tuplet not finished by end of line"));
        }
        if state.in_chord {
            return Err(self.structural(end, "Chord not closed at end of line"));
        }
        if state.has_broken_rhythm() {
            return Err(self.structural(end, "Broken rhythm unfinished at end of line"));
        }
        Ok(())
    }

    fn note(&mut self, token: &NoteToken, state: &mut LineState) -> Result<(), ParseError> {
        if state.in_chord {
            state.chord_size += 1;
        }
        if self.params.strict_validation && state.in_chord && state.chord_size > Chord::MAX_CHORD_NOTES {
            return Err(self.validation(token.start, "Too many notes in a chord"));
        }

        let mut length = (token.numerator as i64, token.denominator as i64);
        let mut scales: Vec<(i64, i64)> = Vec::with_capacity(3);

        match &token.broken_rhythm {
            Some(broken) => {
                if state.has_broken_rhythm() {
                    return Err(self.structural(broken.column, format!("Invalid broken rhythm: {}", broken)));
                }
                if state.in_chord {
                    return Err(self.structural(
                        broken.column,
                        "Can't have broken rhythm (< or >) within a chord",
                    ));
                }
                if token.tie {
                    return Err(self.structural(
                        broken.column,
                        "Tied notes can't have broken rhythms (< or >)",
                    ));
                }
                let factor = broken.factor() as i64;
                if broken.first_longer {
                    scales.push((2 * factor - 1, factor));
                    state.broken_denominator = factor;
                } else {
                    state.broken_numerator = 2 * factor - 1;
                    state.broken_denominator = factor;
                    scales.push((1, factor));
                }
            }
            None => {
                scales.push((state.broken_numerator, state.broken_denominator));
                state.broken_numerator = 1;
                state.broken_denominator = 1;
            }
        }

        if let Some(tuplet) = &mut state.tuplet {
            if !state.in_chord || state.chord_size == 1 {
                tuplet.r -= 1;
            }
            scales.push((tuplet.q as i64, tuplet.p as i64));
            if tuplet.r == 0 {
                state.tuplet = None;
            }
        }

        // Keep tick time in the primary tempo
        let cur_tempo = self.info.current_tempo_bpm(self.chord_start_tick.round() as u64);
        let primary_tempo = self.info.primary_tempo_bpm();
        scales.push((cur_tempo as i64, primary_tempo as i64));

        for (by_numerator, by_denominator) in scales {
            length = match scale_length(length, by_numerator, by_denominator) {
                Some(length) => length,
                None => return Err(self.structural(token.start, "Note length is too long")),
            };
        }
        let (numerator, denominator) = length;

        if denominator % 3 == 0 && numerator % 3 != 0 {
            self.abc_info.set_has_triplets(true);
        }

        let chord_start = self.chord_start_tick;
        let note_end = chord_start + UNIT_NOTE_TICKS as f64 * numerator as f64 / denominator as f64;
        if self.chord_end_tick == chord_start || note_end < self.chord_end_tick {
            self.chord_end_tick = note_end;
        }

        if token.is_rest() {
            if let Some((_, column)) = token.accidental {
                return Err(self.structural(column, "Unexpected accidental on a rest"));
            }
            if let Some(column) = token.octave_column {
                return Err(self.structural(column, "Unexpected octave indicator on a rest"));
            }
            if self.params.generate_regions {
                self.abc_info.add_region(AbcRegion::new(
                    self.global_line(),
                    token.start,
                    token.end,
                    chord_start.round() as u64,
                    note_end.round() as u64,
                    Some(Note::REST),
                    self.track_index,
                ));
            }
        } else {
            self.pitched_note(token, chord_start, note_end, cur_tempo)?;
        }

        if !state.in_chord {
            self.chord_start_tick = note_end;
        }
        Ok(())
    }

    fn pitched_note(
        &mut self,
        token: &NoteToken,
        chord_start: f64,
        note_end: f64,
        cur_tempo: u32,
    ) -> Result<(), ParseError> {
        let native = self.params.use_native_instruments;
        let instrument = self.info.instrument();

        let octave = if token.letter.is_ascii_uppercase() { 3 } else { 4 } + token.octave_marks;
        let letter = token.letter.to_ascii_lowercase() as usize - 'a' as usize;
        let mut note_id = (octave + 1) * 12 + LETTER_DELTA[letter];
        let mut game_note_id = note_id;
        if !native {
            note_id += 12 * instrument.octave_delta();
        }

        if let Some((accidental, _)) = token.accidental {
            self.accidentals.insert(note_id, accidental.delta());
        }
        let delta = match self.accidentals.get(&note_id) {
            Some(delta) => *delta,
            None => self.info.key().default_accidental(note_id).delta(),
        };
        note_id += delta;
        game_note_id += delta;

        if self.params.strict_validation && game_note_id < Note::MIN_PLAYABLE.id() {
            return Err(self.validation(token.start, "Note is too low"));
        }
        if self.params.strict_validation && game_note_id > Note::MAX_PLAYABLE.id() {
            return Err(self.validation(token.start, "Note is too high"));
        }

        if instrument.is_random_pitch() {
            if native {
                if !token.tie && !self.tied_notes.contains_key(&note_id) {
                    let min = instrument.lowest_playable().id();
                    let max = instrument.highest_playable().id();
                    note_id = self.params.rng.gen_range(min..max);
                    game_note_id = note_id;
                }
            } else {
                note_id = if instrument == Instrument::Cowbell {
                    GM_COWBELL
                } else {
                    GM_MOOR_COWBELL
                };
                game_note_id = GAME_COWBELL_NOTE;
            }
        }

        let Some(note) = Note::from_id(note_id).filter(|n| !n.is_rest()) else {
            return Err(self.structural(token.start, "Note is out of range"));
        };
        let key = note_id as u8;
        let start_tick = chord_start.round() as u64;
        let continues_tie = self.tied_notes.contains_key(&note_id);

        if !continues_tie && self.info.ppqn() != self.ppqn {
            return Err(ParseError::structural(
                &self.file,
                self.note_divisor_change_line,
                None,
                "The default note length must be the same for all parts of the song",
            ));
        }

        // Where the note stops sounding, unless it's tied onward
        let end_tick = if token.tie {
            None
        } else {
            let micros_per_quarter = 60_000_000.0 / cur_tempo as f64;
            let ppqn = self.ppqn as f64;
            let length_micros = (note_end - chord_start) * micros_per_quarter / ppqn;
            if self.params.strict_validation && length_micros < SHORTEST_NOTE_MICROS {
                return Err(self.validation(token.start, "Note's duration is too short"));
            }
            if self.params.strict_validation && length_micros > LONGEST_NOTE_MICROS {
                return Err(self.validation(token.start, "Note's duration is too long"));
            }

            let seconds_to_ticks = |seconds: f64| seconds * 1_000_000.0 * ppqn / micros_per_quarter;
            let end = if !native {
                note_end
            } else if instrument.is_sustainable(game_note_id) {
                note_end.max(chord_start + seconds_to_ticks(SUSTAINED_NOTE_MIN_SECONDS))
            } else {
                chord_start + seconds_to_ticks(NON_SUSTAINED_NOTE_SECONDS)
            };
            Some(end.round() as u64)
        };

        if self.params.generate_regions {
            let region = self.abc_info.add_region(AbcRegion::new(
                self.global_line(),
                token.start,
                token.end,
                start_tick,
                note_end.round() as u64,
                Some(note),
                self.track_index,
            ));
            if let Some(&from) = self.tied_regions.get(&note_id) {
                self.abc_info.link_regions(from, region);
            }
            if token.tie {
                self.tied_regions.insert(note_id, region);
            } else {
                self.tied_regions.remove(&note_id);
            }
        }

        let velocity = self.info.dynamics().volume(native);
        let channel = self.channel;
        let Some(track) = self
            .track
            .and_then(|index| self.timeline.as_mut()?.track_mut(index))
        else {
            return Err(ParseError::structural(
                &self.file,
                self.line_number,
                Some(token.start),
                "Note outside of a part",
            ));
        };

        // A re-struck pitch cuts off the previous note
        let mut i = 0;
        while i < self.note_offs.len() {
            let pending = self.note_offs[i];
            let event = track.event_mut(pending.event);
            if event.tick as f64 <= chord_start {
                self.note_offs.remove(i);
                continue;
            }
            if pending.key == note_id {
                event.tick = start_tick;
                self.note_offs.remove(i);
                break;
            }
            i += 1;
        }

        if !continues_tie {
            track.add(
                start_tick,
                TimelineEvent::NoteOn {
                    channel,
                    key,
                    velocity,
                },
            );
        }

        match end_tick {
            None => {
                self.tied_notes.insert(
                    note_id,
                    TieSource {
                        file: self.file.clone(),
                        line: self.line_number,
                        column: token.start,
                    },
                );
            }
            Some(end_tick) => {
                let event = track.add(end_tick, TimelineEvent::NoteOff { channel, key });
                self.note_offs.push(PendingNoteOff {
                    event,
                    key: note_id,
                });
                self.tied_notes.remove(&note_id);
            }
        }
        Ok(())
    }

    fn finish(mut self) -> Result<(Timeline, AbcInfo), ParseError> {
        let Some(mut timeline) = self.timeline.take() else {
            return Err(ParseError::structural(
                &self.file,
                self.line_number,
                None,
                "The file contains no notes",
            ));
        };
        self.abc_info
            .set_part_end_line(self.track_number, self.global_line());

        let mut pan = if self.params.stereo_pan && self.track_number > 1 {
            Some(PanGenerator::new())
        } else {
            None
        };

        if let Some(song) = timeline.track_mut(0) {
            for (&tick, &bpm) in self.info.all_parts_tempo() {
                song.add(
                    tick,
                    TimelineEvent::Tempo {
                        micros_per_quarter: (60_000_000.0 / bpm as f64) as u32,
                    },
                );
            }
            song.insert(0, 0, TimelineEvent::TrackName(self.abc_info.title()));
            song.add(0, TimelineEvent::TimeSignature(self.abc_info.time_signature()));
            let key = self.abc_info.key_signature();
            if matches!(key.mode(), KeyMode::Major | KeyMode::Minor) {
                song.add(0, TimelineEvent::KeySignature(key));
            }
        }

        for &(track_index, track_number) in &self.track_parts {
            let name = self.abc_info.part_name(track_number);
            let pan_amount = match &mut pan {
                Some(pan) => pan.get(self.abc_info.part_instrument(track_number), &name),
                None => CENTER,
            };
            if let Some(track) = timeline.track_mut(track_index) {
                track.insert(0, 0, TimelineEvent::TrackName(name));
                track.insert(
                    2,
                    0,
                    TimelineEvent::Controller {
                        channel: track_channel(track_index) as u8,
                        controller: CONTROLLER_PAN,
                        value: pan_amount,
                    },
                );
            }
        }

        timeline.sort();
        debug!(
            "Parsed {} parts, {} bars, {} ticks",
            self.track_parts.len(),
            self.abc_info.bar_count(),
            timeline.last_tick()
        );
        Ok((timeline, self.abc_info))
    }
}
