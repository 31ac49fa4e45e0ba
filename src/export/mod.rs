//! Timeline to ABC export.
//!
//! Parts are merged, snapped to the grid of a [`QuantizedTimingInfo`], split
//! into chords the game can play and then written out one `X:` tune per part.

mod quantize;
mod writer;

use crate::config::ExportParams;
use crate::error::ConversionError;
use crate::sequence::SequenceData;
use crate::timing::{ONE_SECOND_MICROS, QuantizedTimingInfo};
use crate::types::field::AbcField;
use crate::types::instrument::Instrument;
use crate::types::key_signature::KeySignature;
use crate::types::note::Note;
use crate::types::note_event::NoteEvent;
use crate::util::format_duration;
use log::debug;

pub use quantize::{Quantized, combine_and_quantize};

/// A part as the exporter sees it. Each part owns one or more source tracks.
pub trait PartView {
    fn title(&self) -> &str;

    /// Written as the part's `X:` number.
    fn part_number(&self) -> u32;

    fn instrument(&self) -> Instrument;

    fn track_count(&self) -> usize;

    fn is_track_enabled(&self, track: usize) -> bool;

    /// Source notes of a track, in source pitches.
    fn track_events(&self, track: usize) -> &[NoteEvent];

    /// Added to the velocity of every note of the track.
    fn track_volume_adjust(&self, track: usize) -> i32;

    /// The playable note a source pitch is written as, or `None` to drop it.
    fn map_note(&self, track: usize, note_id: i32) -> Option<Note>;

    fn first_note_start_tick(&self) -> Option<i64> {
        (0..self.track_count())
            .filter(|&t| self.is_track_enabled(t))
            .flat_map(|t| {
                self.track_events(t)
                    .iter()
                    .filter(move |ne| self.map_note(t, ne.note.id()).is_some())
            })
            .map(NoteEvent::start_tick)
            .min()
    }

    /// End of the last playable note. With `account_for_sustain`, notes of
    /// instruments that ring on count until their natural decay.
    fn last_note_end_tick(
        &self,
        account_for_sustain: bool,
        qtm: &QuantizedTimingInfo,
    ) -> Option<i64> {
        let instrument = self.instrument();
        let mut last = None;
        for t in (0..self.track_count()).filter(|&t| self.is_track_enabled(t)) {
            for ne in self.track_events(t) {
                let Some(note) = self.map_note(t, ne.note.id()) else {
                    continue;
                };
                let mut end = ne.end_tick();
                if account_for_sustain && !instrument.is_sustainable(note.id()) {
                    let decay = qtm.micros_to_tick(qtm.tick_to_micros(ne.start_tick()) + ONE_SECOND_MICROS);
                    end = end.max(decay);
                }
                last = Some(last.map_or(end, |l: i64| l.max(end)));
            }
        }
        last
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportTrack {
    pub events: Vec<NoteEvent>,
    pub enabled: bool,
    /// Semitones, on top of the part's transpose.
    pub transpose: i32,
    pub volume_adjust: i32,
}

impl ExportTrack {
    pub fn new(events: Vec<NoteEvent>) -> Self {
        Self {
            events,
            enabled: true,
            ..Self::default()
        }
    }
}

/// A plain [`PartView`] holding its tracks' notes.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportPart {
    pub title: String,
    pub part_number: u32,
    pub instrument: Instrument,
    pub transpose: i32,
    pub tracks: Vec<ExportTrack>,
}

impl ExportPart {
    pub fn new(title: impl Into<String>, part_number: u32, instrument: Instrument) -> Self {
        Self {
            title: title.into(),
            part_number,
            instrument,
            transpose: 0,
            tracks: Vec::new(),
        }
    }

    pub fn with_track(mut self, track: ExportTrack) -> Self {
        self.tracks.push(track);
        self
    }
}

impl PartView for ExportPart {
    fn title(&self) -> &str {
        &self.title
    }

    fn part_number(&self) -> u32 {
        self.part_number
    }

    fn instrument(&self) -> Instrument {
        self.instrument
    }

    fn track_count(&self) -> usize {
        self.tracks.len()
    }

    fn is_track_enabled(&self, track: usize) -> bool {
        self.tracks.get(track).is_some_and(|t| t.enabled)
    }

    fn track_events(&self, track: usize) -> &[NoteEvent] {
        self.tracks.get(track).map_or(&[], |t| t.events.as_slice())
    }

    fn track_volume_adjust(&self, track: usize) -> i32 {
        self.tracks.get(track).map_or(0, |t| t.volume_adjust)
    }

    fn map_note(&self, track: usize, note_id: i32) -> Option<Note> {
        if note_id < 0 {
            return None;
        }
        let lowest = self.instrument.lowest_playable().id();
        let highest = self.instrument.highest_playable().id();
        match self.instrument {
            Instrument::Cowbell => return Note::from_id(43),
            Instrument::MoorCowbell => return Note::from_id(45),
            Instrument::Drums => {
                return if (lowest..=highest).contains(&note_id) {
                    Note::from_id(note_id)
                } else {
                    None
                };
            }
            _ => {}
        }

        let track_transpose = self.tracks.get(track).map_or(0, |t| t.transpose);
        let mut id =
            note_id + self.transpose + track_transpose - 12 * self.instrument.octave_delta();
        while id < lowest {
            id += 12;
        }
        while id > highest {
            id -= 12;
        }
        Note::from_id(id)
    }
}

/// Song-wide text written to the file and part headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SongMetadata {
    pub title: String,
    pub composer: String,
    pub transcriber: String,
}

impl SongMetadata {
    /// The `T:` line of a part.
    pub fn part_name(&self, part_title: &str) -> String {
        let song = self.title.trim();
        let part = part_title.trim();
        if song.is_empty() {
            part.to_string()
        } else {
            format!("{} - {}", song, part)
        }
    }
}

pub struct AbcExporter<'a, P: PartView> {
    parts: &'a [P],
    qtm: &'a QuantizedTimingInfo,
    key: KeySignature,
    metadata: SongMetadata,
    params: ExportParams,
}

impl<'a, P: PartView> AbcExporter<'a, P> {
    pub fn new(
        parts: &'a [P],
        qtm: &'a QuantizedTimingInfo,
        key: KeySignature,
        metadata: SongMetadata,
        params: ExportParams,
    ) -> Result<Self, ConversionError> {
        if key.sharps_flats() != 0 {
            return Err(ConversionError::UnsupportedKey);
        }
        Ok(Self {
            parts,
            qtm,
            key,
            metadata,
            params,
        })
    }

    pub fn timing_info(&self) -> &QuantizedTimingInfo {
        self.qtm
    }

    pub fn key_signature(&self) -> KeySignature {
        self.key
    }

    /// The ticks the exported song covers. With `lengthen_to_bar` the end is
    /// moved out to the bar line after the last note.
    pub fn song_start_end_tick(&self, lengthen_to_bar: bool, account_for_sustain: bool) -> (i64, i64) {
        let mut start: Option<i64> = None;
        let mut end: Option<i64> = None;
        for part in self.parts {
            if self.params.skip_silence_at_start {
                if let Some(first) = part.first_note_start_tick() {
                    let bar_start = self.qtm.tick_to_bar_start_tick(first);
                    start = Some(start.map_or(bar_start, |s| s.min(bar_start)));
                }
            }
            if let Some(last) = part.last_note_end_tick(account_for_sustain, self.qtm) {
                let last = if lengthen_to_bar {
                    self.qtm.tick_to_bar_end_tick((last - 1).max(0))
                } else {
                    last
                };
                end = Some(end.map_or(last, |e| e.max(last)));
            }
        }
        (start.unwrap_or(0), end.unwrap_or(0))
    }

    pub fn export(&self) -> Result<String, ConversionError> {
        let has_notes = self
            .parts
            .iter()
            .any(|p| p.last_note_end_tick(false, self.qtm).is_some());
        if !has_notes {
            return Err(ConversionError::EmptySong);
        }

        let (start, end) = self.song_start_end_tick(true, self.params.account_for_sustain);
        debug!("Exporting ticks {}..{} of {} parts", start, end, self.parts.len());

        let mut out = String::new();
        self.write_file_header(&mut out, start, end);
        for (index, part) in self.parts.iter().enumerate() {
            self.write_part(&mut out, part, index == 0, start, end);
        }
        self.write_tempo_map(&mut out);
        Ok(out)
    }

    fn write_file_header(&self, out: &mut String, start: i64, end: i64) {
        let metadata = &self.metadata;
        let duration = self.qtm.tick_to_micros(end) - self.qtm.tick_to_micros(start);

        out.push_str("%abc-2.1\n");
        let title = format!("{}{}", AbcField::SongTitle, metadata.title.trim());
        out.push_str(title.trim_end());
        out.push('\n');
        if !metadata.composer.trim().is_empty() {
            out.push_str(&format!("{}{}\n", AbcField::SongComposer, metadata.composer.trim()));
        }
        out.push_str(&format!("{}{}\n", AbcField::SongDuration, format_duration(duration)));
        if !metadata.transcriber.trim().is_empty() {
            out.push_str(&format!(
                "{}{}\n",
                AbcField::SongTranscriber,
                metadata.transcriber.trim()
            ));
        }
        out.push_str(&format!("{}{}\n", AbcField::AbcCreator, self.params.creator));
        out.push_str(&format!("{}2.1\n", AbcField::AbcVersion));
    }

    fn write_part(&self, out: &mut String, part: &P, first: bool, start: i64, end: i64) {
        let Quantized { events, mut chords } =
            combine_and_quantize(part, self.qtm, true, start, end);

        out.push('\n');
        out.push_str(&format!("X: {}\n", part.part_number()));
        out.push_str(&format!("T: {}\n", self.metadata.part_name(part.title())));
        out.push_str(&format!("{}{}\n", AbcField::PartName, part.title().trim()));
        if first {
            if !self.metadata.composer.trim().is_empty() {
                out.push_str(&format!("C: {}\n", self.metadata.composer.trim()));
            }
            if !self.metadata.transcriber.trim().is_empty() {
                out.push_str(&format!("Z: {}\n", self.metadata.transcriber.trim()));
            }
        }
        out.push_str(&format!("M: {}\n", self.qtm.meter()));
        out.push_str(&format!("Q: {}\n", self.qtm.primary_export_tempo_bpm()));
        out.push_str(&format!("K: {}\n", self.key));
        out.push('\n');

        writer::write_chords(out, &events, &mut chords, self.qtm, start);
    }

    fn write_tempo_map(&self, out: &mut String) {
        let events = self.qtm.timing_events();
        if events.len() <= 1 {
            return;
        }
        let primary = self.qtm.primary_export_tempo_bpm();
        out.push_str("% Tempo map:");
        for e in events {
            out.push_str(&format!(" {}/{}@{}", e.info.export_tempo_bpm(), primary, e.tick));
        }
        out.push('\n');
    }
}

/// One part per timeline track that has notes, with instruments guessed from
/// track names.
pub fn parts_from_sequence(sequence: &SequenceData) -> Vec<ExportPart> {
    let mut parts = Vec::new();
    for track in sequence.tracks() {
        if track.notes.is_empty() {
            continue;
        }
        let part_number = parts.len() as u32 + 1;
        let title = track
            .name
            .clone()
            .unwrap_or_else(|| format!("Part {}", part_number));
        let instrument = Instrument::find_in_name(&title).unwrap_or_default();
        parts.push(
            ExportPart::new(title, part_number, instrument)
                .with_track(ExportTrack::new(track.notes.clone())),
        );
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::SequenceData;
    use crate::timeline::{Timeline, TimelineEvent};
    use crate::types::time_signature::TimeSignature;
    use pretty_assertions::assert_eq;

    fn ne(id: i32, start: i64, end: i64) -> NoteEvent {
        NoteEvent::new(Note::from_id(id).unwrap(), 80, start, end)
    }

    /// A 120 bpm 4/4 timing map at 480 ppqn covering `song_end` ticks.
    fn timing(song_end: u64) -> QuantizedTimingInfo {
        crate::util::init_test_logging();
        let mut timeline = Timeline::new(480);
        let song = timeline.create_track();
        timeline.track_mut(song).unwrap().add(
            0,
            TimelineEvent::Tempo {
                micros_per_quarter: 500_000,
            },
        );
        timeline
            .track_mut(song)
            .unwrap()
            .add(song_end, TimelineEvent::TrackName(String::new()));
        let sequence = SequenceData::from_timeline(&timeline);
        QuantizedTimingInfo::new(&sequence, 1.0, TimeSignature::FOUR_FOUR, false).unwrap()
    }

    fn flute(events: Vec<NoteEvent>) -> ExportPart {
        ExportPart::new("Flute", 1, Instrument::Flute).with_track(ExportTrack::new(events))
    }

    fn metadata() -> SongMetadata {
        SongMetadata {
            title: "Song".to_string(),
            ..SongMetadata::default()
        }
    }

    fn params() -> ExportParams {
        ExportParams {
            creator: "test".to_string(),
            ..ExportParams::default()
        }
    }

    /// (pitch, start, end, tied onward) of every note in every chord.
    fn chord_notes(q: &Quantized) -> Vec<(i32, i64, i64, bool)> {
        q.chords
            .iter()
            .flat_map(|c| c.notes().iter())
            .map(|&id| {
                let e = q.events.get(id);
                (e.note.id(), e.start_tick(), e.end_tick(), e.ties_to.is_some())
            })
            .collect()
    }

    #[test]
    fn test_map_note() {
        let part = ExportPart::new("Lute", 1, Instrument::BasicLute)
            .with_track(ExportTrack::new(Vec::new()));
        assert_eq!(part.map_note(0, 60).map(|n| n.id()), Some(60));
        assert_eq!(part.map_note(0, 90).map(|n| n.id()), Some(66));
        assert_eq!(part.map_note(0, 20).map(|n| n.id()), Some(44));

        // the flute sounds two octaves above its General MIDI voice
        let part = flute(Vec::new());
        assert_eq!(part.map_note(0, 84).map(|n| n.id()), Some(60));

        let part = ExportPart::new("Drums", 1, Instrument::Drums);
        assert_eq!(part.map_note(0, 40).map(|n| n.id()), Some(40));
        assert_eq!(part.map_note(0, 80), None);

        let part = ExportPart::new("Bell", 1, Instrument::MoorCowbell);
        assert_eq!(part.map_note(0, 80).map(|n| n.id()), Some(45));
    }

    #[test]
    fn test_part_name() {
        assert_eq!(metadata().part_name(" Flute "), "Song - Flute");
        assert_eq!(SongMetadata::default().part_name("Flute"), "Flute");
    }

    #[test]
    fn test_unsupported_key() {
        let qtm = timing(1920);
        let parts = vec![flute(vec![ne(84, 0, 480)])];
        let key: KeySignature = "G".parse().unwrap();
        assert_eq!(
            AbcExporter::new(&parts, &qtm, key, metadata(), params()).err(),
            Some(ConversionError::UnsupportedKey)
        );
    }

    #[test]
    fn test_empty_song() {
        let qtm = timing(1920);
        let parts = vec![flute(Vec::new())];
        let exporter =
            AbcExporter::new(&parts, &qtm, KeySignature::C_MAJOR, metadata(), params()).unwrap();
        assert_eq!(exporter.export(), Err(ConversionError::EmptySong));
    }

    #[test]
    fn test_song_window_is_bar_aligned() {
        let qtm = timing(8000);
        let parts = vec![flute(vec![ne(84, 2000, 2500), ne(88, 4000, 4100)])];
        let mut p = params();
        p.skip_silence_at_start = true;
        let exporter = AbcExporter::new(&parts, &qtm, KeySignature::C_MAJOR, metadata(), p).unwrap();

        let (start, end) = exporter.song_start_end_tick(true, false);
        assert_eq!((start, end), (1920, 5760));
        assert_eq!(start % 1920, 0);
        assert_eq!(end % 1920, 0);

        // a note ending on a bar line doesn't add an empty bar
        let parts = vec![flute(vec![ne(84, 0, 1920)])];
        let exporter =
            AbcExporter::new(&parts, &qtm, KeySignature::C_MAJOR, metadata(), params()).unwrap();
        assert_eq!(exporter.song_start_end_tick(true, false), (0, 1920));
        assert_eq!(exporter.song_start_end_tick(false, false), (0, 1920));
    }

    #[test]
    fn test_sustain_extends_window() {
        let qtm = timing(8000);
        let parts = vec![
            ExportPart::new("Lute", 1, Instrument::BasicLute)
                .with_track(ExportTrack::new(vec![ne(60, 1800, 1860)])),
        ];
        let exporter =
            AbcExporter::new(&parts, &qtm, KeySignature::C_MAJOR, metadata(), params()).unwrap();
        assert_eq!(exporter.song_start_end_tick(false, false).1, 1860);
        // one second at 120 bpm is two quarters
        assert_eq!(exporter.song_start_end_tick(false, true).1, 2760);
        assert_eq!(exporter.song_start_end_tick(true, true).1, 3840);
    }

    #[test]
    fn test_same_pitch_same_start_is_merged() {
        let qtm = timing(1920);
        let part = flute(vec![ne(84, 0, 480), ne(84, 0, 960)]);
        let q = combine_and_quantize(&part, &qtm, true, 0, 1920);
        assert_eq!(
            chord_notes(&q),
            vec![(60, 0, 960, false), (-1, 960, 1920, false)]
        );
    }

    #[test]
    fn test_long_note_is_split_at_bar() {
        let qtm = timing(9000);
        let part = flute(vec![ne(84, 0, 9000)]);
        let q = combine_and_quantize(&part, &qtm, true, 0, 9000);
        assert_eq!(
            chord_notes(&q),
            vec![
                (60, 0, 1920, true),
                (60, 1920, 3840, true),
                (60, 3840, 5760, true),
                (60, 5760, 7680, true),
                (60, 7680, 8640, true),
                (60, 8640, 9000, false),
            ]
        );
        assert_eq!(7680 % qtm.timing_info(0).bar_length_ticks(), 0);
    }

    #[test]
    fn test_long_note_is_restruck_without_ties() {
        let qtm = timing(9000);
        let part = flute(vec![ne(84, 0, 9000)]);
        let q = combine_and_quantize(&part, &qtm, false, 0, 9000);
        assert_eq!(
            chord_notes(&q),
            vec![(60, 0, 7680, false), (60, 7680, 9000, false)]
        );
        let second = q.chords[1].get(0);
        assert_eq!(q.events.get(second).ties_from, None);
    }

    #[test]
    fn test_notes_are_tied_across_bars() {
        let qtm = timing(3840);
        let part = flute(vec![ne(84, 1440, 2400)]);
        let q = combine_and_quantize(&part, &qtm, true, 0, 3840);
        assert_eq!(
            chord_notes(&q),
            vec![
                (-1, 0, 1440, false),
                (60, 1440, 1920, true),
                (60, 1920, 2400, false),
                (-1, 2400, 2880, false),
                (-1, 2880, 3840, false),
            ]
        );
    }

    #[test]
    fn test_chord_capacity() {
        let qtm = timing(1920);
        let events = (0..8).map(|i| ne(84 + i, 0, 960)).collect();
        let q = combine_and_quantize(&flute(events), &qtm, true, 0, 1920);
        for chord in &q.chords {
            assert!(chord.len() <= 6);
            let shortest = chord
                .notes()
                .iter()
                .map(|&id| q.events.get(id).end_tick())
                .min()
                .unwrap();
            assert_eq!(chord.end_tick(), shortest);
        }
        assert_eq!(q.chords[0].len(), 6);
    }

    #[test]
    fn test_chord_is_trimmed_to_next_chord() {
        let qtm = timing(1920);
        let part = flute(vec![ne(84, 0, 960), ne(88, 0, 480), ne(91, 480, 960)]);
        let q = combine_and_quantize(&part, &qtm, true, 0, 1920);
        assert_eq!(
            chord_notes(&q),
            vec![
                (60, 0, 480, true),
                (64, 0, 480, false),
                (60, 480, 960, false),
                (67, 480, 960, false),
                (-1, 960, 1920, false),
            ]
        );
    }

    #[test]
    fn test_untied_chord_gets_short_rest() {
        let qtm = timing(1920);
        let part = flute(vec![ne(84, 0, 960), ne(91, 480, 960)]);
        let q = combine_and_quantize(&part, &qtm, false, 0, 1920);
        assert_eq!(q.chords[0].len(), 2);
        assert_eq!(q.chords[0].end_tick(), 480);
        assert_eq!(
            chord_notes(&q)[..2].to_vec(),
            vec![(60, 0, 960, false), (-1, 0, 480, false)]
        );
    }

    #[test]
    fn test_export() {
        let qtm = timing(1920);
        let parts = vec![flute(vec![
            ne(84, 0, 480),
            ne(86, 480, 960),
            ne(88, 960, 1440),
            ne(89, 1440, 1680),
            ne(91, 1680, 1920),
        ])];
        let meta = SongMetadata {
            title: "Song".to_string(),
            composer: "Someone".to_string(),
            transcriber: String::new(),
        };
        let exporter =
            AbcExporter::new(&parts, &qtm, KeySignature::C_MAJOR, meta, params()).unwrap();
        let abc = exporter.export().unwrap();
        let expected = r#"%abc-2.1
%%song-title       Song
%%song-composer    Someone
%%song-duration    0:02
%%abc-creator test
%%abc-version 2.1

X: 1
T: Song - Flute
%%part-name Flute
C: Someone
M: 4/4
Q: 120
K: C maj

+mf+ c2 d2 e2 f g |]

"#;
        assert_eq!(abc, expected);
    }

    #[test]
    fn test_export_accidentals_and_tempo_change() {
        let mut timeline = Timeline::new(480);
        let song = timeline.create_track();
        let track = timeline.track_mut(song).unwrap();
        track.add(
            0,
            TimelineEvent::Tempo {
                micros_per_quarter: 500_000,
            },
        );
        track.add(
            3840,
            TimelineEvent::Tempo {
                micros_per_quarter: 250_000,
            },
        );
        track.add(4800, TimelineEvent::TrackName(String::new()));
        let sequence = SequenceData::from_timeline(&timeline);
        let qtm = QuantizedTimingInfo::new(&sequence, 1.0, TimeSignature::FOUR_FOUR, false).unwrap();

        let parts = vec![flute(vec![
            ne(85, 0, 480),
            ne(85, 480, 960),
            ne(84, 960, 1920),
            ne(85, 1920, 3840),
            ne(84, 3840, 4800),
        ])];
        let exporter =
            AbcExporter::new(&parts, &qtm, KeySignature::C_MAJOR, metadata(), params()).unwrap();
        let abc = exporter.export().unwrap();
        let body: Vec<&str> = abc
            .lines()
            .skip_while(|l| !l.starts_with("K:"))
            .skip(2)
            .collect();
        assert_eq!(
            body,
            vec![
                "+mf+ ^c2 c2 =c4 |",
                "^c8 |",
                "%%Q: 240",
                "c2 z2 |]",
                "",
                "% Tempo map: 120/120@0 240/120@3840",
            ]
        );
    }

    #[test]
    fn test_export_opening_at_other_tempo() {
        let mut timeline = Timeline::new(480);
        let song = timeline.create_track();
        let track = timeline.track_mut(song).unwrap();
        track.add(
            0,
            TimelineEvent::Tempo {
                micros_per_quarter: 500_000,
            },
        );
        track.add(
            1920,
            TimelineEvent::Tempo {
                micros_per_quarter: 250_000,
            },
        );
        track.add(9600, TimelineEvent::TrackName(String::new()));
        let sequence = SequenceData::from_timeline(&timeline);
        let qtm = QuantizedTimingInfo::new(&sequence, 1.0, TimeSignature::FOUR_FOUR, false).unwrap();
        assert_eq!(qtm.primary_export_tempo_bpm(), 240);

        let parts = vec![flute((0..5).map(|bar| ne(84, bar * 1920, (bar + 1) * 1920)).collect())];
        let exporter =
            AbcExporter::new(&parts, &qtm, KeySignature::C_MAJOR, metadata(), params()).unwrap();
        let abc = exporter.export().unwrap();
        assert!(abc.lines().any(|l| l == "Q: 240"));

        let body: Vec<&str> = abc
            .lines()
            .skip_while(|l| !l.starts_with("K:"))
            .skip(2)
            .take_while(|l| !l.is_empty())
            .collect();
        assert_eq!(
            body,
            vec![
                "%%Q: 120",
                "+mf+ c16 |",
                "%%Q: 240",
                "c8 |",
                "c8 |",
                "c8 |",
                "c8 |]",
            ]
        );
    }

    #[test]
    fn test_export_bar_comments() {
        let qtm = timing(23040);
        let parts = vec![flute((0..12).map(|bar| ne(84, bar * 1920, (bar + 1) * 1920)).collect())];
        let exporter =
            AbcExporter::new(&parts, &qtm, KeySignature::C_MAJOR, metadata(), params()).unwrap();
        let abc = exporter.export().unwrap();
        let body: Vec<&str> = abc
            .lines()
            .skip_while(|l| !l.starts_with("K:"))
            .skip(2)
            .take_while(|l| !l.is_empty())
            .collect();
        assert_eq!(body.len(), 13);
        assert_eq!(body[8], "c8 |");
        assert_eq!(body[9], "% Bar 10 (0:18)");
        assert_eq!(body[10], "c8 |");
        assert_eq!(body.iter().filter(|l| l.starts_with("% Bar")).count(), 1);
    }

    #[test]
    fn test_export_without_title() {
        let qtm = timing(1920);
        let parts = vec![flute(vec![ne(84, 0, 1920)])];
        let exporter =
            AbcExporter::new(&parts, &qtm, KeySignature::C_MAJOR, SongMetadata::default(), params())
                .unwrap();
        let abc = exporter.export().unwrap();
        assert!(abc.lines().any(|l| l == "%%song-title"));
        assert!(abc.lines().all(|l| l == l.trim_end()));
    }

    #[test]
    fn test_parts_from_sequence() {
        let (timeline, _) = crate::util::parse_abc_str(
            r#"X:1
T:Horn
K:C
C4|
X:2
T:Other
K:C
E4|
"#,
        )
        .unwrap();
        let parts = parts_from_sequence(&SequenceData::from_timeline(&timeline));
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].instrument, Instrument::Horn);
        assert_eq!(parts[1].instrument, Instrument::BasicLute);
        assert_eq!(parts[1].part_number, 2);
    }
}
