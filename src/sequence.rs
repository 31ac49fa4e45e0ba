use crate::timeline::{DEFAULT_MICROS_PER_QUARTER, Timeline, TimelineEvent, Track};
use crate::types::key_signature::KeySignature;
use crate::types::note::Note;
use crate::types::note_event::NoteEvent;
use crate::types::time_signature::TimeSignature;
use log::{debug, warn};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempoEvent {
    pub tick: i64,
    /// Source time at `tick`.
    pub micros: i64,
    pub tempo_mpq: i64,
}

/// Notes of one timeline track, paired from note-ons and note-offs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackNotes {
    pub name: Option<String>,
    pub channel: Option<u8>,
    pub program: Option<u8>,
    pub notes: Vec<NoteEvent>,
}

/// What the exporter needs to know about a timeline.
#[derive(Debug, Clone)]
pub struct SequenceData {
    resolution: i64,
    tempo_events: Vec<TempoEvent>,
    primary_tempo_mpq: i64,
    time_signature: Option<TimeSignature>,
    key_signature: Option<KeySignature>,
    song_length_ticks: i64,
    tracks: Vec<TrackNotes>,
}

impl SequenceData {
    pub fn from_timeline(timeline: &Timeline) -> Self {
        let resolution = timeline.ppqn() as i64;
        let song_length_ticks = timeline.last_tick() as i64;

        let mut tempo_by_tick = BTreeMap::new();
        let mut time_signature = None;
        let mut key_signature = None;
        if let Some(song) = timeline.track(0) {
            for e in song.events() {
                match &e.event {
                    TimelineEvent::Tempo { micros_per_quarter } => {
                        tempo_by_tick.insert(e.tick as i64, *micros_per_quarter as i64);
                    }
                    TimelineEvent::TimeSignature(meter) if time_signature.is_none() => {
                        time_signature = Some(*meter);
                    }
                    TimelineEvent::KeySignature(key) if key_signature.is_none() => {
                        key_signature = Some(*key);
                    }
                    _ => {}
                }
            }
        }
        tempo_by_tick
            .entry(0)
            .or_insert(DEFAULT_MICROS_PER_QUARTER as i64);

        let mut tempo_events = Vec::with_capacity(tempo_by_tick.len());
        let mut micros = 0;
        let mut prev: Option<(i64, i64)> = None;
        for (&tick, &tempo_mpq) in &tempo_by_tick {
            if let Some((prev_tick, prev_mpq)) = prev {
                micros += ticks_to_micros(tick - prev_tick, prev_mpq, resolution);
            }
            tempo_events.push(TempoEvent {
                tick,
                micros,
                tempo_mpq,
            });
            prev = Some((tick, tempo_mpq));
        }

        let primary_tempo_mpq = primary_tempo(&tempo_events, song_length_ticks);
        let tracks = timeline.tracks().iter().map(pair_notes).collect();

        debug!(
            "Sequence: {} ticks at {} ppqn, {} tempo changes, primary tempo {} mpq",
            song_length_ticks,
            resolution,
            tempo_events.len(),
            primary_tempo_mpq
        );

        Self {
            resolution,
            tempo_events,
            primary_tempo_mpq,
            time_signature,
            key_signature,
            song_length_ticks,
            tracks,
        }
    }

    /// Ticks per quarter note.
    pub fn resolution(&self) -> i64 {
        self.resolution
    }

    pub fn tempo_events(&self) -> &[TempoEvent] {
        &self.tempo_events
    }

    /// The tempo in effect for the longest total time.
    pub fn primary_tempo_mpq(&self) -> i64 {
        self.primary_tempo_mpq
    }

    pub fn primary_tempo_bpm(&self) -> i32 {
        (60_000_000.0 / self.primary_tempo_mpq as f64).round() as i32
    }

    pub fn time_signature(&self) -> Option<TimeSignature> {
        self.time_signature
    }

    pub fn key_signature(&self) -> Option<KeySignature> {
        self.key_signature
    }

    pub fn song_length_ticks(&self) -> i64 {
        self.song_length_ticks
    }

    pub fn song_length_micros(&self) -> i64 {
        self.tick_to_micros(self.song_length_ticks)
    }

    pub fn tick_to_micros(&self, tick: i64) -> i64 {
        let index = self.tempo_events.partition_point(|e| e.tick <= tick);
        match self.tempo_events.get(index.saturating_sub(1)) {
            Some(e) => e.micros + ticks_to_micros(tick - e.tick, e.tempo_mpq, self.resolution),
            None => ticks_to_micros(tick, DEFAULT_MICROS_PER_QUARTER as i64, self.resolution),
        }
    }

    /// One entry per timeline track, track 0 included.
    pub fn tracks(&self) -> &[TrackNotes] {
        &self.tracks
    }

    pub fn track(&self, index: usize) -> Option<&TrackNotes> {
        self.tracks.get(index)
    }
}

fn ticks_to_micros(ticks: i64, tempo_mpq: i64, resolution: i64) -> i64 {
    (ticks as f64 * tempo_mpq as f64 / resolution as f64) as i64
}

fn primary_tempo(tempo_events: &[TempoEvent], song_length_ticks: i64) -> i64 {
    let mut spans: BTreeMap<i64, i64> = BTreeMap::new();
    for (i, e) in tempo_events.iter().enumerate() {
        let end = tempo_events
            .get(i + 1)
            .map(|next| next.tick)
            .unwrap_or(song_length_ticks)
            .max(e.tick);
        *spans.entry(e.tempo_mpq).or_default() += end - e.tick;
    }

    let mut primary = None;
    let mut longest = 0;
    for (&tempo_mpq, &span) in &spans {
        if primary.is_none() || span > longest {
            primary = Some(tempo_mpq);
            longest = span;
        }
    }
    primary.unwrap_or(DEFAULT_MICROS_PER_QUARTER as i64)
}

fn close(notes: &mut Vec<NoteEvent>, key: u8, start: u64, velocity: u8, end: u64) {
    if end <= start {
        return;
    }
    if let Some(note) = Note::from_id(key as i32) {
        notes.push(NoteEvent::new(note, velocity as i32, start as i64, end as i64));
    }
}

fn pair_notes(track: &Track) -> TrackNotes {
    let mut notes = TrackNotes {
        name: track.name().map(str::to_string),
        ..TrackNotes::default()
    };
    let mut open: HashMap<(u8, u8), (u64, u8)> = HashMap::new();

    for e in track.events() {
        match e.event {
            TimelineEvent::NoteOn {
                channel,
                key,
                velocity,
            } if velocity > 0 => {
                notes.channel.get_or_insert(channel);
                if let Some((start, vel)) = open.insert((channel, key), (e.tick, velocity)) {
                    close(&mut notes.notes, key, start, vel, e.tick);
                }
            }
            TimelineEvent::NoteOn { channel, key, .. } | TimelineEvent::NoteOff { channel, key } => {
                match open.remove(&(channel, key)) {
                    Some((start, vel)) => close(&mut notes.notes, key, start, vel, e.tick),
                    None => warn!(
                        "Note off for key {} on channel {} at tick {} has no note on",
                        key, channel, e.tick
                    ),
                }
            }
            TimelineEvent::ProgramChange { channel, program } => {
                notes.channel.get_or_insert(channel);
                notes.program.get_or_insert(program);
            }
            _ => {}
        }
    }

    let last_tick = track.last_tick();
    for ((_, key), (start, vel)) in open {
        close(&mut notes.notes, key, start, vel, last_tick);
    }

    notes.notes.sort_by(|a, b| a.cmp_position(b));
    notes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::parse_abc_str;

    fn on(key: u8) -> TimelineEvent {
        TimelineEvent::NoteOn {
            channel: 0,
            key,
            velocity: 90,
        }
    }

    fn off(key: u8) -> TimelineEvent {
        TimelineEvent::NoteOff { channel: 0, key }
    }

    #[test]
    fn test_pairs_notes() {
        let mut timeline = Timeline::new(480);
        timeline.create_track();
        let part = timeline.create_track();
        let track = timeline.track_mut(part).unwrap();
        track.add(0, TimelineEvent::TrackName("Flute".to_string()));
        track.add(0, on(60));
        track.add(240, on(60)); // re-struck before its note-off
        track.add(480, off(60));
        track.add(480, off(62)); // orphan
        track.add(500, on(64)); // never released
        track.add(600, on(67));
        track.add(700, off(67));

        let data = SequenceData::from_timeline(&timeline);
        let notes = &data.track(part).unwrap().notes;
        let spans: Vec<(i32, i64, i64)> = notes
            .iter()
            .map(|n| (n.note.id(), n.start_tick(), n.end_tick()))
            .collect();
        assert_eq!(
            spans,
            vec![(60, 0, 240), (60, 240, 480), (64, 500, 700), (67, 600, 700)]
        );
        assert_eq!(data.track(part).unwrap().name.as_deref(), Some("Flute"));
        assert_eq!(data.track(part).unwrap().channel, Some(0));
        assert_eq!(notes[0].velocity, 90);
    }

    #[test]
    fn test_primary_tempo_is_longest_span() {
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
            480,
            TimelineEvent::Tempo {
                micros_per_quarter: 1_000_000,
            },
        );
        track.add(
            1440,
            TimelineEvent::Tempo {
                micros_per_quarter: 500_000,
            },
        );
        track.add(2400, off(60));

        let data = SequenceData::from_timeline(&timeline);
        assert_eq!(data.tempo_events().len(), 3);
        // 500000 covers 480 + 960 ticks, 1000000 only 960
        assert_eq!(data.primary_tempo_mpq(), 500_000);
        assert_eq!(data.tick_to_micros(480), 500_000);
        assert_eq!(data.tick_to_micros(1440), 2_500_000);
        assert_eq!(data.song_length_micros(), 3_500_000);
        assert_eq!(data.primary_tempo_bpm(), 120);
    }

    #[test]
    fn test_default_tempo() {
        let mut timeline = Timeline::new(96);
        timeline.create_track();
        let data = SequenceData::from_timeline(&timeline);
        assert_eq!(data.primary_tempo_mpq(), 500_000);
        assert_eq!(data.tempo_events()[0].tick, 0);
        assert_eq!(data.time_signature(), None);
    }

    #[test]
    fn test_from_parsed_abc() {
        let (timeline, _) = parse_abc_str(
            r#"X:1
T:Song
M:3/4
L:1/4
Q:90
K:C
CDE|
"#,
        )
        .unwrap();
        let data = SequenceData::from_timeline(&timeline);
        assert_eq!(data.primary_tempo_bpm(), 90);
        assert_eq!(data.time_signature().map(|m| m.to_string()), Some("3/4".to_string()));
        assert_eq!(data.key_signature(), Some(KeySignature::C_MAJOR));
        assert_eq!(data.tracks().len(), 2);
        let ids: Vec<i32> = data.tracks()[1].notes.iter().map(|n| n.note.id()).collect();
        assert_eq!(ids, vec![48, 50, 52]);
    }
}
