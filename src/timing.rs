//! Quantization grid and bar layout used when exporting ABC.

use crate::error::ConversionError;
use crate::sequence::SequenceData;
use crate::types::time_signature::TimeSignature;
use std::collections::BTreeMap;

pub const ONE_SECOND_MICROS: i64 = 1_000_000;
pub const ONE_MINUTE_MICROS: i64 = 60 * ONE_SECOND_MICROS;
/// The shortest note the game will play.
pub const SHORTEST_NOTE_MICROS: i64 = ONE_MINUTE_MICROS / 1000;
/// The longest untied note the game will play.
pub const LONGEST_NOTE_MICROS: i64 = 8 * ONE_SECOND_MICROS;
pub const MAX_TEMPO: i32 = (ONE_MINUTE_MICROS / SHORTEST_NOTE_MICROS) as i32;
pub const MIN_TEMPO: i32 =
    ((ONE_MINUTE_MICROS + LONGEST_NOTE_MICROS / 2) / LONGEST_NOTE_MICROS) as i32;

/// How far a bar line may land from the grid and still count as on it.
const GRID_EPSILON: f64 = MIN_TEMPO as f64 / (2.0 * MAX_TEMPO as f64);

/// Rounds to the nearest multiple of `grid`.
pub fn round_grid(value: i64, grid: i64) -> i64 {
    ((value + grid / 2) / grid) * grid
}

pub fn floor_grid(value: i64, grid: i64) -> i64 {
    (value / grid) * grid
}

fn ticks_to_micros(ticks: i64, tempo_mpq: i64, resolution: i64) -> i64 {
    (ticks as f64 * tempo_mpq as f64 / resolution as f64) as i64
}

fn micros_to_ticks(micros: i64, tempo_mpq: i64, resolution: i64) -> i64 {
    (micros as f64 * resolution as f64 / tempo_mpq as f64) as i64
}

/// Snaps a tempo to the nearest whole number of beats per minute.
pub fn round_tempo_mpq(tempo_mpq: f64) -> f64 {
    let bpm = (ONE_MINUTE_MICROS as f64 / tempo_mpq).round().max(1.0);
    ONE_MINUTE_MICROS as f64 / bpm
}

/// Note grid for one tempo.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimingInfo {
    tempo_mpq: i64,
    export_tempo_mpq: i64,
    export_tempo_bpm: i32,
    resolution_ppq: i64,
    meter: TimeSignature,
    triplets: bool,
    default_divisor: i64,
    min_note_divisor: i64,
    min_note_length_ticks: i64,
    max_note_length_ticks: i64,
    bar_length_ticks: i64,
}

impl TimingInfo {
    pub fn new(
        tempo_mpq: i64,
        resolution_ppq: i64,
        export_tempo_factor: f32,
        meter: TimeSignature,
        triplets: bool,
    ) -> Result<Self, ConversionError> {
        let export_tempo_mpq = (tempo_mpq as f64 / export_tempo_factor as f64).round() as i64;
        let export_tempo_bpm =
            (ONE_MINUTE_MICROS as f64 / export_tempo_mpq.max(1) as f64).round() as i32;
        if !(MIN_TEMPO..=MAX_TEMPO).contains(&export_tempo_bpm) {
            return Err(ConversionError::TempoOutOfRange {
                tempo: export_tempo_bpm,
                min: MIN_TEMPO,
                max: MAX_TEMPO,
            });
        }

        let numerator = meter.numerator() as i64;
        let denominator = meter.denominator() as i64;

        // A meter under 3/4 defaults to sixteenth notes, anything else to eighths.
        let base = if (numerator as f64 / denominator as f64) < 0.75 {
            16
        } else {
            8
        };
        let default_divisor = base * 4 / denominator;

        let mut min_note_divisor = if triplets {
            default_divisor * 3
        } else {
            default_divisor
        };
        let mut min_note_micros = export_tempo_mpq * 4 / min_note_divisor;
        while min_note_micros < SHORTEST_NOTE_MICROS && min_note_divisor > 1 {
            min_note_micros *= 2;
            min_note_divisor /= 2;
        }
        while min_note_micros >= SHORTEST_NOTE_MICROS * 2 {
            min_note_micros /= 2;
            min_note_divisor *= 2;
        }

        if denominator > min_note_divisor {
            return Err(ConversionError::MeterTooFine {
                max: min_note_divisor,
            });
        }
        if (resolution_ppq * 4) % min_note_divisor != 0 {
            return Err(ConversionError::UnrepresentableResolution {
                resolution: resolution_ppq,
                divisor: min_note_divisor,
            });
        }

        let min_note_length_ticks = resolution_ppq * 4 / min_note_divisor;
        let max_note_length_ticks = min_note_length_ticks * (LONGEST_NOTE_MICROS / min_note_micros);
        let bar_length_ticks = 4 * resolution_ppq * numerator / denominator;

        Ok(Self {
            tempo_mpq,
            export_tempo_mpq,
            export_tempo_bpm,
            resolution_ppq,
            meter,
            triplets,
            default_divisor,
            min_note_divisor,
            min_note_length_ticks,
            max_note_length_ticks,
            bar_length_ticks,
        })
    }

    pub fn tempo_mpq(&self) -> i64 {
        self.tempo_mpq
    }

    pub fn tempo_bpm(&self) -> i32 {
        (ONE_MINUTE_MICROS as f64 / self.tempo_mpq as f64).round() as i32
    }

    pub fn export_tempo_mpq(&self) -> i64 {
        self.export_tempo_mpq
    }

    pub fn export_tempo_bpm(&self) -> i32 {
        self.export_tempo_bpm
    }

    pub fn resolution_ppq(&self) -> i64 {
        self.resolution_ppq
    }

    pub fn meter(&self) -> TimeSignature {
        self.meter
    }

    pub fn is_triplet_timing(&self) -> bool {
        self.triplets
    }

    /// Denominator of the unit note length an ABC reader assumes for this meter.
    pub fn default_divisor(&self) -> i64 {
        self.default_divisor
    }

    pub fn min_note_divisor(&self) -> i64 {
        self.min_note_divisor
    }

    pub fn min_note_length_ticks(&self) -> i64 {
        self.min_note_length_ticks
    }

    pub fn max_note_length_ticks(&self) -> i64 {
        self.max_note_length_ticks
    }

    pub fn bar_length_ticks(&self) -> i64 {
        self.bar_length_ticks
    }
}

/// Start of a tempo segment on the quantized time line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimingInfoEvent {
    pub tick: i64,
    /// Export time at `tick`.
    pub micros: i64,
    /// Bar position at `tick`. Tempo changes may fall inside a bar.
    pub bar_number: f64,
    pub info: TimingInfo,
}

/// The song's tempo map snapped to the note grid, with bar lines.
///
/// Every tempo change starts on a whole multiple of the previous segment's
/// shortest note, so a note can be split at any tempo change without leaving
/// a fragment the grid can't express.
#[derive(Debug, Clone)]
pub struct QuantizedTimingInfo {
    /// Sorted by tick, never empty.
    events: Vec<TimingInfoEvent>,
    bar_starts: Vec<i64>,
    song_length_ticks: i64,
    resolution: i64,
    primary_tempo_mpq: i64,
    export_tempo_factor: f32,
    meter: TimeSignature,
    triplets: bool,
}

impl QuantizedTimingInfo {
    pub fn new(
        sequence: &SequenceData,
        export_tempo_factor: f32,
        meter: TimeSignature,
        triplets: bool,
    ) -> Result<Self, ConversionError> {
        let factor = export_tempo_factor as f64;
        let export_primary_mpq = round_tempo_mpq(sequence.primary_tempo_mpq() as f64 / factor);
        let primary_tempo_mpq = (export_primary_mpq * factor).round() as i64;
        let resolution = sequence.resolution();

        let mut events = BTreeMap::new();
        let default_timing = TimingInfo::new(
            sequence.primary_tempo_mpq(),
            resolution,
            export_tempo_factor,
            meter,
            triplets,
        )?;
        events.insert(
            0,
            TimingInfoEvent {
                tick: 0,
                micros: 0,
                bar_number: 0.0,
                info: default_timing,
            },
        );

        for source in sequence.tempo_events() {
            let info = TimingInfo::new(
                source.tempo_mpq,
                resolution,
                export_tempo_factor,
                meter,
                triplets,
            )?;
            let mut placed = None;

            while let Some(prev) = events.values().next_back().copied() {
                let grid = prev.info.min_note_length_ticks();
                let mut length = floor_grid(source.tick - prev.tick, grid);

                // Pull the change earlier until the next bar line sits on the new grid.
                while length > 0 {
                    let bar = prev.bar_number + length as f64 / prev.info.bar_length_ticks() as f64;
                    let remaining = (bar.ceil() - bar) * info.bar_length_ticks() as f64
                        / info.min_note_length_ticks() as f64;
                    if (remaining - remaining.round()).abs() <= GRID_EPSILON {
                        break;
                    }
                    length -= grid;
                }

                if length <= 0 {
                    events.remove(&prev.tick);
                    continue;
                }

                placed = Some(TimingInfoEvent {
                    tick: prev.tick + length,
                    micros: prev.micros
                        + ticks_to_micros(length, prev.info.export_tempo_mpq(), resolution),
                    bar_number: prev.bar_number
                        + length as f64 / prev.info.bar_length_ticks() as f64,
                    info,
                });
                break;
            }

            let event = placed.unwrap_or(TimingInfoEvent {
                tick: 0,
                micros: 0,
                bar_number: 0.0,
                info,
            });
            if event.tick != source.tick {
                log::debug!(
                    "Tempo change at tick {} moved to {} to fit the note grid",
                    source.tick,
                    event.tick
                );
            }
            events.insert(event.tick, event);
        }

        let events: Vec<TimingInfoEvent> = events.into_values().collect();
        let song_length_ticks = sequence.song_length_ticks();
        let bar_starts = calc_bar_starts(&events, song_length_ticks);

        Ok(Self {
            events,
            bar_starts,
            song_length_ticks,
            resolution,
            primary_tempo_mpq,
            export_tempo_factor,
            meter,
            triplets,
        })
    }

    pub fn primary_tempo_mpq(&self) -> i64 {
        self.primary_tempo_mpq
    }

    pub fn primary_tempo_bpm(&self) -> i32 {
        (ONE_MINUTE_MICROS as f64 / self.primary_tempo_mpq as f64).round() as i32
    }

    pub fn primary_export_tempo_mpq(&self) -> i64 {
        (self.primary_tempo_mpq as f64 / self.export_tempo_factor as f64).round() as i64
    }

    pub fn primary_export_tempo_bpm(&self) -> i32 {
        let export_mpq = self.primary_tempo_mpq as f64 / self.export_tempo_factor as f64;
        (ONE_MINUTE_MICROS as f64 / export_mpq).round() as i32
    }

    pub fn export_tempo_factor(&self) -> f32 {
        self.export_tempo_factor
    }

    pub fn meter(&self) -> TimeSignature {
        self.meter
    }

    pub fn is_triplet_timing(&self) -> bool {
        self.triplets
    }

    /// Ticks per quarter note of the source.
    pub fn resolution(&self) -> i64 {
        self.resolution
    }

    pub fn song_length_ticks(&self) -> i64 {
        self.song_length_ticks
    }

    /// Tempo segments in tick order.
    pub fn timing_events(&self) -> &[TimingInfoEvent] {
        &self.events
    }

    fn event_for_tick(&self, tick: i64) -> &TimingInfoEvent {
        let index = self.events.partition_point(|e| e.tick <= tick);
        &self.events[index.saturating_sub(1)]
    }

    fn event_for_micros(&self, micros: i64) -> &TimingInfoEvent {
        let index = self.events.partition_point(|e| e.micros <= micros);
        &self.events[index.saturating_sub(1)]
    }

    pub fn timing_info(&self, tick: i64) -> &TimingInfo {
        &self.event_for_tick(tick).info
    }

    /// The first tempo change after `tick`.
    pub fn next_timing_event(&self, tick: i64) -> Option<&TimingInfoEvent> {
        let index = self.events.partition_point(|e| e.tick <= tick);
        self.events.get(index)
    }

    /// Nearest grid point to `tick`.
    pub fn quantize(&self, tick: i64) -> i64 {
        let e = self.event_for_tick(tick);
        e.tick + round_grid(tick - e.tick, e.info.min_note_length_ticks())
    }

    /// Export time at `tick`.
    pub fn tick_to_micros(&self, tick: i64) -> i64 {
        let e = self.event_for_tick(tick);
        e.micros + ticks_to_micros(tick - e.tick, e.info.export_tempo_mpq(), self.resolution)
    }

    pub fn micros_to_tick(&self, micros: i64) -> i64 {
        let e = self.event_for_micros(micros);
        e.tick + micros_to_ticks(micros - e.micros, e.info.export_tempo_mpq(), self.resolution)
    }

    /// Zero-based bar containing `tick`.
    pub fn tick_to_bar_number(&self, tick: i64) -> i32 {
        let e = self.event_for_tick(tick);
        (e.bar_number + (tick - e.tick) as f64 / e.info.bar_length_ticks() as f64).floor() as i32
    }

    pub fn tick_to_bar_start_tick(&self, tick: i64) -> i64 {
        match self.bar_starts.last() {
            Some(&last) if tick <= last => {
                let index = self.bar_starts.partition_point(|&start| start <= tick);
                self.bar_starts[index.saturating_sub(1)]
            }
            _ => self.bar_number_to_bar_start_tick(self.tick_to_bar_number(tick)),
        }
    }

    /// First bar line strictly after `tick`.
    pub fn tick_to_bar_end_tick(&self, tick: i64) -> i64 {
        let index = self.bar_starts.partition_point(|&start| start <= tick);
        match self.bar_starts.get(index) {
            Some(&end) => end,
            None => self.bar_number_to_bar_end_tick(self.tick_to_bar_number(tick)),
        }
    }

    pub fn bar_number_to_bar_start_tick(&self, bar_number: i32) -> i64 {
        if bar_number >= 0 {
            if let Some(&start) = self.bar_starts.get(bar_number as usize) {
                return start;
            }
        }
        let e = &self.events[self.events.len() - 1];
        e.tick + ((bar_number as f64 - e.bar_number) * e.info.bar_length_ticks() as f64).round() as i64
    }

    pub fn bar_number_to_bar_end_tick(&self, bar_number: i32) -> i64 {
        self.bar_number_to_bar_start_tick(bar_number + 1)
    }

    pub fn bar_number_to_micros(&self, bar_number: i32) -> i64 {
        self.tick_to_micros(self.bar_number_to_bar_start_tick(bar_number))
    }
}

fn calc_bar_starts(events: &[TimingInfoEvent], song_length_ticks: i64) -> Vec<i64> {
    let first_bar_start = |e: &TimingInfoEvent| {
        e.tick
            + ((e.bar_number.ceil() - e.bar_number) * e.info.bar_length_ticks() as f64).round()
                as i64
    };

    let mut starts = vec![0];
    let mut prev: Option<&TimingInfoEvent> = None;
    for event in events {
        if let Some(prev) = prev {
            let mut bar_start = first_bar_start(prev);
            while bar_start < event.tick {
                starts.push(bar_start);
                bar_start += prev.info.bar_length_ticks();
            }
        }
        prev = Some(event);
    }

    if let Some(last) = prev {
        let mut bar_start = first_bar_start(last);
        while bar_start <= song_length_ticks {
            starts.push(bar_start);
            bar_start += last.info.bar_length_ticks();
        }
        starts.push(bar_start);
    }

    starts.sort_unstable();
    starts.dedup();
    starts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::{Timeline, TimelineEvent};

    fn meter(s: &str) -> TimeSignature {
        s.parse().unwrap()
    }

    fn sequence(tempos: &[(u64, u32)], song_end: u64) -> SequenceData {
        let mut timeline = Timeline::new(480);
        let song = timeline.create_track();
        let part = timeline.create_track();
        for &(tick, mpq) in tempos {
            timeline.track_mut(song).unwrap().add(
                tick,
                TimelineEvent::Tempo {
                    micros_per_quarter: mpq,
                },
            );
        }
        let track = timeline.track_mut(part).unwrap();
        track.add(
            0,
            TimelineEvent::NoteOn {
                channel: 1,
                key: 60,
                velocity: 80,
            },
        );
        track.add(song_end, TimelineEvent::NoteOff { channel: 1, key: 60 });
        SequenceData::from_timeline(&timeline)
    }

    #[test]
    fn test_timing_info_grid() {
        let info = TimingInfo::new(500_000, 480, 1.0, TimeSignature::FOUR_FOUR, false).unwrap();
        assert_eq!(info.export_tempo_bpm(), 120);
        assert_eq!(info.default_divisor(), 8);
        assert_eq!(info.min_note_divisor(), 32);
        assert_eq!(info.min_note_length_ticks(), 60);
        assert_eq!(info.max_note_length_ticks(), 7680);
        assert_eq!(info.bar_length_ticks(), 1920);

        let info = TimingInfo::new(500_000, 480, 1.0, TimeSignature::FOUR_FOUR, true).unwrap();
        assert_eq!(info.min_note_divisor(), 24);
        assert_eq!(info.min_note_length_ticks(), 80);

        let info = TimingInfo::new(500_000, 480, 1.0, meter("2/4"), false).unwrap();
        assert_eq!(info.default_divisor(), 16);
        assert_eq!(info.bar_length_ticks(), 960);

        let info = TimingInfo::new(500_000, 480, 1.0, meter("6/8"), false).unwrap();
        assert_eq!(info.default_divisor(), 4);
        assert_eq!(info.bar_length_ticks(), 1440);
    }

    #[test]
    fn test_export_tempo_factor() {
        let info = TimingInfo::new(500_000, 480, 0.5, TimeSignature::FOUR_FOUR, false).unwrap();
        assert_eq!(info.tempo_bpm(), 120);
        assert_eq!(info.export_tempo_bpm(), 60);
        assert_eq!(info.export_tempo_mpq(), 1_000_000);
        // the grid is chosen at export tempo
        assert_eq!(info.min_note_divisor(), 64);
        assert_eq!(info.min_note_length_ticks(), 30);
    }

    #[test]
    fn test_timing_info_errors() {
        assert_eq!(
            TimingInfo::new(30_000, 480, 1.0, TimeSignature::FOUR_FOUR, false).unwrap_err(),
            ConversionError::TempoOutOfRange {
                tempo: 2000,
                min: 8,
                max: 1000
            }
        );
        assert_eq!(
            TimingInfo::new(60_000, 480, 1.0, meter("6/8"), false).unwrap_err(),
            ConversionError::MeterTooFine { max: 4 }
        );
        assert_eq!(
            TimingInfo::new(500_000, 100, 1.0, TimeSignature::FOUR_FOUR, false).unwrap_err(),
            ConversionError::UnrepresentableResolution {
                resolution: 100,
                divisor: 32
            }
        );
    }

    #[test]
    fn test_quantize_is_idempotent() {
        let qtm =
            QuantizedTimingInfo::new(&sequence(&[], 4000), 1.0, TimeSignature::FOUR_FOUR, false)
                .unwrap();
        for tick in [0, 29, 30, 31, 59, 61, 1000, 1919, 3333] {
            let once = qtm.quantize(tick);
            assert_eq!(once % 60, 0);
            assert_eq!(qtm.quantize(once), once);
        }
        assert_eq!(qtm.quantize(29), 0);
        assert_eq!(qtm.quantize(30), 60);
    }

    #[test]
    fn test_bars() {
        let qtm =
            QuantizedTimingInfo::new(&sequence(&[], 4000), 1.0, TimeSignature::FOUR_FOUR, false)
                .unwrap();
        assert_eq!(qtm.tick_to_bar_number(1919), 0);
        assert_eq!(qtm.tick_to_bar_number(1920), 1);
        assert_eq!(qtm.tick_to_bar_start_tick(2500), 1920);
        assert_eq!(qtm.tick_to_bar_end_tick(1920), 3840);
        assert_eq!(qtm.tick_to_bar_end_tick(1919), 1920);
        assert_eq!(qtm.bar_number_to_bar_start_tick(10), 19200);
        assert_eq!(qtm.tick_to_bar_end_tick(19200), 21120);
        assert_eq!(qtm.bar_number_to_micros(1), 2_000_000);
        assert_eq!(qtm.primary_export_tempo_bpm(), 120);
    }

    #[test]
    fn test_tempo_change_is_snapped_to_grid() {
        let qtm = QuantizedTimingInfo::new(
            &sequence(&[(0, 500_000), (1000, 250_000)], 1500),
            1.0,
            TimeSignature::FOUR_FOUR,
            false,
        )
        .unwrap();

        let ticks: Vec<i64> = qtm.timing_events().iter().map(|e| e.tick).collect();
        assert_eq!(ticks, vec![0, 960]);
        assert_eq!(qtm.primary_tempo_mpq(), 500_000);
        assert_eq!(qtm.timing_info(959).export_tempo_bpm(), 120);
        assert_eq!(qtm.timing_info(960).export_tempo_bpm(), 240);
        assert_eq!(qtm.next_timing_event(0).map(|e| e.tick), Some(960));
        assert!(qtm.next_timing_event(960).is_none());

        assert_eq!(qtm.tick_to_micros(960), 1_000_000);
        assert_eq!(qtm.tick_to_micros(1920), 1_500_000);
        assert_eq!(qtm.micros_to_tick(1_500_000), 1920);
        assert_eq!(qtm.tick_to_bar_number(1920), 1);
        assert_eq!(qtm.tick_to_bar_start_tick(1500), 0);
        assert_eq!(qtm.tick_to_bar_end_tick(1500), 1920);

        assert_eq!(qtm.quantize(1000), 960);
        assert_eq!(qtm.quantize(1030), 1080);
    }
}
