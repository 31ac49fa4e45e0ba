use crate::timeline::{Timeline, TimelineEvent, Track};
use anyhow::{Result, bail};
use log::debug;
use midly::num::{u4, u7, u15, u24, u28};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};

/// Writes a timeline as a format 1 standard MIDI file, one MIDI track per
/// timeline track.
pub fn timeline_to_midi(timeline: &Timeline) -> Result<Vec<u8>> {
    if timeline.ppqn() == 0 || timeline.ppqn() > u15::max_value().as_int() as u32 {
        bail!("Resolution of {} ticks per quarter can't be stored in MIDI", timeline.ppqn());
    }
    let timing = Timing::Metrical(u15::new(timeline.ppqn() as u16));

    let tracks = timeline
        .tracks()
        .iter()
        .map(convert_track)
        .collect::<Result<Vec<_>>>()?;

    let smf = Smf {
        header: Header {
            format: Format::Parallel,
            timing,
        },
        tracks,
    };

    let mut buffer = Vec::new();
    smf.write(&mut buffer)
        .map_err(|e| anyhow::anyhow!("Failed to write MIDI: {}", e))?;

    debug!(
        "Wrote {} tracks to MIDI ({} bytes)",
        timeline.tracks().len(),
        buffer.len()
    );
    Ok(buffer)
}

fn convert_track(track: &Track) -> Result<Vec<TrackEvent<'_>>> {
    let mut events: Vec<_> = track.events().iter().collect();
    events.sort_by_key(|e| e.tick);

    let mut track_events = Vec::with_capacity(events.len() + 1);
    let mut last_tick = 0u64;
    for e in events {
        let mut delta_tick = e.tick - last_tick;
        last_tick = e.tick;

        while delta_tick > u28::max_value().as_int() as u64 {
            track_events.push(TrackEvent {
                delta: u28::max_value(),
                kind: TrackEventKind::Meta(MetaMessage::Text(b"long delta")),
            });
            delta_tick -= u28::max_value().as_int() as u64;
        }

        track_events.push(TrackEvent {
            delta: u28::new(delta_tick as u32),
            kind: event_kind(&e.event)?,
        });
    }

    track_events.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    Ok(track_events)
}

fn channel(channel: u8) -> Result<u4> {
    if channel > 15 {
        bail!("Channel {} out of range for MIDI", channel);
    }
    Ok(u4::new(channel))
}

fn midi(ch: u8, message: MidiMessage) -> Result<TrackEventKind<'static>> {
    Ok(TrackEventKind::Midi {
        channel: channel(ch)?,
        message,
    })
}

fn event_kind(event: &TimelineEvent) -> Result<TrackEventKind<'_>> {
    match event {
        TimelineEvent::NoteOn {
            channel,
            key,
            velocity,
        } => midi(
            *channel,
            MidiMessage::NoteOn {
                key: u7::new(*key & 0x7f),
                vel: u7::new(*velocity & 0x7f),
            },
        ),
        TimelineEvent::NoteOff { channel, key } => midi(
            *channel,
            MidiMessage::NoteOff {
                key: u7::new(*key & 0x7f),
                vel: u7::new(0),
            },
        ),
        TimelineEvent::ProgramChange { channel, program } => midi(
            *channel,
            MidiMessage::ProgramChange {
                program: u7::new(*program & 0x7f),
            },
        ),
        TimelineEvent::Controller {
            channel,
            controller,
            value,
        } => midi(
            *channel,
            MidiMessage::Controller {
                controller: u7::new(*controller & 0x7f),
                value: u7::new(*value & 0x7f),
            },
        ),
        TimelineEvent::Tempo { micros_per_quarter } => {
            if *micros_per_quarter > u24::max_value().as_int() {
                bail!("Tempo of {} microseconds per quarter is too slow for MIDI", micros_per_quarter);
            }
            Ok(TrackEventKind::Meta(MetaMessage::Tempo(u24::new(
                *micros_per_quarter,
            ))))
        }
        TimelineEvent::TimeSignature(meter) => {
            Ok(TrackEventKind::Meta(MetaMessage::TimeSignature(
                meter.numerator() as u8,
                meter.denominator_log2(),
                24, // MIDI clocks per metronome click
                8,  // 32nd notes per quarter note
            )))
        }
        TimelineEvent::KeySignature(key) => Ok(TrackEventKind::Meta(MetaMessage::KeySignature(
            key.sharps_flats() as i8,
            key.is_minor(),
        ))),
        TimelineEvent::TrackName(name) => {
            Ok(TrackEventKind::Meta(MetaMessage::TrackName(name.as_bytes())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::time_signature::TimeSignature;

    #[test]
    fn test_writes_format_1() {
        let mut timeline = Timeline::new(480);
        let song = timeline.create_track();
        let track = timeline.track_mut(song).unwrap();
        track.add(
            0,
            TimelineEvent::Tempo {
                micros_per_quarter: 500_000,
            },
        );
        track.add(0, TimelineEvent::TimeSignature(TimeSignature::new(6, 8).unwrap()));
        let part = timeline.create_track();
        let track = timeline.track_mut(part).unwrap();
        track.add(0, TimelineEvent::TrackName("Flute".to_string()));
        track.add(
            0,
            TimelineEvent::NoteOn {
                channel: 1,
                key: 60,
                velocity: 80,
            },
        );
        track.add(480, TimelineEvent::NoteOff { channel: 1, key: 60 });

        let bytes = timeline_to_midi(&timeline).unwrap();
        let smf = Smf::parse(&bytes).unwrap();
        assert_eq!(smf.header.format, Format::Parallel);
        assert_eq!(smf.header.timing, Timing::Metrical(u15::new(480)));
        assert_eq!(smf.tracks.len(), 2);

        assert!(smf.tracks[0].iter().any(|e| matches!(
            e.kind,
            TrackEventKind::Meta(MetaMessage::TimeSignature(6, 3, _, _))
        )));
        let off = smf.tracks[1]
            .iter()
            .find(|e| matches!(e.kind, TrackEventKind::Midi { message: MidiMessage::NoteOff { .. }, .. }))
            .unwrap();
        assert_eq!(off.delta.as_int(), 480);
    }

    #[test]
    fn test_rejects_bad_channel() {
        let mut timeline = Timeline::new(96);
        let track = timeline.create_track();
        timeline.track_mut(track).unwrap().add(
            0,
            TimelineEvent::ProgramChange {
                channel: 16,
                program: 1,
            },
        );
        assert!(timeline_to_midi(&timeline).is_err());
    }
}
