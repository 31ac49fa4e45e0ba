use crate::timeline::{Timeline, TimelineEvent};
use crate::types::key_signature::{KeyMode, KeySignature};
use crate::types::time_signature::TimeSignature;
use anyhow::{Result, bail};
use log::{debug, warn};
use midly::{Format, MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use std::collections::BTreeMap;

#[derive(Debug)]
struct MidiTimedEvent {
    tick: u64,
    event: TimelineEvent,
}

/// Reads a format 0 or format 1 standard MIDI file.
///
/// Tempo, meter and key events from any track land on track 0. Format 1
/// tracks with channel events become one timeline track each; a format 0
/// file is split into one track per channel.
pub fn midi_to_timeline(midi_bytes: &[u8]) -> Result<Timeline> {
    let smf = Smf::parse(midi_bytes)?;

    if smf.header.format == Format::Sequential {
        bail!("MIDI format 2 files are not supported");
    }

    let ppqn = match smf.header.timing {
        Timing::Metrical(ppqn) => ppqn.as_int() as u32,
        Timing::Timecode(_, _) => bail!("Timecode timing is not supported"),
    };

    let mut song = Vec::new();
    let mut song_name = None;
    let mut parts: Vec<(Option<String>, Vec<MidiTimedEvent>)> = Vec::new();

    for track in &smf.tracks {
        let mut tick = 0u64;
        let mut name = None;
        let mut notes = Vec::new();

        for event in track.iter() {
            tick += event.delta.as_int() as u64;
            match &event.kind {
                TrackEventKind::Midi { channel, message } => {
                    if let Some(event) = convert_midi_message(channel.as_int(), message) {
                        notes.push(MidiTimedEvent { tick, event });
                    }
                }
                TrackEventKind::Meta(MetaMessage::TrackName(text)) if name.is_none() => {
                    name = Some(String::from_utf8_lossy(text).trim().to_string());
                }
                TrackEventKind::Meta(meta) => {
                    if let Some(event) = convert_meta_message(meta) {
                        song.push(MidiTimedEvent { tick, event });
                    }
                }
                TrackEventKind::SysEx(_) | TrackEventKind::Escape(_) => {}
            }
        }

        if notes.is_empty() {
            song_name = song_name.or(name);
        } else if smf.header.format == Format::SingleTrack {
            parts.extend(split_by_channel(name, notes));
        } else {
            parts.push((name, notes));
        }
    }

    let mut timeline = Timeline::new(ppqn);
    let index = timeline.create_track();
    if let Some(track) = timeline.track_mut(index) {
        if let Some(name) = song_name {
            track.add(0, TimelineEvent::TrackName(name));
        }
        for e in song {
            track.add(e.tick, e.event);
        }
    }

    for (name, events) in parts {
        let index = timeline.create_track();
        if let Some(track) = timeline.track_mut(index) {
            if let Some(name) = name {
                track.add(0, TimelineEvent::TrackName(name));
            }
            for e in events {
                track.add(e.tick, e.event);
            }
        }
    }
    timeline.sort();

    debug!(
        "Read {} MIDI tracks into {} timeline tracks at {} ppqn",
        smf.tracks.len(),
        timeline.tracks().len(),
        ppqn
    );
    Ok(timeline)
}

fn split_by_channel(
    name: Option<String>,
    events: Vec<MidiTimedEvent>,
) -> Vec<(Option<String>, Vec<MidiTimedEvent>)> {
    let mut by_channel: BTreeMap<u8, Vec<MidiTimedEvent>> = BTreeMap::new();
    for e in events {
        let channel = e.event.channel().unwrap_or(0);
        by_channel.entry(channel).or_default().push(e);
    }
    let single = by_channel.len() == 1;
    by_channel
        .into_iter()
        .map(|(channel, events)| {
            let name = match &name {
                Some(name) if single => Some(name.clone()),
                _ => Some(format!("Channel {}", channel + 1)),
            };
            (name, events)
        })
        .collect()
}

fn convert_midi_message(channel: u8, message: &MidiMessage) -> Option<TimelineEvent> {
    match message {
        MidiMessage::NoteOn { key, vel } if vel.as_int() == 0 => Some(TimelineEvent::NoteOff {
            channel,
            key: key.as_int(),
        }),
        MidiMessage::NoteOn { key, vel } => Some(TimelineEvent::NoteOn {
            channel,
            key: key.as_int(),
            velocity: vel.as_int(),
        }),
        MidiMessage::NoteOff { key, .. } => Some(TimelineEvent::NoteOff {
            channel,
            key: key.as_int(),
        }),
        MidiMessage::ProgramChange { program } => Some(TimelineEvent::ProgramChange {
            channel,
            program: program.as_int(),
        }),
        MidiMessage::Controller { controller, value } => Some(TimelineEvent::Controller {
            channel,
            controller: controller.as_int(),
            value: value.as_int(),
        }),
        MidiMessage::PitchBend { .. }
        | MidiMessage::Aftertouch { .. }
        | MidiMessage::ChannelAftertouch { .. } => None,
    }
}

fn convert_meta_message(message: &MetaMessage) -> Option<TimelineEvent> {
    match message {
        MetaMessage::Tempo(tempo) => Some(TimelineEvent::Tempo {
            micros_per_quarter: tempo.as_int(),
        }),
        MetaMessage::TimeSignature(numerator, denominator_log2, _, _) => {
            let denominator = 1u32.checked_shl(*denominator_log2 as u32).unwrap_or(0);
            match TimeSignature::new(*numerator as u32, denominator) {
                Ok(meter) => Some(TimelineEvent::TimeSignature(meter)),
                Err(e) => {
                    warn!("Ignoring time signature {}/{}: {}", numerator, denominator, e);
                    None
                }
            }
        }
        MetaMessage::KeySignature(sharps_flats, minor) => {
            let mode = if *minor { KeyMode::Minor } else { KeyMode::Major };
            match KeySignature::new(*sharps_flats as i32, mode) {
                Ok(key) => Some(TimelineEvent::KeySignature(key)),
                Err(e) => {
                    warn!("Ignoring key signature: {}", e);
                    None
                }
            }
        }
        _ => None,
    }
}
