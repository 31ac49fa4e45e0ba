//! Standard MIDI file reading and writing for [`Timeline`](crate::timeline::Timeline)s.

mod midi_to_timeline;
mod timeline_to_midi;

pub use midi_to_timeline::midi_to_timeline;
pub use timeline_to_midi::timeline_to_midi;
