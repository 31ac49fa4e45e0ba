//! ABC notation for LOTRO music
//!
//! This library converts ABC song files into a tick-timed note timeline and
//! writes timelines back out as ABC that the game can play.

pub mod config;
pub mod error;
pub mod export;
pub mod file;
pub mod info;
pub mod note_parser;
pub mod pan;
pub mod parser;
pub mod region;
pub mod sequence;
pub mod timeline;
pub mod timing;
pub mod tune;
pub mod types;
pub mod util;

#[cfg(feature = "midi")]
pub mod midi;

// Re-export commonly used types
pub use config::{ExportParams, ParseParams};
pub use error::{ConversionError, ParseError};
pub use export::{AbcExporter, ExportPart, ExportTrack, PartView, SongMetadata};
pub use file::AbcFile;
pub use info::AbcInfo;
pub use parser::convert;
pub use region::AbcRegion;
pub use sequence::SequenceData;
pub use timeline::{Timeline, TimelineEvent};
pub use timing::QuantizedTimingInfo;
pub use types::instrument::Instrument;
pub use types::key_signature::KeySignature;
pub use types::note::Note;
pub use types::time_signature::TimeSignature;
