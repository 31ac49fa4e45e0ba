pub mod accidental;
pub mod chord;
pub mod dynamics;
pub mod field;
pub mod instrument;
pub mod key_signature;
pub mod note;
pub mod note_event;
pub mod time_signature;
