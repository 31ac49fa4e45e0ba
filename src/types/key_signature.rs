use crate::types::accidental::Accidental;
use crate::types::note::Note;
use anyhow::{Result, anyhow, bail};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyMode {
    Major,
    Minor,
    Dorian,
    Phrygian,
    Lydian,
    Mixolydian,
    Aeolian,
    Ionian,
    Locrian,
}

const ALL_MODES: [KeyMode; 9] = [
    KeyMode::Major,
    KeyMode::Minor,
    KeyMode::Dorian,
    KeyMode::Phrygian,
    KeyMode::Lydian,
    KeyMode::Mixolydian,
    KeyMode::Aeolian,
    KeyMode::Ionian,
    KeyMode::Locrian,
];

impl KeyMode {
    /// Three-letter abbreviation, e.g. `MAJ` or `DOR`.
    pub fn short_name(&self) -> &'static str {
        match self {
            KeyMode::Major => "MAJ",
            KeyMode::Minor => "MIN",
            KeyMode::Dorian => "DOR",
            KeyMode::Phrygian => "PHR",
            KeyMode::Lydian => "LYD",
            KeyMode::Mixolydian => "MIX",
            KeyMode::Aeolian => "AEO",
            KeyMode::Ionian => "ION",
            KeyMode::Locrian => "LOC",
        }
    }

    /// Empty or `M` is major, `m` is minor, otherwise the first three
    /// letters are matched case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        if s.is_empty() || s == "M" {
            return Some(KeyMode::Major);
        }
        if s == "m" {
            return Some(KeyMode::Minor);
        }
        let prefix: String = s.chars().take(3).collect::<String>().to_uppercase();
        ALL_MODES.into_iter().find(|m| m.short_name() == prefix)
    }

    fn tonics(&self) -> &'static [&'static str; 15] {
        match self {
            KeyMode::Major | KeyMode::Ionian => &MAJOR_KEYS,
            KeyMode::Minor | KeyMode::Aeolian => &MINOR_KEYS,
            KeyMode::Dorian => &DORIAN_KEYS,
            KeyMode::Phrygian => &PHRYGIAN_KEYS,
            KeyMode::Lydian => &LYDIAN_KEYS,
            KeyMode::Mixolydian => &MIXOLYDIAN_KEYS,
            KeyMode::Locrian => &LOCRIAN_KEYS,
        }
    }
}

// Tonic names indexed by sharps_flats + 7.
const MAJOR_KEYS: [&str; 15] = [
    "Cb", "Gb", "Db", "Ab", "Eb", "Bb", "F", "C", "G", "D", "A", "E", "B", "F#", "C#",
];
const MINOR_KEYS: [&str; 15] = [
    "Ab", "Eb", "Bb", "F", "C", "G", "D", "A", "E", "B", "F#", "C#", "G#", "D#", "A#",
];
const DORIAN_KEYS: [&str; 15] = [
    "Db", "Ab", "Eb", "Bb", "F", "C", "G", "D", "A", "E", "B", "F#", "C#", "G#", "D#",
];
const PHRYGIAN_KEYS: [&str; 15] = [
    "Eb", "Bb", "F", "C", "G", "D", "A", "E", "B", "F#", "C#", "G#", "D#", "A#", "E#",
];
const LYDIAN_KEYS: [&str; 15] = [
    "Fb", "Cb", "Gb", "Db", "Ab", "Eb", "Bb", "F", "C", "G", "D", "A", "E", "B", "F#",
];
const MIXOLYDIAN_KEYS: [&str; 15] = [
    "Gb", "Db", "Ab", "Eb", "Bb", "F", "C", "G", "D", "A", "E", "B", "F#", "C#", "G#",
];
const LOCRIAN_KEYS: [&str; 15] = [
    "Bb", "F", "C", "G", "D", "A", "E", "B", "F#", "C#", "G#", "D#", "A#", "E#", "B#",
];

// Pitch classes in the order sharps and flats are added to a key signature.
const SHARPS: [i32; 7] = [5, 0, 7, 2, 9, 4, 11];
const FLATS: [i32; 7] = [11, 4, 9, 2, 7, 0, 5];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeySignature {
    sharps_flats: i8,
    mode: KeyMode,
}

impl KeySignature {
    pub const C_MAJOR: KeySignature = KeySignature {
        sharps_flats: 0,
        mode: KeyMode::Major,
    };

    pub fn new(sharps_flats: i32, mode: KeyMode) -> Result<Self> {
        if !(-7..=7).contains(&sharps_flats) {
            bail!("Key signatures can't have more than 7 sharps or flats");
        }
        Ok(Self {
            sharps_flats: sharps_flats as i8,
            mode,
        })
    }

    /// Positive for sharps, negative for flats.
    pub fn sharps_flats(&self) -> i32 {
        self.sharps_flats as i32
    }

    pub fn mode(&self) -> KeyMode {
        self.mode
    }

    pub fn is_minor(&self) -> bool {
        matches!(self.mode, KeyMode::Minor | KeyMode::Aeolian)
    }

    /// The accidental this key applies to a white-key pitch.
    pub fn default_accidental(&self, natural_id: i32) -> Accidental {
        let pc = natural_id.rem_euclid(12);
        let sf = self.sharps_flats();
        if sf > 0 && SHARPS[..sf as usize].contains(&pc) {
            return Accidental::Sharp;
        }
        if sf < 0 && FLATS[..(-sf) as usize].contains(&pc) {
            return Accidental::Flat;
        }
        Accidental::None
    }

    /// The accidental that must be written for `note` in this key, or `None`
    /// when the key already implies it.
    pub fn output_accidental(&self, note: Note) -> Accidental {
        let note = note.enharmonic(self.sharps_flats >= 0);
        let acc = Accidental::from_delta(note.id() - note.natural_id());
        if acc.delta() == self.default_accidental(note.natural_id()).delta() {
            return Accidental::None;
        }
        acc
    }

    pub fn transpose(&self, semitones: i32) -> Self {
        if semitones % 12 == 0 {
            return *self;
        }
        let mut x = (semitones * -5) % 12;
        if x > 6 {
            x -= 12;
        } else if x < -6 {
            x += 12;
        }
        Self {
            sharps_flats: x as i8,
            mode: self.mode,
        }
    }
}

impl Default for KeySignature {
    fn default() -> Self {
        Self::C_MAJOR
    }
}

impl fmt::Display for KeySignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tonic = self.mode.tonics()[(self.sharps_flats + 7) as usize];
        write!(f, "{} {}", tonic, self.mode.short_name().to_lowercase())
    }
}

impl FromStr for KeySignature {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let invalid = || anyhow!("Invalid key signature: {}", s);
        let mut chars = s.chars();
        let tonic_letter = chars.next().ok_or_else(invalid)?;
        let (tonic, suffix) = match chars.next() {
            Some(c @ ('b' | '#' | 's')) => {
                let acc = if c == 's' { '#' } else { c };
                (format!("{}{}", tonic_letter, acc), chars.as_str())
            }
            _ => (tonic_letter.to_string(), &s[tonic_letter.len_utf8()..]),
        };
        let mode = KeyMode::parse(suffix.trim()).ok_or_else(invalid)?;
        let index = mode
            .tonics()
            .iter()
            .position(|k| k.eq_ignore_ascii_case(&tonic))
            .ok_or_else(invalid)?;
        Self::new(index as i32 - 7, mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let key: KeySignature = "C".parse().unwrap();
        assert_eq!(key, KeySignature::C_MAJOR);

        let key: KeySignature = "Am".parse().unwrap();
        assert_eq!(key.sharps_flats(), 0);
        assert_eq!(key.mode(), KeyMode::Minor);

        let key: KeySignature = "F#".parse().unwrap();
        assert_eq!(key.sharps_flats(), 6);

        let key: KeySignature = "Bb major".parse().unwrap();
        assert_eq!(key.sharps_flats(), -2);

        let key: KeySignature = "D Dorian".parse().unwrap();
        assert_eq!(key.sharps_flats(), 0);
        assert_eq!(key.mode(), KeyMode::Dorian);

        let key: KeySignature = "Gsmin".parse().unwrap();
        assert_eq!(key.sharps_flats(), 5);

        assert!("".parse::<KeySignature>().is_err());
        assert!("H".parse::<KeySignature>().is_err());
        assert!("C blah".parse::<KeySignature>().is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(KeySignature::C_MAJOR.to_string(), "C maj");
        assert_eq!("Am".parse::<KeySignature>().unwrap().to_string(), "A min");
        assert_eq!("Eb".parse::<KeySignature>().unwrap().to_string(), "Eb maj");
    }

    #[test]
    fn test_default_accidental() {
        let g: KeySignature = "G".parse().unwrap();
        assert_eq!(g.default_accidental(65), Accidental::Sharp);
        assert_eq!(g.default_accidental(60), Accidental::None);

        let f: KeySignature = "F".parse().unwrap();
        assert_eq!(f.default_accidental(71), Accidental::Flat);
        assert_eq!(f.default_accidental(64), Accidental::None);
    }

    #[test]
    fn test_output_accidental() {
        let c = KeySignature::C_MAJOR;
        assert_eq!(c.output_accidental(Note::from_id(61).unwrap()), Accidental::Sharp);
        assert_eq!(c.output_accidental(Note::from_id(60).unwrap()), Accidental::None);

        let d: KeySignature = "D".parse().unwrap();
        // F#4 is implied by the key
        assert_eq!(d.output_accidental(Note::from_id(66).unwrap()), Accidental::None);
        // F4 needs a natural
        assert_eq!(d.output_accidental(Note::from_id(65).unwrap()), Accidental::Natural);

        let bb: KeySignature = "Bb".parse().unwrap();
        assert_eq!(bb.output_accidental(Note::from_id(70).unwrap()), Accidental::None);
        assert_eq!(bb.output_accidental(Note::from_id(61).unwrap()), Accidental::Flat);
    }

    #[test]
    fn test_transpose() {
        let c = KeySignature::C_MAJOR;
        assert_eq!(c.transpose(12), c);
        assert_eq!(c.transpose(2).sharps_flats(), 2);
        assert_eq!(c.transpose(-2).sharps_flats(), -2);
        assert_eq!(c.transpose(5).sharps_flats(), -1);
    }
}
