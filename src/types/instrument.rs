use crate::types::note::Note;
use anyhow::{Result, anyhow};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// The game's instrument voices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Instrument {
    BasicLute,
    LuteOfAges,
    Harp,
    MistyMountainHarp,
    BasicFiddle,
    LonelyMountainFiddle,
    SprightlyFiddle,
    StudentFiddle,
    Theorbo,
    Flute,
    Clarinet,
    Horn,
    Bagpipe,
    Pibgorn,
    Drums,
    Cowbell,
    MoorCowbell,
}

struct InstrumentSpec {
    name: &'static str,
    sustainable: bool,
    program: u8,
    octave_delta: i32,
    percussion: bool,
}

const fn spec(
    name: &'static str,
    sustainable: bool,
    program: u8,
    octave_delta: i32,
    percussion: bool,
) -> InstrumentSpec {
    InstrumentSpec {
        name,
        sustainable,
        program,
        octave_delta,
        percussion,
    }
}

const ALL: [Instrument; 17] = [
    Instrument::BasicLute,
    Instrument::LuteOfAges,
    Instrument::Harp,
    Instrument::MistyMountainHarp,
    Instrument::BasicFiddle,
    Instrument::LonelyMountainFiddle,
    Instrument::SprightlyFiddle,
    Instrument::StudentFiddle,
    Instrument::Theorbo,
    Instrument::Flute,
    Instrument::Clarinet,
    Instrument::Horn,
    Instrument::Bagpipe,
    Instrument::Pibgorn,
    Instrument::Drums,
    Instrument::Cowbell,
    Instrument::MoorCowbell,
];

// Names that don't match an instrument's display name but are common in titles.
const NICKNAMES: [(&str, Instrument); 13] = [
    ("lute", Instrument::BasicLute),
    ("banjo", Instrument::BasicLute),
    ("guitar", Instrument::BasicLute),
    ("fiddle", Instrument::BasicFiddle),
    ("violin", Instrument::BasicFiddle),
    ("drum", Instrument::Drums),
    ("bass", Instrument::Theorbo),
    ("theo", Instrument::Theorbo),
    ("bagpipes", Instrument::Bagpipe),
    ("mm harp", Instrument::MistyMountainHarp),
    ("more cowbell", Instrument::MoorCowbell),
    ("students fiddle", Instrument::StudentFiddle),
    ("student's fiddle", Instrument::StudentFiddle),
];

/// Lowercase with spaces, underscores, dashes and apostrophes removed.
fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| !matches!(c, ' ' | '\t' | '_' | '-' | '\''))
        .flat_map(|c| c.to_lowercase())
        .collect()
}

struct NameMatcher {
    regex: Regex,
    by_name: HashMap<String, Instrument>,
}

static NAME_MATCHER: Lazy<NameMatcher> = Lazy::new(|| {
    let mut names: Vec<(&str, Instrument)> = ALL.iter().map(|i| (i.name(), *i)).collect();
    names.extend(NICKNAMES.iter().copied());
    // The regex engine prefers earlier alternatives, so "lute of ages" must come before "lute"
    names.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then(a.0.cmp(b.0)));

    let alternatives: Vec<String> = names
        .iter()
        .map(|(name, _)| {
            name.split(' ')
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(r"[\s_]*")
        })
        .collect();
    let pattern = format!(r"(?i)\b({})\b", alternatives.join("|"));
    let regex = Regex::new(&pattern).expect("instrument names form a valid pattern");

    let by_name = names
        .iter()
        .map(|(name, instrument)| (normalize(name), *instrument))
        .collect();
    NameMatcher { regex, by_name }
});

impl Instrument {
    pub const DEFAULT: Instrument = Instrument::BasicLute;

    pub fn all() -> &'static [Instrument] {
        &ALL
    }

    fn spec(&self) -> InstrumentSpec {
        match self {
            Instrument::BasicLute => spec("Basic Lute", false, 25, 0, false),
            Instrument::LuteOfAges => spec("Lute of Ages", false, 24, 0, false),
            Instrument::Harp => spec("Harp", false, 46, 0, false),
            Instrument::MistyMountainHarp => spec("Misty Mountain Harp", false, 27, 0, false),
            Instrument::BasicFiddle => spec("Basic Fiddle", true, 40, 1, false),
            Instrument::LonelyMountainFiddle => {
                spec("Lonely Mountain Fiddle", true, 41, 1, false)
            }
            Instrument::SprightlyFiddle => spec("Sprightly Fiddle", false, 110, 1, false),
            Instrument::StudentFiddle => spec("Student Fiddle", true, 40, 1, false),
            Instrument::Theorbo => spec("Theorbo", false, 32, -1, false),
            Instrument::Flute => spec("Flute", true, 73, 2, false),
            Instrument::Clarinet => spec("Clarinet", true, 71, 1, false),
            Instrument::Horn => spec("Horn", true, 69, 0, false),
            Instrument::Bagpipe => spec("Bagpipe", true, 109, 1, false),
            Instrument::Pibgorn => spec("Pibgorn", true, 84, 2, false),
            Instrument::Drums => spec("Drums", false, 118, 0, true),
            Instrument::Cowbell => spec("Cowbell", false, 115, 0, true),
            Instrument::MoorCowbell => spec("Moor Cowbell", false, 114, 0, true),
        }
    }

    pub fn name(&self) -> &'static str {
        self.spec().name
    }

    /// Whether a held note keeps sounding. Non-sustaining voices ring out
    /// for a fixed time no matter how long the note is written.
    pub fn sustainable(&self) -> bool {
        self.spec().sustainable
    }

    pub fn program(&self) -> u8 {
        self.spec().program
    }

    /// Octaves the game voice sounds above (or below) the General MIDI voice.
    pub fn octave_delta(&self) -> i32 {
        self.spec().octave_delta
    }

    pub fn is_percussion(&self) -> bool {
        self.spec().percussion
    }

    /// Cowbells get a random pitch for every struck note.
    pub fn is_random_pitch(&self) -> bool {
        matches!(self, Instrument::Cowbell | Instrument::MoorCowbell)
    }

    pub fn lowest_playable(&self) -> Note {
        Note::MIN_PLAYABLE
    }

    pub fn highest_playable(&self) -> Note {
        Note::MAX_PLAYABLE
    }

    pub fn is_playable(&self, note_id: i32) -> bool {
        note_id >= self.lowest_playable().id() && note_id <= self.highest_playable().id()
    }

    pub fn is_sustainable(&self, note_id: i32) -> bool {
        self.sustainable() && self.is_playable(note_id)
    }

    /// Finds an instrument mentioned in free text such as a part title.
    /// Matches whole words only, case-insensitively.
    pub fn find_in_name(text: &str) -> Option<Instrument> {
        let matcher = &*NAME_MATCHER;
        let found = matcher.regex.captures(text)?.get(1)?;
        matcher.by_name.get(&normalize(found.as_str())).copied()
    }
}

impl Default for Instrument {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

impl FromStr for Instrument {
    type Err = anyhow::Error;

    /// Accepts display names in any case, snake/kebab case and nicknames.
    fn from_str(s: &str) -> Result<Self> {
        let key = normalize(s);
        ALL.iter()
            .copied()
            .find(|i| normalize(i.name()) == key)
            .or_else(|| {
                NICKNAMES
                    .iter()
                    .find(|(nick, _)| normalize(nick) == key)
                    .map(|(_, i)| *i)
            })
            .ok_or_else(|| anyhow!("Unknown instrument: {}", s))
    }
}
