use anyhow::{Result, anyhow, bail};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// How a black-key pitch is spelled. White keys are always `Natural`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Spelling {
    Natural,
    Sharp,
    Flat,
}

/// Semitone offset of each natural letter above C, indexed from 'a'.
pub const LETTER_DELTA: [i32; 7] = [9, 11, 0, 2, 4, 5, 7];

const NATURAL_LETTERS: [Option<char>; 12] = [
    Some('C'),
    None,
    Some('D'),
    None,
    Some('E'),
    Some('F'),
    None,
    Some('G'),
    None,
    Some('A'),
    None,
    Some('B'),
];

/// A pitch identity. Equality, ordering and hashing use the pitch id only, so
/// `C#4 == Db4`.
#[derive(Clone, Copy)]
pub struct Note {
    id: i32,
    spelling: Spelling,
}

impl Note {
    pub const REST: Note = Note::natural(-1);
    pub const MIN: Note = Note::natural(0);
    pub const MAX: Note = Note::natural(127);

    pub const C2: Note = Note::natural(36);
    pub const B2: Note = Note::natural(47);
    pub const C3: Note = Note::natural(48);
    pub const C4: Note = Note::natural(60);
    pub const C5: Note = Note::natural(72);

    pub const MIN_PLAYABLE: Note = Note::C2;
    pub const MAX_PLAYABLE: Note = Note::C5;

    const fn natural(id: i32) -> Self {
        Self {
            id,
            spelling: Spelling::Natural,
        }
    }

    /// Looks up a pitch by id. Black keys come back spelled with a sharp.
    pub fn from_id(id: i32) -> Option<Self> {
        if id == -1 {
            return Some(Self::REST);
        }
        if !(Self::MIN.id..=Self::MAX.id).contains(&id) {
            return None;
        }
        let spelling = if NATURAL_LETTERS[id.rem_euclid(12) as usize].is_some() {
            Spelling::Natural
        } else {
            Spelling::Sharp
        };
        Some(Self { id, spelling })
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn is_rest(&self) -> bool {
        self.id == Self::REST.id
    }

    pub fn spelling(&self) -> Spelling {
        self.spelling
    }

    pub fn is_sharp(&self) -> bool {
        self.spelling == Spelling::Sharp
    }

    pub fn is_flat(&self) -> bool {
        self.spelling == Spelling::Flat
    }

    /// The white-key pitch this note is written on.
    pub fn natural_id(&self) -> i32 {
        match self.spelling {
            Spelling::Natural => self.id,
            Spelling::Sharp => self.id - 1,
            Spelling::Flat => self.id + 1,
        }
    }

    pub fn octave(&self) -> i32 {
        self.natural_id().div_euclid(12) - 1
    }

    /// Respells a black key with a sharp or a flat.
    pub fn enharmonic(&self, sharp: bool) -> Self {
        if self.spelling == Spelling::Natural {
            return *self;
        }
        Self {
            id: self.id,
            spelling: if sharp { Spelling::Sharp } else { Spelling::Flat },
        }
    }

    fn letter(&self) -> char {
        NATURAL_LETTERS[self.natural_id().rem_euclid(12) as usize].unwrap_or('C')
    }

    /// ABC spelling, e.g. `C,` `^F` `c'` or `z` for a rest.
    pub fn abc(&self) -> String {
        if self.is_rest() {
            return "z".to_string();
        }
        let mut out = String::new();
        match self.spelling {
            Spelling::Sharp => out.push('^'),
            Spelling::Flat => out.push('_'),
            Spelling::Natural => {}
        }
        let octave = self.octave();
        if octave <= 3 {
            out.push(self.letter());
            for _ in octave..3 {
                out.push(',');
            }
        } else {
            out.push(self.letter().to_ascii_lowercase());
            for _ in 4..octave {
                out.push('\'');
            }
        }
        out
    }
}

impl PartialEq for Note {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Note {}

impl Hash for Note {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for Note {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Note {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_rest() {
            return f.pad("Rest");
        }
        let accidental = match self.spelling {
            Spelling::Natural => "",
            Spelling::Sharp => "#",
            Spelling::Flat => "b",
        };
        f.pad(&format!("{}{}{}", self.letter(), accidental, self.octave()))
    }
}

impl fmt::Debug for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Note({})", self)
    }
}

impl FromStr for Note {
    type Err = anyhow::Error;

    /// Parses names like `C4`, `C#4`, `Cs4`, `Db4`, `B-1` or `Rest`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("rest") || s == "z" {
            return Ok(Self::REST);
        }
        let mut chars = s.chars();
        let letter = chars
            .next()
            .map(|c| c.to_ascii_uppercase())
            .ok_or_else(|| anyhow!("Empty note name"))?;
        let pc = NATURAL_LETTERS
            .iter()
            .position(|l| *l == Some(letter))
            .ok_or_else(|| anyhow!("Invalid note name: {}", s))? as i32;
        let rest = chars.as_str();
        let (spelling, octave_str) = match rest.chars().next() {
            Some('#') | Some('s') => (Spelling::Sharp, &rest[1..]),
            Some('b') => (Spelling::Flat, &rest[1..]),
            _ => (Spelling::Natural, rest),
        };
        let octave: i32 = octave_str
            .parse()
            .map_err(|_| anyhow!("Invalid octave in note name: {}", s))?;
        let delta = match spelling {
            Spelling::Natural => 0,
            Spelling::Sharp => 1,
            Spelling::Flat => -1,
        };
        let id = (octave + 1) * 12 + pc + delta;
        if !(Self::MIN.id..=Self::MAX.id).contains(&id) {
            bail!("Note out of range: {}", s);
        }
        let spelling = if NATURAL_LETTERS[id.rem_euclid(12) as usize].is_some() {
            Spelling::Natural
        } else {
            spelling
        };
        Ok(Self { id, spelling })
    }
}
