use crate::types::accidental::Accidental;
use anyhow::{Result, anyhow, bail};
use std::fmt;

/// A note or rest as written: `^c'2/3>-`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteToken {
    pub start: usize,
    pub end: usize,
    pub accidental: Option<(Accidental, usize)>,
    pub letter: char,
    /// Apostrophes count up, commas count down.
    pub octave_marks: i32,
    pub octave_column: Option<usize>,
    pub numerator: u32,
    pub denominator: u32,
    pub broken_rhythm: Option<BrokenRhythm>,
    pub tie: bool,
}

impl NoteToken {
    pub fn is_rest(&self) -> bool {
        matches!(self.letter, 'z' | 'x')
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokenRhythm {
    /// `>` lengthens this note, `<` the next one.
    pub first_longer: bool,
    pub count: u32,
    pub column: usize,
}

impl BrokenRhythm {
    pub fn factor(&self) -> u32 {
        1 << self.count
    }
}

impl fmt::Display for BrokenRhythm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = if self.first_longer { '>' } else { '<' };
        for _ in 0..self.count {
            write!(f, "{}", marker)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Whitespace,
    ChordStart,
    ChordEnd,
    BarLine,
    /// Text between a pair of `+`.
    Decoration(String),
    /// The `p:q:r` text after a `(`.
    Tuplet(String),
    SlurStart,
    SlurEnd,
    Note(NoteToken),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spanned {
    pub column: usize,
    pub token: Token,
}

/// An error at a character column of the line being scanned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanError {
    pub column: usize,
    pub message: String,
}

impl ScanError {
    fn new(column: usize, message: impl Into<String>) -> Self {
        Self {
            column,
            message: message.into(),
        }
    }
}

/// Splits a line of ABC music into tokens. Backslashes are skipped.
pub struct Scanner {
    chars: Vec<char>,
    pos: usize,
}

impl Scanner {
    pub fn new(line: &str) -> Self {
        Self {
            chars: line.chars().collect(),
            pos: 0,
        }
    }

    /// Current column, or the line length once everything has been read.
    pub fn position(&self) -> usize {
        self.pos
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let start = self.pos;
        while self.peek().is_some_and(&pred) {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }

    fn take_run(&mut self, c: char, max: usize) -> usize {
        let mut count = 0;
        while count < max && self.peek() == Some(c) {
            self.pos += 1;
            count += 1;
        }
        count
    }

    pub fn next_token(&mut self) -> Result<Option<Spanned>, ScanError> {
        loop {
            let Some(ch) = self.peek() else {
                return Ok(None);
            };
            let column = self.pos;

            if is_note_start(ch, self.peek_at(1), self.peek_at(2)) {
                let note = self.scan_note()?;
                return Ok(Some(Spanned {
                    column,
                    token: Token::Note(note),
                }));
            }

            self.pos += 1;
            let token = match ch {
                c if c.is_whitespace() => Token::Whitespace,
                '[' => Token::ChordStart,
                ']' => Token::ChordEnd,
                '|' => {
                    if self.peek() == Some(']') {
                        self.pos += 1;
                    }
                    Token::BarLine
                }
                '+' => {
                    let rest = &self.chars[self.pos..];
                    let Some(len) = rest.iter().position(|&c| c == '+') else {
                        return Err(ScanError::new(column, "There is no matching '+'"));
                    };
                    let text: String = rest[..len].iter().collect();
                    self.pos += len + 1;
                    Token::Decoration(text)
                }
                '(' if self.peek().is_some_and(|c| c.is_ascii_digit()) => {
                    Token::Tuplet(self.take_while(|c| c.is_ascii_digit() || c == ':'))
                }
                '(' => Token::SlurStart,
                ')' => Token::SlurEnd,
                '\\' => continue,
                other => {
                    return Err(ScanError::new(
                        column,
                        format!("Unknown/unexpected character '{}'", other),
                    ));
                }
            };
            return Ok(Some(Spanned { column, token }));
        }
    }

    fn scan_note(&mut self) -> Result<NoteToken, ScanError> {
        let start = self.pos;

        let accidental = match self.peek() {
            Some(c @ ('_' | '^')) => {
                let count = self.take_run(c, 2);
                let text: String = std::iter::repeat_n(c, count).collect();
                Accidental::from_abc(&text).map(|a| (a, start))
            }
            Some('=') => {
                self.pos += 1;
                Some((Accidental::Natural, start))
            }
            _ => None,
        };

        let letter = self
            .peek()
            .ok_or_else(|| ScanError::new(self.pos, "Expected a note"))?;
        self.pos += 1;

        let octave_column = match self.peek() {
            Some('\'') | Some(',') => Some(self.pos),
            _ => None,
        };
        let octave_marks = match self.peek() {
            Some('\'') => self.take_run('\'', 5) as i32,
            Some(',') => -(self.take_run(',', 5) as i32),
            _ => 0,
        };

        let length_column = self.pos;
        let numerator_text = self.take_while(|c| c.is_ascii_digit());
        let slash_text = self.take_while(|c| c == '/');
        let denominator_text = if slash_text.is_empty() {
            String::new()
        } else {
            self.take_while(|c| c.is_ascii_digit())
        };
        let (numerator, denominator) =
            parse_length(&numerator_text, &slash_text, &denominator_text)
                .map_err(|e| ScanError::new(length_column, e.to_string()))?;

        let broken_rhythm = match self.peek() {
            Some(c @ ('>' | '<')) => {
                let column = self.pos;
                let count = self.take_run(c, 3) as u32;
                Some(BrokenRhythm {
                    first_longer: c == '>',
                    count,
                    column,
                })
            }
            _ => None,
        };

        let tie = self.peek() == Some('-');
        if tie {
            self.pos += 1;
        }

        Ok(NoteToken {
            start,
            end: self.pos,
            accidental,
            letter,
            octave_marks,
            octave_column,
            numerator,
            denominator,
            broken_rhythm,
            tie,
        })
    }
}

fn is_note_letter(c: char) -> bool {
    matches!(c, 'A'..='G' | 'a'..='g' | 'x' | 'z')
}

/// An accidental only starts a note when a letter follows it.
fn is_note_start(c: char, next: Option<char>, after: Option<char>) -> bool {
    match c {
        c if is_note_letter(c) => true,
        '=' => next.is_some_and(is_note_letter),
        '_' | '^' => {
            next.is_some_and(is_note_letter)
                || (next == Some(c) && after.is_some_and(is_note_letter))
        }
        _ => false,
    }
}

fn parse_length(numerator: &str, slashes: &str, denominator: &str) -> Result<(u32, u32)> {
    let invalid = || anyhow!("Invalid note length");
    let numerator = if numerator.is_empty() {
        1
    } else {
        numerator.parse::<u32>().map_err(|_| invalid())?
    };
    let denominator = match (slashes, denominator) {
        ("", _) => 1,
        ("/", "") => 2,
        ("//", "") => 4,
        ("/", digits) => digits.parse::<u32>().map_err(|_| invalid())?,
        _ => return Err(invalid()),
    };
    if numerator == 0 || denominator == 0 {
        bail!("Invalid note length");
    }
    Ok((numerator, denominator))
}

/// `(p:q:r`: put p notes into the time of q for the next r notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tuplet {
    pub p: u32,
    pub q: u32,
    pub r: u32,
}

impl Tuplet {
    pub fn parse(text: &str, compound_meter: bool) -> Result<Self> {
        let parts: Vec<&str> = text.split(':').collect();
        if parts.is_empty() || parts.len() > 3 {
            bail!("Invalid tuplet");
        }
        let number = |s: &str| -> Result<Option<u32>> {
            if s.is_empty() {
                Ok(None)
            } else {
                Ok(Some(s.parse::<u32>()?))
            }
        };

        let p = number(parts[0])?.ok_or_else(|| anyhow!("Invalid tuplet"))?;
        if !(2..=9).contains(&p) {
            bail!("Invalid tuplet");
        }
        let q = match parts.get(1).map(|s| number(*s)).transpose()?.flatten() {
            Some(q) => q,
            None => match p {
                3 | 6 => 2,
                2 | 4 | 8 => 3,
                _ if compound_meter => 3,
                _ => 2,
            },
        };
        let r = parts
            .get(2)
            .map(|s| number(*s))
            .transpose()?
            .flatten()
            .unwrap_or(p);
        if q == 0 || r == 0 {
            bail!("Invalid tuplet");
        }
        Ok(Self { p, q, r })
    }
}
