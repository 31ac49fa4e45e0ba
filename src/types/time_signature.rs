use anyhow::{Result, anyhow, bail};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeSignature {
    numerator: u8,
    denominator: u8,
}

impl TimeSignature {
    pub const MAX_DENOMINATOR: u32 = 8;

    pub const FOUR_FOUR: TimeSignature = TimeSignature {
        numerator: 4,
        denominator: 4,
    };

    pub fn new(numerator: u32, denominator: u32) -> Result<Self> {
        if denominator == 0 || !denominator.is_power_of_two() {
            bail!("The denominator of the time signature must be a power of 2");
        }
        if denominator > Self::MAX_DENOMINATOR {
            bail!(
                "The denominator must be less than or equal to {}",
                Self::MAX_DENOMINATOR
            );
        }
        if numerator == 0 || numerator > 255 {
            bail!("The numerator of the time signature must be between 1 and 255");
        }
        Ok(Self {
            numerator: numerator as u8,
            denominator: denominator as u8,
        })
    }

    pub fn numerator(&self) -> u32 {
        self.numerator as u32
    }

    pub fn denominator(&self) -> u32 {
        self.denominator as u32
    }

    /// Best guess at compound meter: the numerator is a multiple of three.
    pub fn is_compound(&self) -> bool {
        self.numerator % 3 == 0
    }

    /// Log2 of the denominator, as stored in a MIDI time signature event.
    pub fn denominator_log2(&self) -> u8 {
        self.denominator.trailing_zeros() as u8
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::FOUR_FOUR
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&format!("{}/{}", self.numerator, self.denominator))
    }
}

impl FromStr for TimeSignature {
    type Err = anyhow::Error;

    /// Accepts `C`, `C|` and `n/d` (also separated by `:`, `|` or a space).
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        match s {
            "C" => return Self::new(4, 4),
            "C|" => return Self::new(2, 2),
            _ => {}
        }
        let invalid = || {
            anyhow!(
                "The string: \"{}\" is not a valid time signature (expected format: 4/4)",
                s
            )
        };
        let parts: Vec<&str> = s.split(['/', ':', '|', ' ']).collect();
        if parts.len() != 2 {
            return Err(invalid());
        }
        let numerator: u32 = parts[0].parse().map_err(|_| invalid())?;
        let denominator: u32 = parts[1].parse().map_err(|_| invalid())?;
        Self::new(numerator, denominator)
    }
}
