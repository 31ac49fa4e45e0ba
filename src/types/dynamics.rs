use anyhow::{Result, anyhow};
use std::fmt;
use std::str::FromStr;

/// ABC `+dynamics+` levels, quietest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Dynamics {
    Pppp,
    Ppp,
    Pp,
    P,
    Mp,
    Mf,
    F,
    Ff,
    Fff,
    Ffff,
}

const ALL: [Dynamics; 10] = [
    Dynamics::Pppp,
    Dynamics::Ppp,
    Dynamics::Pp,
    Dynamics::P,
    Dynamics::Mp,
    Dynamics::Mf,
    Dynamics::F,
    Dynamics::Ff,
    Dynamics::Fff,
    Dynamics::Ffff,
];

const MAX_VOLUME: i32 = 127;

impl Dynamics {
    pub const DEFAULT: Dynamics = Dynamics::Mf;
    pub const MINIMUM: Dynamics = Dynamics::Pppp;
    pub const MAXIMUM: Dynamics = Dynamics::Ffff;

    pub fn all() -> &'static [Dynamics] {
        &ALL
    }

    pub fn name(&self) -> &'static str {
        match self {
            Dynamics::Pppp => "pppp",
            Dynamics::Ppp => "ppp",
            Dynamics::Pp => "pp",
            Dynamics::P => "p",
            Dynamics::Mp => "mp",
            Dynamics::Mf => "mf",
            Dynamics::F => "f",
            Dynamics::Ff => "ff",
            Dynamics::Fff => "fff",
            Dynamics::Ffff => "ffff",
        }
    }

    /// MIDI velocity used when the song is rendered with General MIDI voices.
    pub fn midi_vol(&self) -> i32 {
        match self {
            Dynamics::Pppp => 4,
            Dynamics::Ppp => 16,
            Dynamics::Pp => 32,
            Dynamics::P => 48,
            Dynamics::Mp => 64,
            Dynamics::Mf => 80,
            Dynamics::F => 96,
            Dynamics::Ff => 112,
            Dynamics::Fff => 127,
            Dynamics::Ffff => 144,
        }
    }

    /// Velocity matching the in-game loudness of each level.
    pub fn native_vol(&self) -> i32 {
        match self {
            Dynamics::Pppp => 57,
            Dynamics::Ppp => 61,
            Dynamics::Pp => 75,
            Dynamics::P => 87,
            Dynamics::Mp => 97,
            Dynamics::Mf => 106,
            Dynamics::F => 115,
            Dynamics::Ff => 123,
            Dynamics::Fff => 127,
            Dynamics::Ffff => 127,
        }
    }

    pub fn volume(&self, native: bool) -> u8 {
        let vol = if native {
            self.native_vol()
        } else {
            self.midi_vol()
        };
        vol.clamp(0, MAX_VOLUME) as u8
    }

    /// Nearest level to a MIDI velocity. Levels are scanned loudest-ward and
    /// the scan stops as soon as the distance starts growing.
    pub fn from_midi_velocity(velocity: i32) -> Self {
        let mut best = ALL[0];
        let mut delta_best = (velocity - best.midi_vol()).abs();
        for dynamics in ALL.iter().skip(1) {
            let delta = (velocity - dynamics.midi_vol()).abs();
            if delta < delta_best {
                best = *dynamics;
                delta_best = delta;
            } else {
                break;
            }
        }
        best
    }
}

impl Default for Dynamics {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for Dynamics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dynamics {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        ALL.iter()
            .find(|d| d.name() == s)
            .copied()
            .ok_or_else(|| anyhow!("Unsupported dynamics: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_midi_velocity() {
        assert_eq!(Dynamics::from_midi_velocity(0), Dynamics::Pppp);
        assert_eq!(Dynamics::from_midi_velocity(80), Dynamics::Mf);
        assert_eq!(Dynamics::from_midi_velocity(85), Dynamics::Mf);
        assert_eq!(Dynamics::from_midi_velocity(89), Dynamics::F);
        assert_eq!(Dynamics::from_midi_velocity(127), Dynamics::Fff);
        assert_eq!(Dynamics::from_midi_velocity(200), Dynamics::Ffff);
    }

    #[test]
    fn test_volume() {
        assert_eq!(Dynamics::Ffff.volume(false), 127);
        assert_eq!(Dynamics::Mf.volume(false), 80);
        assert_eq!(Dynamics::Mf.volume(true), 106);
    }

    #[test]
    fn test_parse() {
        assert_eq!("ff".parse::<Dynamics>().unwrap(), Dynamics::Ff);
        assert_eq!("pppp".parse::<Dynamics>().unwrap(), Dynamics::Pppp);
        assert!("FF".parse::<Dynamics>().is_err());
        assert!("fermata".parse::<Dynamics>().is_err());
    }
}
