use crate::types::instrument::Instrument;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

pub const CENTER: u8 = 64;

static LEFT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bleft\b").expect("valid pattern"));
static RIGHT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bright\b").expect("valid pattern"));
static MIDDLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(middle|center)\b").expect("valid pattern"));

/// Spreads parts across the stereo field. Successive parts of the same
/// instrument family alternate between one side, the other side and the center.
#[derive(Debug, Default, Clone)]
pub struct PanGenerator {
    count: HashMap<Instrument, u32>,
}

impl PanGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.count.clear();
    }

    /// Pan for the next part of `instrument`. The words "left", "right",
    /// "middle" and "center" in the title force a side.
    pub fn get(&mut self, instrument: Instrument, title: &str) -> u8 {
        let pan = self.get_for_instrument(instrument);
        let title = title.to_lowercase();
        let offset = (pan as i32 - CENTER as i32).abs();
        if LEFT.is_match(&title) {
            (CENTER as i32 - offset) as u8
        } else if RIGHT.is_match(&title) {
            (CENTER as i32 + offset) as u8
        } else if MIDDLE.is_match(&title) {
            CENTER
        } else {
            pan
        }
    }

    pub fn get_for_instrument(&mut self, instrument: Instrument) -> u8 {
        let family = match instrument {
            Instrument::BasicLute => Instrument::LuteOfAges,
            Instrument::SprightlyFiddle | Instrument::MistyMountainHarp => Instrument::Harp,
            Instrument::MoorCowbell => Instrument::Cowbell,
            Instrument::StudentFiddle | Instrument::LonelyMountainFiddle => Instrument::BasicFiddle,
            other => other,
        };

        let count = self.count.entry(family).or_insert(0);
        let sign = match *count % 3 {
            0 => 1,
            1 => -1,
            _ => 0,
        };
        *count += 1;

        let spread = match family {
            Instrument::BasicFiddle => -50,
            Instrument::Harp => -45,
            Instrument::Flute => -40,
            Instrument::Bagpipe => -30,
            Instrument::Theorbo => -25,
            Instrument::Cowbell => -15,
            Instrument::Drums => 15,
            Instrument::Pibgorn => 20,
            Instrument::Horn => 25,
            Instrument::LuteOfAges => 35,
            Instrument::Clarinet => 45,
            _ => 0,
        };
        (CENTER as i32 + sign * spread) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alternates_within_family() {
        let mut pan = PanGenerator::new();
        assert_eq!(pan.get(Instrument::LuteOfAges, "Lute"), 99);
        assert_eq!(pan.get(Instrument::BasicLute, "Lute 2"), 29);
        assert_eq!(pan.get(Instrument::LuteOfAges, "Lute 3"), CENTER);
        assert_eq!(pan.get(Instrument::LuteOfAges, "Lute 4"), 99);
        // a different family has its own counter
        assert_eq!(pan.get(Instrument::BasicFiddle, "Fiddle"), 14);
    }

    #[test]
    fn test_title_forces_side() {
        let mut pan = PanGenerator::new();
        assert_eq!(pan.get(Instrument::Clarinet, "Clarinet (Left)"), 19);
        assert_eq!(pan.get(Instrument::Flute, "Flute right"), 104);
        assert_eq!(pan.get(Instrument::Horn, "Horn - center"), CENTER);
        assert_eq!(pan.get(Instrument::Horn, "Leftover horn"), 39);
    }
}
