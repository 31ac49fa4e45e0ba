use crate::types::dynamics::Dynamics;
use crate::types::instrument::Instrument;
use crate::types::key_signature::KeySignature;
use crate::types::time_signature::TimeSignature;
use anyhow::{Result, anyhow, bail};
use std::collections::BTreeMap;

/// Ticks in one unit note length. Lots of small prime factors so tuplets
/// divide evenly.
pub const UNIT_NOTE_TICKS: u64 = (2 * 2 * 2 * 2 * 2 * 2) * (3 * 3) * 5;

pub const MIN_BPM: u32 = 1;
pub const MAX_BPM: u32 = 10_000;

/// Header state of the part currently being read.
#[derive(Debug, Clone)]
pub struct TuneInfo {
    part_number: u32,
    title: String,
    title_is_from_extended_info: bool,
    key: KeySignature,
    meter: TimeSignature,
    note_divisor: u32,
    explicit_note_divisor: bool,
    primary_tempo_bpm: u32,
    cur_part_tempo: BTreeMap<u64, u32>,
    all_parts_tempo: BTreeMap<u64, u32>,
    instrument: Option<Instrument>,
    dynamics: Dynamics,
}

impl Default for TuneInfo {
    fn default() -> Self {
        Self {
            part_number: 0,
            title: String::new(),
            title_is_from_extended_info: false,
            key: KeySignature::C_MAJOR,
            meter: TimeSignature::FOUR_FOUR,
            note_divisor: 8,
            explicit_note_divisor: false,
            primary_tempo_bpm: 120,
            cur_part_tempo: BTreeMap::new(),
            all_parts_tempo: BTreeMap::new(),
            instrument: None,
            dynamics: Dynamics::DEFAULT,
        }
    }
}

/// `bpm` or `1/4=bpm`. The note length is ignored, as the game does.
pub fn parse_tempo(s: &str) -> Result<u32> {
    let parts: Vec<&str> = s.split('=').collect();
    let bpm_text = match parts.as_slice() {
        [bpm] | [_, bpm] => bpm.trim(),
        _ => bail!("Unable to read tempo"),
    };
    let bpm: i64 = bpm_text
        .parse()
        .map_err(|_| anyhow!("Unable to read tempo"))?;
    if bpm < MIN_BPM as i64 || bpm > MAX_BPM as i64 {
        bail!(
            "Tempo \"{}\" is out of range (expected {}-{})",
            bpm,
            MIN_BPM,
            MAX_BPM
        );
    }
    Ok(bpm as u32)
}

/// `1/N`, the unit note length.
pub fn parse_note_divisor(s: &str) -> Result<u32> {
    let invalid = || {
        anyhow!(
            "\"{}\" is not a valid note length (example of valid note length: 1/4)",
            s
        )
    };
    let parts: Vec<&str> = s.trim().split(['/', ':', '|', ' ']).collect();
    let [numerator, denominator] = parts.as_slice() else {
        return Err(invalid());
    };
    let numerator: i64 = numerator.parse().map_err(|_| invalid())?;
    let denominator: i64 = denominator.parse().map_err(|_| invalid())?;
    if numerator != 1 {
        bail!("The numerator of the note length must be 1 (example of valid note length: 1/4)");
    }
    if denominator < 1 {
        bail!(
            "The denominator of the note length must be positive (example of valid note length: 1/4)"
        );
    }
    u32::try_from(denominator).map_err(|_| invalid())
}

impl TuneInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_part(&mut self, part_number: u32) {
        self.part_number = part_number;
        self.instrument = None;
        self.dynamics = Dynamics::DEFAULT;
        self.title.clear();
        self.title_is_from_extended_info = false;
        self.explicit_note_divisor = false;
        self.cur_part_tempo.clear();
    }

    pub fn part_number(&self) -> u32 {
        self.part_number
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// A `%%part-name` title is kept over later `T:` lines.
    pub fn set_title(&mut self, title: &str, from_extended_info: bool) {
        if from_extended_info || !self.title_is_from_extended_info {
            self.title = title.to_string();
            self.title_is_from_extended_info = from_extended_info;
        }
    }

    pub fn key(&self) -> KeySignature {
        self.key
    }

    pub fn set_key(&mut self, value: &str) -> Result<()> {
        self.key = value.parse()?;
        Ok(())
    }

    pub fn meter(&self) -> TimeSignature {
        self.meter
    }

    pub fn set_meter(&mut self, value: &str) -> Result<()> {
        self.meter = value.parse()?;
        if !self.explicit_note_divisor {
            let meter = self.meter;
            self.note_divisor = if 4 * meter.numerator() / meter.denominator() < 3 {
                16
            } else {
                8
            };
        }
        Ok(())
    }

    pub fn set_note_divisor(&mut self, value: &str) -> Result<()> {
        self.note_divisor = parse_note_divisor(value)?;
        self.explicit_note_divisor = true;
        Ok(())
    }

    pub fn is_compound_meter(&self) -> bool {
        self.meter.is_compound()
    }

    /// Ticks per quarter note implied by the unit note length.
    pub fn ppqn(&self) -> u64 {
        self.note_divisor as u64 * UNIT_NOTE_TICKS / self.meter.denominator() as u64
    }

    pub fn primary_tempo_bpm(&self) -> u32 {
        self.primary_tempo_bpm
    }

    pub fn set_primary_tempo(&mut self, value: &str) -> Result<()> {
        self.primary_tempo_bpm = parse_tempo(value)?;
        self.all_parts_tempo
            .entry(0)
            .or_insert(self.primary_tempo_bpm);
        self.cur_part_tempo
            .entry(0)
            .or_insert(self.primary_tempo_bpm);
        Ok(())
    }

    pub fn add_tempo_event(&mut self, tick: u64, value: &str) -> Result<()> {
        let bpm = parse_tempo(value)?;
        self.all_parts_tempo.insert(tick, bpm);
        self.cur_part_tempo.insert(tick, bpm);
        Ok(())
    }

    /// Tempo of the current part at `tick`.
    pub fn current_tempo_bpm(&self, tick: u64) -> u32 {
        self.cur_part_tempo
            .range(..=tick)
            .next_back()
            .map(|(_, bpm)| *bpm)
            .unwrap_or(self.primary_tempo_bpm)
    }

    pub fn all_parts_tempo(&self) -> &BTreeMap<u64, u32> {
        &self.all_parts_tempo
    }

    pub fn instrument(&self) -> Instrument {
        self.instrument.unwrap_or(Instrument::DEFAULT)
    }

    pub fn is_instrument_set(&self) -> bool {
        self.instrument.is_some()
    }

    pub fn set_instrument(&mut self, instrument: Instrument) {
        self.instrument = Some(instrument);
    }

    pub fn dynamics(&self) -> Dynamics {
        self.dynamics
    }

    pub fn set_dynamics(&mut self, value: &str) -> Result<()> {
        self.dynamics = value.parse()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tempo() {
        assert_eq!(parse_tempo("120").unwrap(), 120);
        assert_eq!(parse_tempo("1/4=90").unwrap(), 90);
        assert_eq!(
            parse_tempo("abc").unwrap_err().to_string(),
            "Unable to read tempo"
        );
        assert_eq!(
            parse_tempo("0").unwrap_err().to_string(),
            "Tempo \"0\" is out of range (expected 1-10000)"
        );
        assert!(parse_tempo("1=2=3").is_err());
    }

    #[test]
    fn test_note_divisor() {
        assert_eq!(parse_note_divisor("1/4").unwrap(), 4);
        assert_eq!(
            parse_note_divisor("2/4").unwrap_err().to_string(),
            "The numerator of the note length must be 1 (example of valid note length: 1/4)"
        );
        assert_eq!(
            parse_note_divisor("1/0").unwrap_err().to_string(),
            "The denominator of the note length must be positive (example of valid note length: 1/4)"
        );
        assert_eq!(
            parse_note_divisor("quarter").unwrap_err().to_string(),
            "\"quarter\" is not a valid note length (example of valid note length: 1/4)"
        );
    }

    #[test]
    fn test_ppqn() {
        let mut info = TuneInfo::new();
        assert_eq!(info.ppqn(), 8 * UNIT_NOTE_TICKS / 4);

        info.set_meter("2/4").unwrap();
        assert_eq!(info.ppqn(), 16 * UNIT_NOTE_TICKS / 4);

        info.set_note_divisor("1/4").unwrap();
        assert_eq!(info.ppqn(), UNIT_NOTE_TICKS);

        // an explicit unit length survives a later meter
        info.set_meter("6/8").unwrap();
        assert_eq!(info.ppqn(), 4 * UNIT_NOTE_TICKS / 8);
        assert!(info.is_compound_meter());

        info.new_part(2);
        info.set_meter("3/4").unwrap();
        assert_eq!(info.ppqn(), 8 * UNIT_NOTE_TICKS / 4);
    }

    #[test]
    fn test_tempo_map() {
        let mut info = TuneInfo::new();
        info.set_primary_tempo("100").unwrap();
        info.add_tempo_event(960, "150").unwrap();
        assert_eq!(info.current_tempo_bpm(0), 100);
        assert_eq!(info.current_tempo_bpm(959), 100);
        assert_eq!(info.current_tempo_bpm(2000), 150);

        info.new_part(2);
        assert_eq!(info.current_tempo_bpm(2000), 100);
        assert_eq!(info.all_parts_tempo().len(), 2);
    }

    #[test]
    fn test_title_and_instrument() {
        let mut info = TuneInfo::new();
        info.set_title("Song - Flute", false);
        info.set_title("Melody", true);
        info.set_title("Song - Horn", false);
        assert_eq!(info.title(), "Melody");

        assert!(!info.is_instrument_set());
        assert_eq!(info.instrument(), Instrument::DEFAULT);
        info.set_instrument(Instrument::Flute);
        assert!(info.is_instrument_set());
        info.new_part(3);
        assert!(!info.is_instrument_set());
        assert_eq!(info.part_number(), 3);
    }
}
