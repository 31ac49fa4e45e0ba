use crate::region::{AbcRegion, RegionId};
use crate::types::field::AbcField;
use crate::types::instrument::Instrument;
use crate::types::key_signature::KeySignature;
use crate::types::time_signature::TimeSignature;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};

// Trailing open punctuation and a "(m:ss)" style duration
static TRAILING_PUNCT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[-:;(\[{\s]*([(\[{]\d{1,2}:\d{2}[)\]}])?[-:;(\[{\s]*$").expect("valid pattern")
});

#[derive(Debug, Clone, PartialEq)]
pub struct PartInfo {
    pub number: u32,
    pub instrument: Instrument,
    name: Option<String>,
    raw_name: Option<String>,
    name_is_from_extended_info: bool,
    pub start_line: usize,
    pub end_line: usize,
}

impl Default for PartInfo {
    fn default() -> Self {
        Self {
            number: 1,
            instrument: Instrument::DEFAULT,
            name: None,
            raw_name: None,
            name_is_from_extended_info: false,
            start_line: 0,
            end_line: 0,
        }
    }
}

/// Metadata gathered while parsing: titles, parts, bar positions and
/// source regions. Parts are counted from 1 in the order their `X:` lines
/// appear; part 0 is the song itself. A part that never plays a note has no
/// timeline track, so use [`AbcInfo::track_part`] to go from a track to its
/// part.
#[derive(Debug, Clone)]
pub struct AbcInfo {
    empty: bool,
    title_prefix: Option<String>,
    metadata: HashMap<char, String>,
    bars: BTreeMap<u64, u32>,
    parts: BTreeMap<usize, PartInfo>,
    track_parts: BTreeMap<usize, usize>,
    regions: Vec<AbcRegion>,
    primary_tempo_bpm: u32,
    has_triplets: bool,
    song_title: Option<String>,
    song_composer: Option<String>,
    song_transcriber: Option<String>,
    time_signature: TimeSignature,
    key_signature: KeySignature,
}

impl Default for AbcInfo {
    fn default() -> Self {
        Self {
            empty: true,
            title_prefix: None,
            metadata: HashMap::new(),
            bars: BTreeMap::new(),
            parts: BTreeMap::new(),
            track_parts: BTreeMap::new(),
            regions: Vec::new(),
            primary_tempo_bpm: 120,
            has_triplets: false,
            song_title: None,
            song_composer: None,
            song_transcriber: None,
            time_signature: TimeSignature::FOUR_FOUR,
            key_signature: KeySignature::C_MAJOR,
        }
    }
}

fn longest_common_prefix<'a>(a: &'a str, b: &str) -> &'a str {
    let end = a
        .char_indices()
        .zip(b.chars())
        .find(|((_, ca), cb)| ca != cb)
        .map(|((i, _), _)| i)
        .unwrap_or_else(|| a.len().min(b.len()));
    &a[..end]
}

impl AbcInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    pub fn title(&self) -> String {
        match &self.song_title {
            Some(title) => title.clone(),
            None => self.title_prefix(),
        }
    }

    pub fn composer(&self) -> String {
        self.song_composer
            .clone()
            .or_else(|| self.metadata('C').map(str::to_string))
            .unwrap_or_default()
    }

    pub fn transcriber(&self) -> String {
        if let Some(transcriber) = &self.song_transcriber {
            return transcriber.clone();
        }
        let Some(z) = self.metadata('Z') else {
            return String::new();
        };
        let lower = z.to_lowercase();
        for lead in ["transcribed by", "transcribed using"] {
            if lower.starts_with(lead) {
                return z[lead.len()..].trim().to_string();
            }
        }
        z.to_string()
    }

    /// First value seen for a header letter.
    pub fn metadata(&self, key: char) -> Option<&str> {
        self.metadata
            .get(&key.to_ascii_uppercase())
            .map(String::as_str)
    }

    /// Bar number containing `tick`, counting from 1. Zero before the first bar line.
    pub fn tick_to_bar_number(&self, tick: u64) -> u32 {
        self.bars
            .range(..=tick)
            .next_back()
            .map(|(_, bar)| *bar)
            .unwrap_or(0)
    }

    pub fn bar_count(&self) -> usize {
        self.bars.len()
    }

    pub fn bars(&self) -> &BTreeMap<u64, u32> {
        &self.bars
    }

    pub fn primary_tempo_bpm(&self) -> u32 {
        self.primary_tempo_bpm
    }

    pub fn has_triplets(&self) -> bool {
        self.has_triplets
    }

    pub fn time_signature(&self) -> TimeSignature {
        self.time_signature
    }

    pub fn key_signature(&self) -> KeySignature {
        self.key_signature
    }

    /// Number of parts, not counting the song track.
    pub fn part_count(&self) -> usize {
        self.parts.keys().filter(|&&index| index > 0).count()
    }

    /// The part a timeline track was written for.
    pub fn track_part(&self, track_index: usize) -> Option<usize> {
        self.track_parts.get(&track_index).copied()
    }

    pub fn part(&self, part_index: usize) -> Option<&PartInfo> {
        self.parts.get(&part_index)
    }

    /// The `X:` number of a part.
    pub fn part_number(&self, part_index: usize) -> u32 {
        self.part(part_index).map(|p| p.number).unwrap_or(1)
    }

    pub fn part_instrument(&self, part_index: usize) -> Instrument {
        self.part(part_index)
            .map(|p| p.instrument)
            .unwrap_or(Instrument::DEFAULT)
    }

    /// Short part name: `%%part-name` if given, otherwise the title with
    /// the prefix shared by all titles removed.
    pub fn part_name(&self, part_index: usize) -> String {
        let Some(name) = self.part(part_index).and_then(|p| {
            p.name
                .as_deref()
                .map(|name| (name, p.name_is_from_extended_info))
        }) else {
            return format!("Part {}", part_index);
        };
        let (name, from_extended_info) = name;
        let prefix = self.title_prefix.as_deref().unwrap_or("");
        if from_extended_info
            || prefix.is_empty()
            || prefix.len() == name.len()
            || !name.starts_with(prefix)
        {
            return name.to_string();
        }
        name[prefix.len()..].trim().to_string()
    }

    /// The part's `T:` value as written.
    pub fn part_full_name(&self, part_index: usize) -> String {
        match self.part(part_index) {
            Some(PartInfo {
                raw_name: Some(raw), ..
            }) => raw.clone(),
            Some(PartInfo {
                name: Some(name), ..
            }) => name.clone(),
            _ => format!("Part {}", part_index),
        }
    }

    pub fn part_start_line(&self, part_index: usize) -> usize {
        self.part(part_index).map(|p| p.start_line).unwrap_or(0)
    }

    pub fn part_end_line(&self, part_index: usize) -> usize {
        self.part(part_index).map(|p| p.end_line).unwrap_or(0)
    }

    /// Regions in the order they were found.
    pub fn regions(&self) -> &[AbcRegion] {
        &self.regions
    }

    pub fn region(&self, id: RegionId) -> &AbcRegion {
        &self.regions[id]
    }

    /// Regions in playback order.
    pub fn regions_by_position(&self) -> Vec<&AbcRegion> {
        let mut sorted: Vec<&AbcRegion> = self.regions.iter().collect();
        sorted.sort_by(|a, b| a.cmp_position(b));
        sorted
    }

    fn title_prefix(&self) -> String {
        match self.title_prefix.as_deref() {
            None | Some("") => self
                .metadata('T')
                .map(str::to_string)
                .unwrap_or_else(|| "(Untitled)".to_string()),
            Some(prefix) => TRAILING_PUNCT.replace(prefix, "").into_owned(),
        }
    }

    fn part_mut(&mut self, part_index: usize) -> &mut PartInfo {
        self.parts.entry(part_index).or_default()
    }

    pub(crate) fn set_metadata(&mut self, key: char, value: &str) {
        self.empty = false;
        let key = key.to_ascii_uppercase();
        self.metadata
            .entry(key)
            .or_insert_with(|| value.to_string());

        if key == 'T' {
            let prefix = match &self.title_prefix {
                None => value.to_string(),
                Some(prefix) => longest_common_prefix(prefix, value).to_string(),
            };
            self.title_prefix = Some(prefix);
        }
    }

    pub(crate) fn set_extended_metadata(&mut self, field: AbcField, value: &str) {
        let value = value.trim().to_string();
        match field {
            AbcField::SongTitle => self.song_title = Some(value),
            AbcField::SongComposer => self.song_composer = Some(value),
            AbcField::SongTranscriber => self.song_transcriber = Some(value),
            _ => {}
        }
    }

    pub(crate) fn set_track_part(&mut self, track_index: usize, part_index: usize) {
        self.track_parts.insert(track_index, part_index);
    }

    pub(crate) fn set_part_number(&mut self, part_index: usize, number: u32) {
        self.part_mut(part_index).number = number;
    }

    pub(crate) fn set_part_instrument(&mut self, part_index: usize, instrument: Instrument) {
        self.part_mut(part_index).instrument = instrument;
    }

    pub(crate) fn set_part_name(&mut self, part_index: usize, name: &str, from_extended_info: bool) {
        let part = self.part_mut(part_index);
        if from_extended_info || !part.name_is_from_extended_info {
            part.name = Some(name.to_string());
            part.name_is_from_extended_info = from_extended_info;
        }
        if !from_extended_info {
            part.raw_name = Some(name.to_string());
        }
    }

    pub(crate) fn set_part_start_line(&mut self, part_index: usize, line: usize) {
        self.part_mut(part_index).start_line = line;
    }

    pub(crate) fn set_part_end_line(&mut self, part_index: usize, line: usize) {
        self.part_mut(part_index).end_line = line;
    }

    pub(crate) fn add_bar(&mut self, tick: u64) {
        if !self.bars.contains_key(&tick) {
            self.empty = false;
            let number = self.bars.len() as u32 + 1;
            self.bars.insert(tick, number);
        }
    }

    pub(crate) fn set_primary_tempo_bpm(&mut self, bpm: u32) {
        self.primary_tempo_bpm = bpm;
        self.empty = false;
    }

    pub(crate) fn set_has_triplets(&mut self, has_triplets: bool) {
        self.has_triplets = has_triplets;
    }

    pub(crate) fn set_time_signature(&mut self, meter: TimeSignature) {
        self.time_signature = meter;
    }

    pub(crate) fn set_key_signature(&mut self, key: KeySignature) {
        self.key_signature = key;
    }

    pub(crate) fn add_region(&mut self, region: AbcRegion) -> RegionId {
        self.regions.push(region);
        self.regions.len() - 1
    }

    pub(crate) fn link_regions(&mut self, from: RegionId, to: RegionId) {
        self.regions[from].ties_to = Some(to);
        self.regions[to].ties_from = Some(from);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_prefix() {
        let mut info = AbcInfo::new();
        info.set_metadata('T', "My Song (3:45) - Lute");
        info.set_metadata('T', "My Song (3:45) - Flute");
        info.set_part_name(1, "My Song (3:45) - Lute", false);
        info.set_part_name(2, "My Song (3:45) - Flute", false);

        assert_eq!(info.title(), "My Song");
        assert_eq!(info.part_name(1), "Lute");
        assert_eq!(info.part_name(2), "Flute");
        assert_eq!(info.part_full_name(2), "My Song (3:45) - Flute");
        assert_eq!(info.part_name(3), "Part 3");
    }

    #[test]
    fn test_untitled() {
        let info = AbcInfo::new();
        assert_eq!(info.title(), "(Untitled)");
        assert!(info.is_empty());
    }

    #[test]
    fn test_extended_metadata_wins() {
        let mut info = AbcInfo::new();
        info.set_metadata('T', "Tune");
        info.set_metadata('C', "Trad.");
        info.set_metadata('Z', "Transcribed by Someone");
        assert_eq!(info.composer(), "Trad.");
        assert_eq!(info.transcriber(), "Someone");

        info.set_extended_metadata(AbcField::SongTitle, " Real Title ");
        info.set_extended_metadata(AbcField::SongComposer, "Composer");
        assert_eq!(info.title(), "Real Title");
        assert_eq!(info.composer(), "Composer");

        info.set_part_name(1, "Tune", false);
        info.set_part_name(1, "Melody", true);
        info.set_part_name(1, "Tune again", false);
        assert_eq!(info.part_name(1), "Melody");
        assert_eq!(info.part_full_name(1), "Tune again");
    }

    #[test]
    fn test_bars() {
        let mut info = AbcInfo::new();
        info.add_bar(100);
        info.add_bar(100);
        info.add_bar(200);
        assert_eq!(info.bar_count(), 2);
        assert_eq!(info.tick_to_bar_number(0), 0);
        assert_eq!(info.tick_to_bar_number(150), 1);
        assert_eq!(info.tick_to_bar_number(200), 2);
    }
}
