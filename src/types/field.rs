use std::fmt;

/// Extended `%%name value` metadata fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AbcField {
    SongTitle,
    SongComposer,
    SongDuration,
    SongTranscriber,
    AbcVersion,
    AbcCreator,
    PartName,
    /// `%%Q:` inline tempo change.
    Tempo,
}

const ALL: [AbcField; 8] = [
    AbcField::SongTitle,
    AbcField::SongComposer,
    AbcField::SongDuration,
    AbcField::SongTranscriber,
    AbcField::AbcVersion,
    AbcField::AbcCreator,
    AbcField::PartName,
    AbcField::Tempo,
];

fn prefix(name: &str) -> &str {
    match name.find('-') {
        Some(dash) if dash > 0 => &name[..dash],
        _ => name,
    }
}

impl AbcField {
    pub fn name(&self) -> &'static str {
        match self {
            AbcField::SongTitle => "song-title",
            AbcField::SongComposer => "song-composer",
            AbcField::SongDuration => "song-duration",
            AbcField::SongTranscriber => "song-transcriber",
            AbcField::AbcVersion => "abc-version",
            AbcField::AbcCreator => "abc-creator",
            AbcField::PartName => "part-name",
            AbcField::Tempo => "Q:",
        }
    }

    /// Looks up a field by name, ignoring case, a leading `%%` and anything
    /// after the first space.
    pub fn from_name(s: &str) -> Option<Self> {
        let s = s.strip_prefix("%%").unwrap_or(s).trim();
        let s = match s.find(' ') {
            Some(space) if space > 0 => &s[..space],
            _ => s,
        };
        ALL.into_iter().find(|f| f.name().eq_ignore_ascii_case(s))
    }

    fn padded_len(&self) -> usize {
        let own = prefix(self.name());
        ALL.iter()
            .map(|f| f.name())
            .filter(|n| prefix(n) == own)
            .map(str::len)
            .max()
            .unwrap_or(0)
            + 1
    }
}

impl fmt::Display for AbcField {
    /// `%%name` padded so values line up with other fields sharing its prefix.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%%{:<width$}", self.name(), width = self.padded_len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name() {
        assert_eq!(AbcField::from_name("song-title"), Some(AbcField::SongTitle));
        assert_eq!(AbcField::from_name("%%Part-Name"), Some(AbcField::PartName));
        assert_eq!(AbcField::from_name("q:"), Some(AbcField::Tempo));
        assert_eq!(AbcField::from_name("abc-creator Foo 1.0"), Some(AbcField::AbcCreator));
        assert_eq!(AbcField::from_name("song-writer"), None);
    }

    #[test]
    fn test_display_padding() {
        assert_eq!(AbcField::SongTitle.to_string(), "%%song-title       ");
        assert_eq!(AbcField::SongTranscriber.to_string(), "%%song-transcriber ");
        assert_eq!(AbcField::AbcVersion.to_string(), "%%abc-version ");
        assert_eq!(AbcField::PartName.to_string(), "%%part-name ");
        assert_eq!(AbcField::Tempo.to_string(), "%%Q: ");
    }
}
