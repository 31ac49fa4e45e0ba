use std::fmt;

/// An accidental as written in ABC, with the semitone shift it applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Accidental {
    None,
    DoubleFlat,
    Flat,
    Natural,
    Sharp,
    DoubleSharp,
}

impl Accidental {
    pub fn abc(&self) -> &'static str {
        match self {
            Accidental::None => "",
            Accidental::DoubleFlat => "__",
            Accidental::Flat => "_",
            Accidental::Natural => "=",
            Accidental::Sharp => "^",
            Accidental::DoubleSharp => "^^",
        }
    }

    pub fn delta(&self) -> i32 {
        match self {
            Accidental::None | Accidental::Natural => 0,
            Accidental::DoubleFlat => -2,
            Accidental::Flat => -1,
            Accidental::Sharp => 1,
            Accidental::DoubleSharp => 2,
        }
    }

    /// Maps a semitone shift back to the accidental that produces it.
    /// A zero shift is an explicit natural; anything beyond two is `None`.
    pub fn from_delta(delta: i32) -> Self {
        match delta {
            -2 => Accidental::DoubleFlat,
            -1 => Accidental::Flat,
            0 => Accidental::Natural,
            1 => Accidental::Sharp,
            2 => Accidental::DoubleSharp,
            _ => Accidental::None,
        }
    }

    pub fn from_abc(s: &str) -> Option<Self> {
        match s {
            "__" => Some(Accidental::DoubleFlat),
            "_" => Some(Accidental::Flat),
            "=" => Some(Accidental::Natural),
            "^" => Some(Accidental::Sharp),
            "^^" => Some(Accidental::DoubleSharp),
            _ => None,
        }
    }
}

impl fmt::Display for Accidental {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.abc())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta_mapping() {
        for acc in [
            Accidental::DoubleFlat,
            Accidental::Flat,
            Accidental::Natural,
            Accidental::Sharp,
            Accidental::DoubleSharp,
        ] {
            assert_eq!(Accidental::from_delta(acc.delta()), acc);
            assert_eq!(Accidental::from_abc(acc.abc()), Some(acc));
        }
        assert_eq!(Accidental::from_delta(3), Accidental::None);
        assert_eq!(Accidental::None.delta(), 0);
        assert_eq!(Accidental::from_abc(""), None);
    }
}
