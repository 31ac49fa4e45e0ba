//! Error types for parsing and exporting ABC

/// An error found while reading ABC text. Carries enough location
/// information to point a user at the offending character.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// Malformed input. Always fatal.
    #[error("{file}:{line}{}: {message}", fmt_column(.column))]
    Structural {
        file: String,
        line: usize,
        column: Option<usize>,
        message: String,
    },

    /// Input that is valid ABC but can't be played in game. Only raised when
    /// strict validation is enabled.
    #[error("{file}:{line}{}: {message}", fmt_column(.column))]
    Validation {
        file: String,
        line: usize,
        column: Option<usize>,
        message: String,
    },
}

fn fmt_column(column: &Option<usize>) -> String {
    match column {
        Some(column) => format!(":{}", column),
        None => String::new(),
    }
}

impl ParseError {
    pub fn structural(file: &str, line: usize, column: Option<usize>, message: impl Into<String>) -> Self {
        ParseError::Structural {
            file: file.to_string(),
            line,
            column,
            message: message.into(),
        }
    }

    pub fn validation(file: &str, line: usize, column: Option<usize>, message: impl Into<String>) -> Self {
        ParseError::Validation {
            file: file.to_string(),
            line,
            column,
            message: message.into(),
        }
    }

    pub fn file(&self) -> &str {
        match self {
            ParseError::Structural { file, .. } | ParseError::Validation { file, .. } => file,
        }
    }

    /// 1-based line number.
    pub fn line(&self) -> usize {
        match self {
            ParseError::Structural { line, .. } | ParseError::Validation { line, .. } => *line,
        }
    }

    /// 0-based character column, when known.
    pub fn column(&self) -> Option<usize> {
        match self {
            ParseError::Structural { column, .. } | ParseError::Validation { column, .. } => *column,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ParseError::Structural { message, .. } | ParseError::Validation { message, .. } => {
                message
            }
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, ParseError::Validation { .. })
    }
}

/// Failures while building timing information or exporting ABC.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConversionError {
    #[error("Only C major and A minor are currently supported")]
    UnsupportedKey,

    #[error("The song contains no playable notes")]
    EmptySong,

    #[error("Tempo {tempo} is out of range. Must be between {min} and {max}.")]
    TempoOutOfRange { tempo: i32, min: i32, max: i32 },

    #[error("The denominator of the meter must be no greater than {max}")]
    MeterTooFine { max: i64 },

    #[error("A tick resolution of {resolution} can't represent notes of 1/{divisor}")]
    UnrepresentableResolution { resolution: i64, divisor: i64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = ParseError::structural("song.abc", 12, Some(4), "Unexpected ']'");
        assert_eq!(err.to_string(), "song.abc:12:4: Unexpected ']'");
        assert!(!err.is_validation());

        let err = ParseError::validation("song.abc", 3, None, "Note is too high");
        assert_eq!(err.to_string(), "song.abc:3: Note is too high");
        assert!(err.is_validation());
        assert_eq!(err.message(), "Note is too high");
        assert_eq!(err.column(), None);
        assert_eq!(err.line(), 3);
        assert_eq!(err.file(), "song.abc");
    }

    #[test]
    fn test_conversion_display() {
        let err = ConversionError::TempoOutOfRange {
            tempo: 2000,
            min: 8,
            max: 1000,
        };
        assert_eq!(
            err.to_string(),
            "Tempo 2000 is out of range. Must be between 8 and 1000."
        );
    }
}
