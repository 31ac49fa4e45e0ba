use anyhow::{Context, Result};
use std::fmt;
use std::path::Path;

/// One named source of ABC text. A song may be split over several files;
/// they are parsed in order as one continuous input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbcFile {
    pub name: String,
    pub lines: Vec<String>,
}

impl AbcFile {
    pub fn new(name: impl Into<String>, lines: Vec<String>) -> Self {
        Self {
            name: name.into(),
            lines,
        }
    }

    pub fn from_text(name: impl Into<String>, text: &str) -> Self {
        Self::new(name, text.lines().map(str::to_string).collect())
    }

    pub fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::from_text(name, &text))
    }

    pub fn is_empty(&self) -> bool {
        self.lines.iter().all(|line| line.trim().is_empty())
    }
}

impl fmt::Display for AbcFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            writeln!(f, "{}", line)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_text() {
        let file = AbcFile::from_text("tune.abc", "X:1\r\nK:C\n\nCDEF|\n");
        assert_eq!(file.name, "tune.abc");
        assert_eq!(file.lines, vec!["X:1", "K:C", "", "CDEF|"]);
        assert!(!file.is_empty());
        assert_eq!(file.to_string(), "X:1\nK:C\n\nCDEF|\n");
        assert!(AbcFile::from_text("blank", "\n  \n").is_empty());
    }
}
