//! Diagnosis word tables and their validation.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::diagnosis::Severity;

/// Errors that can occur while loading or validating a word table.
#[derive(Debug, Error)]
pub enum TableError {
    #[error("Level {level} has an empty '{list}' list")]
    EmptyList { level: u8, list: &'static str },

    #[error("Level {level} has a blank entry at index {index} in '{list}'")]
    BlankEntry {
        level: u8,
        list: &'static str,
        index: usize,
    },

    #[error("Failed to read word table file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse word table file: {0}")]
    ParseError(#[from] serde_json::Error),
}

/// Word lists for a single severity level.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LevelWords {
    /// Problem phrases ("Гастрит").
    pub problems: Vec<String>,

    /// Body-part phrases in genitive form ("колена").
    pub body_parts: Vec<String>,

    /// Severity qualifiers ("второй степени").
    pub qualifiers: Vec<String>,

    /// Extra modifiers, only drawn from at the highest level.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modifiers: Vec<String>,
}

impl LevelWords {
    fn new(problems: &[&str], body_parts: &[&str], qualifiers: &[&str], modifiers: &[&str]) -> Self {
        let owned = |list: &[&str]| list.iter().map(|s| (*s).to_owned()).collect();
        Self {
            problems: owned(problems),
            body_parts: owned(body_parts),
            qualifiers: owned(qualifiers),
            modifiers: owned(modifiers),
        }
    }

    fn check(&self, level: u8) -> Result<(), TableError> {
        let required = [
            ("problems", &self.problems),
            ("body_parts", &self.body_parts),
            ("qualifiers", &self.qualifiers),
        ];

        for (list, entries) in required {
            if entries.is_empty() {
                return Err(TableError::EmptyList { level, list });
            }
        }

        let all = required
            .into_iter()
            .chain(std::iter::once(("modifiers", &self.modifiers)));

        for (list, entries) in all {
            if let Some(index) = entries.iter().position(|e| e.trim().is_empty()) {
                return Err(TableError::BlankEntry { level, list, index });
            }
        }

        Ok(())
    }
}

/// The full word table, one entry per severity level.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeverityTable {
    pub mild: LevelWords,
    pub moderate: LevelWords,
    pub severe: LevelWords,
}

impl Default for SeverityTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl SeverityTable {
    /// The word lists the bot ships with.
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            mild: LevelWords::new(
                &["Покраснение", "Зуд", "Легкое недомогание", "Икота"],
                &["уха", "носа", "пальца"],
                &["начальной стадии", "легкой формы"],
                &[],
            ),
            moderate: LevelWords::new(
                &["Паралич", "Гастрит", "Пародонтоз", "Аритмия"],
                &["ребра", "колена", "локтя"],
                &["второй степени", "средней тяжести"],
                &[],
            ),
            severe: LevelWords::new(
                &["Недоразвитие", "Гипертрофия", "Дегенерация", "Тромбоз"],
                &["гипоталамуса", "селезенки", "надкостницы"],
                &["терминальной стадии", "с осложнениями"],
                &["внезапного происхождения", "с метастазами"],
            ),
        }
    }

    /// Loads a table from a JSON file.
    ///
    /// The result is not validated; call [`SeverityTable::validate`].
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, TableError> {
        let content = std::fs::read_to_string(path)?;
        let table: Self = serde_json::from_str(&content)?;
        Ok(table)
    }

    /// Saves the table to a JSON file.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), TableError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Checks that every required list is non-empty and has no blank entries.
    pub fn validate(&self) -> Result<(), TableError> {
        self.validate_all().into_iter().collect()
    }

    /// Validation result for each level, mild first.
    #[must_use]
    pub fn validate_all(&self) -> Vec<Result<(), TableError>> {
        Severity::ALL
            .iter()
            .map(|&severity| self.level(severity).check(severity.get()))
            .collect()
    }

    /// Word lists for the given level.
    #[must_use]
    pub const fn level(&self, severity: Severity) -> &LevelWords {
        match severity.get() {
            1 => &self.mild,
            2 => &self.moderate,
            _ => &self.severe,
        }
    }

    /// Number of distinct plain diagnoses this table can produce.
    #[must_use]
    pub fn combinations(&self) -> usize {
        Severity::ALL
            .iter()
            .map(|&s| {
                let words = self.level(s);
                let base = words.problems.len() * words.body_parts.len() * words.qualifiers.len();
                if s == Severity::MAX {
                    base * (words.modifiers.len() + 1)
                } else {
                    base
                }
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_table_is_valid() {
        assert!(SeverityTable::builtin().validate().is_ok());
    }

    #[test]
    fn test_empty_list_rejected() {
        let mut table = SeverityTable::builtin();
        table.moderate.body_parts.clear();
        assert!(matches!(
            table.validate(),
            Err(TableError::EmptyList { level: 2, list: "body_parts" })
        ));
    }

    #[test]
    fn test_blank_entry_rejected() {
        let mut table = SeverityTable::builtin();
        table.severe.modifiers.push("   ".to_owned());
        assert!(matches!(
            table.validate(),
            Err(TableError::BlankEntry { level: 3, list: "modifiers", index: 2 })
        ));
    }

    #[test]
    fn test_modifiers_optional_in_json() {
        let json = r#"{
            "mild": {"problems": ["a"], "body_parts": ["b"], "qualifiers": ["c"]},
            "moderate": {"problems": ["a"], "body_parts": ["b"], "qualifiers": ["c"]},
            "severe": {"problems": ["a"], "body_parts": ["b"], "qualifiers": ["c"]}
        }"#;
        let table: SeverityTable = serde_json::from_str(json).unwrap();
        assert!(table.severe.modifiers.is_empty());
        assert!(table.validate().is_ok());
    }

    #[test]
    fn test_level_lookup() {
        let table = SeverityTable::builtin();
        assert_eq!(table.level(Severity::MIN), &table.mild);
        assert_eq!(table.level(Severity::clamp(2)), &table.moderate);
        assert_eq!(table.level(Severity::MAX), &table.severe);
    }

    #[test]
    fn test_combinations() {
        // 4*3*2 + 4*3*2 + 4*3*2*(2+1)
        assert_eq!(SeverityTable::builtin().combinations(), 24 + 24 + 72);
    }
}
