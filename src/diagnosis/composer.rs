//! Random diagnosis composition.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use super::Severity;
use crate::config::{SeverityTable, TableError};

/// Probability that a severe diagnosis gets an extra modifier.
pub const MODIFIER_PROBABILITY: f64 = 0.5;

/// How a [`Diagnosis`] is turned into reply text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosisStyle {
    /// `Гастрит колена второй степени`
    Plain,
    /// `Диагноз: Гастрит колена (второй степени)`
    Labeled,
    /// Either of the above, chosen uniformly per reply.
    #[default]
    Mixed,
}

impl FromStr for DiagnosisStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "plain" => Ok(Self::Plain),
            "labeled" | "labelled" => Ok(Self::Labeled),
            "mixed" | "random" => Ok(Self::Mixed),
            other => Err(format!("unknown diagnosis style: {other}")),
        }
    }
}

/// One composed diagnosis, kept in parts until rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnosis {
    pub severity: Severity,
    pub problem: String,
    pub body_part: String,
    pub qualifier: String,
    pub modifier: Option<String>,
}

impl Diagnosis {
    /// All parts joined by single spaces.
    #[must_use]
    pub fn plain(&self) -> String {
        let mut parts = vec![
            self.problem.as_str(),
            self.body_part.as_str(),
            self.qualifier.as_str(),
        ];
        if let Some(modifier) = &self.modifier {
            parts.push(modifier);
        }
        parts.join(" ")
    }

    /// The clinical-looking variant.
    #[must_use]
    pub fn labeled(&self) -> String {
        let modifier = self
            .modifier
            .as_deref()
            .map(|m| format!(", {m}"))
            .unwrap_or_default();
        format!(
            "Диагноз: {} {}{modifier} ({})",
            self.problem, self.body_part, self.qualifier
        )
    }

    /// Renders with the given style; `Mixed` consumes one draw from `rng`.
    pub fn render<R: Rng + ?Sized>(&self, style: DiagnosisStyle, rng: &mut R) -> String {
        match style {
            DiagnosisStyle::Plain => self.plain(),
            DiagnosisStyle::Labeled => self.labeled(),
            DiagnosisStyle::Mixed => {
                if rng.gen_bool(0.5) {
                    self.plain()
                } else {
                    self.labeled()
                }
            }
        }
    }
}

impl fmt::Display for Diagnosis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.plain())
    }
}

/// Composes diagnoses from a validated [`SeverityTable`].
#[derive(Debug, Clone)]
pub struct DiagnosisComposer {
    table: SeverityTable,
}

impl DiagnosisComposer {
    /// Creates a composer, rejecting tables with empty lists.
    pub fn new(table: SeverityTable) -> Result<Self, TableError> {
        table.validate()?;
        Ok(Self { table })
    }

    /// Composer over the built-in word lists.
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            table: SeverityTable::builtin(),
        }
    }

    #[must_use]
    pub const fn table(&self) -> &SeverityTable {
        &self.table
    }

    /// Composes a diagnosis for `level`, clamped into `1..=3`.
    pub fn compose<R: Rng + ?Sized>(&self, level: i64, rng: &mut R) -> Diagnosis {
        self.compose_severity(Severity::clamp(level), rng)
    }

    /// Composes a diagnosis for an already valid severity.
    ///
    /// Draw order is problem, body part, qualifier, then (severe only) the
    /// modifier coin and the modifier itself. Seeded sources reproduce
    /// the same output.
    pub fn compose_severity<R: Rng + ?Sized>(&self, severity: Severity, rng: &mut R) -> Diagnosis {
        let words = self.table.level(severity);

        let problem = pick(&words.problems, rng);
        let body_part = pick(&words.body_parts, rng);
        let qualifier = pick(&words.qualifiers, rng);

        let modifier = if severity == Severity::MAX
            && !words.modifiers.is_empty()
            && rng.gen_bool(MODIFIER_PROBABILITY)
        {
            Some(pick(&words.modifiers, rng))
        } else {
            None
        };

        Diagnosis {
            severity,
            problem,
            body_part,
            qualifier,
            modifier,
        }
    }
}

fn pick<R: Rng + ?Sized>(list: &[String], rng: &mut R) -> String {
    // Lists are non-empty once the table has been validated.
    list.choose(rng).cloned().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn test_out_of_range_levels_clamp() {
        let composer = DiagnosisComposer::builtin();
        for (raw, clamped) in [(-3, 1), (0, 1), (4, 3), (1000, 3)] {
            let a = composer.compose(raw, &mut StdRng::seed_from_u64(7));
            let b = composer.compose(clamped, &mut StdRng::seed_from_u64(7));
            assert_eq!(a, b, "level {raw} should behave like {clamped}");
        }
    }

    #[test]
    fn test_parts_come_from_level_lists() {
        let composer = DiagnosisComposer::builtin();
        let mut rng = rng();
        for severity in Severity::ALL {
            let words = composer.table().level(severity);
            for _ in 0..200 {
                let d = composer.compose_severity(severity, &mut rng);
                assert!(words.problems.contains(&d.problem));
                assert!(words.body_parts.contains(&d.body_part));
                assert!(words.qualifiers.contains(&d.qualifier));
                if severity != Severity::MAX {
                    assert!(d.modifier.is_none());
                }

                let expected = match &d.modifier {
                    Some(m) => format!("{} {} {} {m}", d.problem, d.body_part, d.qualifier),
                    None => format!("{} {} {}", d.problem, d.body_part, d.qualifier),
                };
                assert_eq!(d.plain(), expected);
                assert!(!d.plain().contains("  "));
            }
        }
    }

    #[test]
    fn test_severe_modifier_frequency() {
        let composer = DiagnosisComposer::builtin();
        let mut rng = rng();
        let draws = 4000;
        let with_modifier = (0..draws)
            .filter(|_| composer.compose(3, &mut rng).modifier.is_some())
            .count();

        #[allow(clippy::cast_precision_loss)]
        let ratio = with_modifier as f64 / f64::from(draws);
        assert!((ratio - 0.5).abs() < 0.05, "modifier ratio was {ratio}");
    }

    #[test]
    fn test_same_seed_same_output() {
        let composer = DiagnosisComposer::builtin();
        let a: Vec<_> = {
            let mut rng = rng();
            (0..20).map(|_| composer.compose(3, &mut rng).plain()).collect()
        };
        let b: Vec<_> = {
            let mut rng = rng();
            (0..20).map(|_| composer.compose(3, &mut rng).plain()).collect()
        };
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid_table_rejected() {
        let mut table = SeverityTable::builtin();
        table.mild.problems.clear();
        assert!(DiagnosisComposer::new(table).is_err());
    }

    #[test]
    fn test_labeled_rendering() {
        let diagnosis = Diagnosis {
            severity: Severity::MAX,
            problem: "Тромбоз".to_owned(),
            body_part: "селезенки".to_owned(),
            qualifier: "с осложнениями".to_owned(),
            modifier: Some("с метастазами".to_owned()),
        };
        assert_eq!(
            diagnosis.labeled(),
            "Диагноз: Тромбоз селезенки, с метастазами (с осложнениями)"
        );
        assert_eq!(
            diagnosis.render(DiagnosisStyle::Plain, &mut rng()),
            "Тромбоз селезенки с осложнениями с метастазами"
        );
    }

    #[test]
    fn test_style_from_str() {
        assert_eq!("Plain".parse(), Ok(DiagnosisStyle::Plain));
        assert_eq!("labelled".parse(), Ok(DiagnosisStyle::Labeled));
        assert!("fancy".parse::<DiagnosisStyle>().is_err());
    }
}
