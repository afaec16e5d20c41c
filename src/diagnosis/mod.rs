//! Joke diagnosis generation.
//!
//! A diagnosis is one problem, one body part and one qualifier drawn from
//! the word lists of a severity level, plus an optional modifier at the
//! highest level. Composition is pure given the random source.

mod composer;
mod severity;

pub use composer::{Diagnosis, DiagnosisComposer, DiagnosisStyle, MODIFIER_PROBABILITY};
pub use severity::Severity;
