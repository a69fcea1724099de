use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::{Catalog, QuestionKind};
use crate::model::ids::QuestionId;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

/// Merge-time validation failures. Either one rejects the whole merge call;
/// the stored map is never partially applied.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AnswerError {
    #[error("unknown question `{0}`")]
    UnknownQuestion(QuestionId),

    #[error("answer for `{question_id}` does not match the {expected:?} shape")]
    InvalidAnswerShape {
        question_id: QuestionId,
        expected: QuestionKind,
    },
}

//
// ─── VALUES ────────────────────────────────────────────────────────────────────
//

/// Wire shape of a single answer: a string, or a list of strings.
///
/// This is what clients submit and what the store persists per question id.
/// Which of the two is acceptable depends on the question's kind; the typed
/// [`Answer`] is only produced after that check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Text(String),
    Options(Vec<String>),
}

/// A validated answer, tagged with the kind of question it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    Text(String),
    SingleChoice(String),
    MultipleChoice(Vec<String>),
    Rating(String),
}

impl Answer {
    /// Checks an incoming wire value against a question's declared kind.
    ///
    /// Declared-option membership for choice answers is deliberately not
    /// checked; see DESIGN.md.
    fn from_value(
        kind: QuestionKind,
        value: AnswerValue,
        question_id: &QuestionId,
    ) -> Result<Self, AnswerError> {
        match (kind, value) {
            (QuestionKind::Text, AnswerValue::Text(s)) => Ok(Self::Text(s)),
            (QuestionKind::SingleChoice, AnswerValue::Text(s)) => Ok(Self::SingleChoice(s)),
            (QuestionKind::Rating, AnswerValue::Text(s)) => Ok(Self::Rating(s)),
            (QuestionKind::MultipleChoice, AnswerValue::Options(opts)) => {
                Ok(Self::MultipleChoice(opts))
            }
            (expected, _) => Err(AnswerError::InvalidAnswerShape {
                question_id: question_id.clone(),
                expected,
            }),
        }
    }

    /// The wire representation of this answer.
    #[must_use]
    pub fn to_value(&self) -> AnswerValue {
        match self {
            Self::Text(s) | Self::SingleChoice(s) | Self::Rating(s) => {
                AnswerValue::Text(s.clone())
            }
            Self::MultipleChoice(opts) => AnswerValue::Options(opts.clone()),
        }
    }

    #[must_use]
    pub fn kind(&self) -> QuestionKind {
        match self {
            Self::Text(_) => QuestionKind::Text,
            Self::SingleChoice(_) => QuestionKind::SingleChoice,
            Self::MultipleChoice(_) => QuestionKind::MultipleChoice,
            Self::Rating(_) => QuestionKind::Rating,
        }
    }

    /// Whether this answer counts as answered for scoring.
    ///
    /// A string counts if it is non-blank after trimming; a list counts if it
    /// has at least one element. Empty submissions never inflate completion.
    #[must_use]
    pub fn is_answered(&self) -> bool {
        match self {
            Self::Text(s) | Self::SingleChoice(s) | Self::Rating(s) => !s.trim().is_empty(),
            Self::MultipleChoice(opts) => !opts.is_empty(),
        }
    }
}

//
// ─── ANSWER MAP ────────────────────────────────────────────────────────────────
//

/// A user's stored answers, keyed by question id.
///
/// The map only ever changes through [`AnswerMap::merge`]; there is no other
/// mutator and no draft state, so every merged value is immediately
/// authoritative.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnswerMap(BTreeMap<QuestionId, Answer>);

impl AnswerMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: &QuestionId) -> Option<&Answer> {
        self.0.get(id)
    }

    #[must_use]
    pub fn contains(&self, id: &QuestionId) -> bool {
        self.0.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&QuestionId, &Answer)> {
        self.0.iter()
    }

    /// Applies a partial incoming map on top of this one, last-write-wins
    /// per key, and returns the merged result. Keys absent from the incoming
    /// map are left untouched; a `MultipleChoice` value is replaced
    /// wholesale, never unioned.
    ///
    /// Every incoming entry is validated against the catalog before any key
    /// is applied: a failed merge produces no result, so the caller keeps
    /// its original map and nothing partially-applied escapes.
    ///
    /// # Errors
    ///
    /// Returns `AnswerError::UnknownQuestion` if an incoming key is not a
    /// catalog question id, or `AnswerError::InvalidAnswerShape` if a value
    /// does not match the question's declared kind.
    pub fn merge(
        &self,
        catalog: &Catalog,
        incoming: BTreeMap<QuestionId, AnswerValue>,
    ) -> Result<Self, AnswerError> {
        let mut validated = Vec::with_capacity(incoming.len());
        for (question_id, value) in incoming {
            let question = catalog
                .question(&question_id)
                .ok_or_else(|| AnswerError::UnknownQuestion(question_id.clone()))?;
            let answer = Answer::from_value(question.kind(), value, &question_id)?;
            validated.push((question_id, answer));
        }

        let mut merged = self.clone();
        for (question_id, answer) in validated {
            merged.0.insert(question_id, answer);
        }
        Ok(merged)
    }

    /// Rebuilds a map from its wire form, validating every entry.
    ///
    /// # Errors
    ///
    /// Same contract as [`AnswerMap::merge`].
    pub fn from_wire(
        catalog: &Catalog,
        wire: BTreeMap<QuestionId, AnswerValue>,
    ) -> Result<Self, AnswerError> {
        Self::new().merge(catalog, wire)
    }

    /// The wire form of the whole map: question id to string-or-list value.
    #[must_use]
    pub fn to_wire(&self) -> BTreeMap<QuestionId, AnswerValue> {
        self.0
            .iter()
            .map(|(id, answer)| (id.clone(), answer.to_value()))
            .collect()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
