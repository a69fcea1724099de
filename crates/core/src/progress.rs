use serde::{Deserialize, Serialize};

use crate::answers::AnswerMap;
use crate::catalog::{Catalog, Category};
use crate::model::ids::CategoryId;

//
// ─── REPORT ────────────────────────────────────────────────────────────────────
//

/// Completion of a single category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryProgress {
    pub category_id: CategoryId,
    pub answered: u32,
    pub total: u32,
    pub percent: f64,
}

/// Weighted completion derived from a catalog and an answer map.
///
/// Always recomputed on demand; a persisted copy is only ever a display
/// snapshot, never the source of truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressReport {
    pub categories: Vec<CategoryProgress>,
    pub overall: f64,
}

//
// ─── CALCULATION ───────────────────────────────────────────────────────────────
//

/// Computes per-category and overall weighted completion percentages.
///
/// Pure and idempotent: the same (catalog, answers) pair always yields an
/// identical report. Categories without questions are skipped entirely, so
/// they neither appear in the per-category list nor contribute to the
/// overall denominator. All percentages land in [0, 100]; when no category
/// has questions the overall is 0 by convention.
#[must_use]
pub fn compute_progress(catalog: &Catalog, answers: &AnswerMap) -> ProgressReport {
    let mut categories = Vec::new();
    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;

    for category in catalog.categories() {
        let Some(progress) = category_progress(category, answers) else {
            continue;
        };
        weighted_sum += category.weight() * progress.percent;
        weight_total += category.weight();
        categories.push(progress);
    }

    let overall = if weight_total > 0.0 {
        weighted_sum / weight_total
    } else {
        0.0
    };

    ProgressReport {
        categories,
        overall,
    }
}

/// `None` for categories with no questions; they are excluded, not scored
/// as zero.
fn category_progress(category: &Category, answers: &AnswerMap) -> Option<CategoryProgress> {
    let questions = category.questions();
    if questions.is_empty() {
        return None;
    }

    let mut answered = 0u32;
    let mut answered_weight = 0.0;
    let mut total_weight = 0.0;
    for question in questions {
        total_weight += question.weight();
        let counts = answers
            .get(question.id())
            .is_some_and(crate::answers::Answer::is_answered);
        if counts {
            answered += 1;
            answered_weight += question.weight();
        }
    }

    Some(CategoryProgress {
        category_id: category.id().clone(),
        answered,
        total: u32::try_from(questions.len()).unwrap_or(u32::MAX),
        percent: 100.0 * answered_weight / total_weight,
    })
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::answers::AnswerValue;
    use crate::catalog::{Catalog, Category, Question, QuestionKind};
    use crate::model::ids::QuestionId;

    fn text_question(id: &str, category: &str, weight: f64) -> Question {
        Question::new(
            id,
            "Title",
            None,
            QuestionKind::Text,
            vec![],
            category,
            weight,
        )
        .unwrap()
    }

    fn single_category_catalog() -> Catalog {
        let questions = (1..=5)
            .map(|i| text_question(&format!("q{i}"), "background", 1.0))
            .collect();
        let background =
            Category::new("background", "Background", None, 1.0, None, questions).unwrap();
        Catalog::new(vec![background]).unwrap()
    }

    fn answered(ids: &[&str]) -> BTreeMap<QuestionId, AnswerValue> {
        ids.iter()
            .map(|&id| (QuestionId::new(id), AnswerValue::Text("yes".to_owned())))
            .collect()
    }

    #[test]
    fn three_of_five_equal_weights_is_sixty_percent() {
        let catalog = single_category_catalog();
        let answers = AnswerMap::new()
            .merge(&catalog, answered(&["q1", "q2", "q3"]))
            .unwrap();

        let report = compute_progress(&catalog, &answers);
        assert_eq!(report.categories.len(), 1);
        let background = &report.categories[0];
        assert_eq!(background.answered, 3);
        assert_eq!(background.total, 5);
        assert!((background.percent - 60.0).abs() < 1e-9);
        assert!((report.overall - 60.0).abs() < 1e-9);
    }

    #[test]
    fn incremental_merges_rescore_consistently() {
        let catalog = single_category_catalog();
        let sitting_one = AnswerMap::new()
            .merge(&catalog, answered(&["q1", "q2"]))
            .unwrap();
        assert!((compute_progress(&catalog, &sitting_one).overall - 40.0).abs() < 1e-9);

        // a later sitting re-answers q2 and adds q3; the score reflects
        // the merged map, not the submissions
        let sitting_two = sitting_one
            .merge(&catalog, answered(&["q2", "q3"]))
            .unwrap();
        let report = compute_progress(&catalog, &sitting_two);
        assert_eq!(report.categories[0].answered, 3);
        assert!((report.overall - 60.0).abs() < 1e-9);
    }

    #[test]
    fn computation_is_pure() {
        let catalog = single_category_catalog();
        let answers = AnswerMap::new()
            .merge(&catalog, answered(&["q1", "q4"]))
            .unwrap();

        let a = compute_progress(&catalog, &answers);
        let b = compute_progress(&catalog, &answers);
        assert_eq!(a, b);
    }

    #[test]
    fn question_weights_skew_category_percent() {
        let questions = vec![
            text_question("heavy", "c", 3.0),
            text_question("light", "c", 1.0),
        ];
        let category = Category::new("c", "C", None, 1.0, None, questions).unwrap();
        let catalog = Catalog::new(vec![category]).unwrap();

        let answers = AnswerMap::new()
            .merge(&catalog, answered(&["heavy"]))
            .unwrap();
        let report = compute_progress(&catalog, &answers);
        assert!((report.categories[0].percent - 75.0).abs() < 1e-9);
    }

    #[test]
    fn category_weights_skew_overall() {
        let a = Category::new("a", "A", None, 1.0, None, vec![text_question("qa", "a", 1.0)])
            .unwrap();
        let b = Category::new("b", "B", None, 3.0, None, vec![text_question("qb", "b", 1.0)])
            .unwrap();
        let catalog = Catalog::new(vec![a, b]).unwrap();

        // only the heavy category is complete: overall = 100 * 3 / (1 + 3)
        let answers = AnswerMap::new().merge(&catalog, answered(&["qb"])).unwrap();
        let report = compute_progress(&catalog, &answers);
        assert!((report.overall - 75.0).abs() < 1e-9);
    }

    #[test]
    fn empty_category_is_excluded_everywhere() {
        let scored =
            Category::new("a", "A", None, 1.0, None, vec![text_question("qa", "a", 1.0)]).unwrap();
        let empty = Category::new("b", "B", None, 100.0, None, vec![]).unwrap();
        let catalog = Catalog::new(vec![scored, empty]).unwrap();

        let answers = AnswerMap::new().merge(&catalog, answered(&["qa"])).unwrap();
        let report = compute_progress(&catalog, &answers);
        assert_eq!(report.categories.len(), 1);
        assert_eq!(report.categories[0].category_id.as_str(), "a");
        assert!((report.overall - 100.0).abs() < 1e-9);
    }

    #[test]
    fn no_scorable_categories_yields_zero_overall() {
        let empty = Category::new("b", "B", None, 1.0, None, vec![]).unwrap();
        let catalog = Catalog::new(vec![empty]).unwrap();
        let report = compute_progress(&catalog, &AnswerMap::new());
        assert!(report.categories.is_empty());
        assert!((report.overall - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn blank_and_empty_answers_do_not_count() {
        let catalog = single_category_catalog();
        let incoming = BTreeMap::from([
            (QuestionId::new("q1"), AnswerValue::Text("  ".to_owned())),
            (QuestionId::new("q2"), AnswerValue::Text("real".to_owned())),
        ]);
        let answers = AnswerMap::new().merge(&catalog, incoming).unwrap();

        let report = compute_progress(&catalog, &answers);
        assert_eq!(report.categories[0].answered, 1);
        assert!((report.categories[0].percent - 20.0).abs() < 1e-9);
    }

    #[test]
    fn report_serializes_for_snapshots() {
        let catalog = single_category_catalog();
        let answers = AnswerMap::new().merge(&catalog, answered(&["q1"])).unwrap();
        let report = compute_progress(&catalog, &answers);

        let json = serde_json::to_string(&report).unwrap();
        let back: ProgressReport = serde_json::from_str(&json).unwrap();
        assert_eq!(report, back);
    }
}
