use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::model::ids::{CategoryId, QuestionId};

/// Default weight for categories and questions that do not configure one.
pub const DEFAULT_WEIGHT: f64 = 1.0;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

/// Catalog configuration errors. All of these are load-time failures: a
/// catalog that does not validate must prevent the service from starting.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum CatalogError {
    #[error("category id cannot be empty")]
    EmptyCategoryId,

    #[error("category name cannot be empty")]
    EmptyCategoryName,

    #[error("question id cannot be empty")]
    EmptyQuestionId,

    #[error("question title cannot be empty")]
    EmptyQuestionTitle,

    #[error("duplicate category id `{0}`")]
    DuplicateCategoryId(CategoryId),

    #[error("duplicate question id `{0}`")]
    DuplicateQuestionId(QuestionId),

    #[error("question `{question_id}` references category `{declared}` but is authored under `{actual}`")]
    DanglingCategoryReference {
        question_id: QuestionId,
        declared: CategoryId,
        actual: CategoryId,
    },

    #[error("weight for `{0}` must be positive and finite")]
    InvalidWeight(String),

    #[error("choice question `{0}` must declare at least one option")]
    MissingOptions(QuestionId),

    #[error("question `{0}` does not take an option list")]
    UnexpectedOptions(QuestionId),
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// The answer contract a question imposes.
///
/// `Text`, `SingleChoice`, and `Rating` answers are a single string;
/// `MultipleChoice` answers are a list of strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionKind {
    Text,
    SingleChoice,
    MultipleChoice,
    Rating,
}

impl QuestionKind {
    /// Whether questions of this kind carry a declared option list.
    #[must_use]
    pub fn has_options(self) -> bool {
        matches!(self, Self::SingleChoice | Self::MultipleChoice)
    }
}

/// A single catalog question.
#[derive(Debug, Clone, PartialEq)]
pub struct Question {
    id: QuestionId,
    title: String,
    description: Option<String>,
    kind: QuestionKind,
    options: Vec<String>,
    category_id: CategoryId,
    weight: f64,
}

impl Question {
    /// Creates a new question.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError` if the id or title is blank, the weight is not
    /// positive and finite, or the option list does not match the kind
    /// (choice kinds require at least one option, other kinds none).
    pub fn new(
        id: impl Into<QuestionId>,
        title: impl Into<String>,
        description: Option<String>,
        kind: QuestionKind,
        options: Vec<String>,
        category_id: impl Into<CategoryId>,
        weight: f64,
    ) -> Result<Self, CatalogError> {
        let id = id.into();
        let title = title.into();
        if id.as_str().trim().is_empty() {
            return Err(CatalogError::EmptyQuestionId);
        }
        if title.trim().is_empty() {
            return Err(CatalogError::EmptyQuestionTitle);
        }
        if !weight.is_finite() || weight <= 0.0 {
            return Err(CatalogError::InvalidWeight(id.as_str().to_owned()));
        }
        if kind.has_options() && options.is_empty() {
            return Err(CatalogError::MissingOptions(id));
        }
        if !kind.has_options() && !options.is_empty() {
            return Err(CatalogError::UnexpectedOptions(id));
        }

        let description = description
            .map(|d| d.trim().to_owned())
            .filter(|d| !d.is_empty());

        Ok(Self {
            id,
            title: title.trim().to_owned(),
            description,
            kind,
            options,
            category_id: category_id.into(),
            weight,
        })
    }

    // Accessors
    #[must_use]
    pub fn id(&self) -> &QuestionId {
        &self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    #[must_use]
    pub fn kind(&self) -> QuestionKind {
        self.kind
    }

    /// Declared options; empty for non-choice kinds.
    #[must_use]
    pub fn options(&self) -> &[String] {
        &self.options
    }

    #[must_use]
    pub fn category_id(&self) -> &CategoryId {
        &self.category_id
    }

    #[must_use]
    pub fn weight(&self) -> f64 {
        self.weight
    }
}

//
// ─── CATEGORY ──────────────────────────────────────────────────────────────────
//

/// A catalog category: an ordered group of questions with a scoring weight.
#[derive(Debug, Clone, PartialEq)]
pub struct Category {
    id: CategoryId,
    name: String,
    description: Option<String>,
    weight: f64,
    image_url: Option<Url>,
    questions: Vec<Question>,
}

impl Category {
    /// Creates a new category embedding its questions in authored order.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError` if the id or name is blank, the weight is not
    /// positive and finite, or any question declares a category id other
    /// than this category's (a dangling reference).
    pub fn new(
        id: impl Into<CategoryId>,
        name: impl Into<String>,
        description: Option<String>,
        weight: f64,
        image_url: Option<Url>,
        questions: Vec<Question>,
    ) -> Result<Self, CatalogError> {
        let id = id.into();
        let name = name.into();
        if id.as_str().trim().is_empty() {
            return Err(CatalogError::EmptyCategoryId);
        }
        if name.trim().is_empty() {
            return Err(CatalogError::EmptyCategoryName);
        }
        if !weight.is_finite() || weight <= 0.0 {
            return Err(CatalogError::InvalidWeight(id.as_str().to_owned()));
        }
        for question in &questions {
            if question.category_id() != &id {
                return Err(CatalogError::DanglingCategoryReference {
                    question_id: question.id().clone(),
                    declared: question.category_id().clone(),
                    actual: id,
                });
            }
        }

        let description = description
            .map(|d| d.trim().to_owned())
            .filter(|d| !d.is_empty());

        Ok(Self {
            id,
            name: name.trim().to_owned(),
            description,
            weight,
            image_url,
            questions,
        })
    }

    // Accessors
    #[must_use]
    pub fn id(&self) -> &CategoryId {
        &self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    #[must_use]
    pub fn weight(&self) -> f64 {
        self.weight
    }

    #[must_use]
    pub fn image_url(&self) -> Option<&Url> {
        self.image_url.as_ref()
    }

    /// Questions in authored order.
    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }
}

//
// ─── CATALOG ───────────────────────────────────────────────────────────────────
//

/// The immutable set of categories and questions used for scoring.
///
/// Built once at process initialization and passed explicitly to the
/// components that need it; it never mutates after load, so it is safe to
/// share across threads without locking.
#[derive(Debug, Clone, PartialEq)]
pub struct Catalog {
    categories: Vec<Category>,
    // question id -> (category index, question index)
    index: HashMap<QuestionId, (usize, usize)>,
}

impl Catalog {
    /// Validates and assembles a catalog.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError` on duplicate category ids or duplicate question
    /// ids anywhere in the catalog. Per-category and per-question invariants
    /// (blank ids, weights, option lists, dangling references) are enforced
    /// by the `Category` and `Question` constructors.
    pub fn new(categories: Vec<Category>) -> Result<Self, CatalogError> {
        let mut index = HashMap::new();
        let mut seen_categories = HashMap::new();
        for (ci, category) in categories.iter().enumerate() {
            if seen_categories.insert(category.id().clone(), ci).is_some() {
                return Err(CatalogError::DuplicateCategoryId(category.id().clone()));
            }
            for (qi, question) in category.questions().iter().enumerate() {
                if index.insert(question.id().clone(), (ci, qi)).is_some() {
                    return Err(CatalogError::DuplicateQuestionId(question.id().clone()));
                }
            }
        }
        Ok(Self { categories, index })
    }

    /// Categories in authored order.
    #[must_use]
    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    /// Looks up a category by id. `None` when absent; the calling layer
    /// decides how to surface the miss.
    #[must_use]
    pub fn category(&self, id: &CategoryId) -> Option<&Category> {
        self.categories.iter().find(|c| c.id() == id)
    }

    /// Looks up a question by id anywhere in the catalog.
    #[must_use]
    pub fn question(&self, id: &QuestionId) -> Option<&Question> {
        self.index
            .get(id)
            .map(|&(ci, qi)| &self.categories[ci].questions()[qi])
    }

    /// Sum of weights of categories that contain at least one question.
    ///
    /// Empty categories never participate in the overall score.
    #[must_use]
    pub fn total_weight(&self) -> f64 {
        self.categories
            .iter()
            .filter(|c| !c.questions().is_empty())
            .map(Category::weight)
            .sum()
    }

    /// Total number of questions across all categories.
    #[must_use]
    pub fn question_count(&self) -> usize {
        self.index.len()
    }

    /// The hand-authored default catalog shipped with the service.
    ///
    /// # Panics
    ///
    /// Panics if the built-in definition fails validation, which would be a
    /// programming error caught by the test suite.
    #[must_use]
    pub fn builtin() -> Self {
        builtin_catalog().expect("built-in catalog must be valid")
    }
}

fn builtin_catalog() -> Result<Catalog, CatalogError> {
    let choices = |options: &[&str]| options.iter().map(|&o| o.to_owned()).collect::<Vec<_>>();

    let background = Category::new(
        "background",
        "Background",
        Some("Where you come from".to_owned()),
        1.0,
        None,
        vec![
            Question::new(
                "home_town",
                "Which city did you grow up in?",
                None,
                QuestionKind::Text,
                vec![],
                "background",
                1.0,
            )?,
            Question::new(
                "sibling_order",
                "Where do you fall among your siblings?",
                None,
                QuestionKind::SingleChoice,
                choices(&["Oldest", "Middle", "Youngest", "Only child"]),
                "background",
                1.0,
            )?,
            Question::new(
                "languages",
                "Which languages do you speak?",
                None,
                QuestionKind::MultipleChoice,
                choices(&["English", "Hindi", "Marathi", "Tamil", "Bengali", "Other"]),
                "background",
                1.0,
            )?,
            Question::new(
                "education",
                "What did you study?",
                None,
                QuestionKind::Text,
                vec![],
                "background",
                1.0,
            )?,
            Question::new(
                "family_closeness",
                "How close are you to your family?",
                None,
                QuestionKind::Rating,
                vec![],
                "background",
                1.0,
            )?,
        ],
    )?;

    let lifestyle = Category::new(
        "lifestyle",
        "Lifestyle",
        Some("Day-to-day habits".to_owned()),
        1.5,
        None,
        vec![
            Question::new(
                "diet",
                "How would you describe your diet?",
                None,
                QuestionKind::SingleChoice,
                choices(&["Vegetarian", "Vegan", "Eggetarian", "Non-vegetarian"]),
                "lifestyle",
                1.0,
            )?,
            Question::new(
                "smoking",
                "Do you smoke?",
                None,
                QuestionKind::SingleChoice,
                choices(&["Never", "Socially", "Regularly"]),
                "lifestyle",
                1.0,
            )?,
            Question::new(
                "drinking",
                "Do you drink?",
                None,
                QuestionKind::SingleChoice,
                choices(&["Never", "Socially", "Regularly"]),
                "lifestyle",
                1.0,
            )?,
            Question::new(
                "fitness",
                "How active are you?",
                Some("1 is couch, 5 is marathon".to_owned()),
                QuestionKind::Rating,
                vec![],
                "lifestyle",
                2.0,
            )?,
        ],
    )?;

    let interests = Category::new(
        "interests",
        "Interests",
        Some("What you would share with others".to_owned()),
        2.0,
        None,
        vec![
            Question::new(
                "hobbies",
                "Pick the hobbies you actually make time for",
                None,
                QuestionKind::MultipleChoice,
                choices(&[
                    "Cooking", "Trekking", "Photography", "Reading", "Gaming", "Music", "Cricket",
                ]),
                "interests",
                2.0,
            )?,
            Question::new(
                "ideal_weekend",
                "Describe your ideal weekend",
                None,
                QuestionKind::Text,
                vec![],
                "interests",
                1.0,
            )?,
            Question::new(
                "travel_style",
                "What kind of traveller are you?",
                None,
                QuestionKind::SingleChoice,
                choices(&["Planner", "Spontaneous", "Homebody", "Workationer"]),
                "interests",
                1.0,
            )?,
        ],
    )?;

    Catalog::new(vec![background, lifestyle, interests])
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
