use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use gather_core::answers::AnswerValue;
use gather_core::catalog::{Catalog, Category, QuestionKind};
use gather_core::model::{CategoryId, Profile, QuestionId, UserId};
use gather_core::progress::{ProgressReport, compute_progress};
use storage::repository::{ProfileRecord, ProfileRepository};

use crate::Clock;
use crate::error::QuestionnaireServiceError;

//
// ─── VIEWS ─────────────────────────────────────────────────────────────────────
//

/// The catalog joined with one user's answers, shaped for the wire.
///
/// An unanswered question carries `answer: None`, which serializes as an
/// explicit `null` rather than being omitted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionnaireView {
    pub categories: Vec<CategoryView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryView {
    pub id: CategoryId,
    pub name: String,
    pub description: Option<String>,
    pub weight: f64,
    pub image_url: Option<String>,
    pub questions: Vec<QuestionView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionView {
    pub id: QuestionId,
    pub title: String,
    pub description: Option<String>,
    pub kind: QuestionKind,
    pub options: Vec<String>,
    pub category_id: CategoryId,
    pub category_name: String,
    pub weight: f64,
    pub answer: Option<AnswerValue>,
}

/// Result of an answer submission: the updated profile and the freshly
/// recomputed report that was persisted alongside it.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionOutcome {
    pub profile: Profile,
    pub report: ProgressReport,
}

//
// ─── SERVICE ───────────────────────────────────────────────────────────────────
//

/// Applies partial answer submissions and keeps completion scores current.
#[derive(Clone)]
pub struct QuestionnaireService {
    clock: Clock,
    catalog: Arc<Catalog>,
    profiles: Arc<dyn ProfileRepository>,
}

impl QuestionnaireService {
    #[must_use]
    pub fn new(clock: Clock, catalog: Arc<Catalog>, profiles: Arc<dyn ProfileRepository>) -> Self {
        Self {
            clock,
            catalog,
            profiles,
        }
    }

    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Merge a partial answer map into the user's stored answers, recompute
    /// the weighted completion, and persist both in one conditional write.
    ///
    /// The merge is all-or-nothing: any invalid entry rejects the whole
    /// call and the stored map is untouched.
    ///
    /// # Errors
    ///
    /// Returns `QuestionnaireServiceError::NotFound` when the profile does
    /// not exist, `Answers` for an unknown question or shape mismatch, and
    /// `Storage(StorageError::Conflict)` when another writer updated the
    /// profile between read and write.
    pub async fn submit_answers(
        &self,
        user_id: &UserId,
        incoming: BTreeMap<QuestionId, AnswerValue>,
    ) -> Result<SubmissionOutcome, QuestionnaireServiceError> {
        let profile = self.load(user_id).await?;
        let seen_at = profile.updated_at();

        let merged = profile.answers().merge(&self.catalog, incoming)?;
        let updated = profile.with_answers(merged, self.clock.now());
        let report = compute_progress(&self.catalog, updated.answers());

        self.profiles
            .update_profile(
                &ProfileRecord::from_profile(&updated, Some(report.clone())),
                seen_at,
            )
            .await?;

        info!(
            user_id = %user_id,
            answered = updated.answers().len(),
            overall = report.overall,
            "merged answers"
        );
        Ok(SubmissionOutcome {
            profile: updated,
            report,
        })
    }

    /// Recompute the user's completion report from the stored answers.
    ///
    /// Always derived from catalog + answers, never read back from the
    /// persisted snapshot.
    ///
    /// # Errors
    ///
    /// Returns `QuestionnaireServiceError::NotFound` when the profile does
    /// not exist, or `Storage` if repository access fails.
    pub async fn progress(
        &self,
        user_id: &UserId,
    ) -> Result<ProgressReport, QuestionnaireServiceError> {
        let profile = self.load(user_id).await?;
        Ok(compute_progress(&self.catalog, profile.answers()))
    }

    /// The full questionnaire for a user: every category and question with
    /// the user's current answer, or `None` where unanswered.
    ///
    /// # Errors
    ///
    /// Returns `QuestionnaireServiceError::NotFound` when the profile does
    /// not exist, or `Storage` if repository access fails.
    pub async fn questionnaire(
        &self,
        user_id: &UserId,
    ) -> Result<QuestionnaireView, QuestionnaireServiceError> {
        let profile = self.load(user_id).await?;

        let categories = self
            .catalog
            .categories()
            .iter()
            .map(|category| Self::category_view(category, &profile))
            .collect();

        Ok(QuestionnaireView { categories })
    }

    /// One category of the questionnaire, with the user's answers filled in.
    ///
    /// # Errors
    ///
    /// Returns `QuestionnaireServiceError::UnknownCategory` for an id not in
    /// the catalog, `NotFound` when the profile does not exist, or `Storage`
    /// if repository access fails.
    pub async fn category(
        &self,
        user_id: &UserId,
        category_id: &CategoryId,
    ) -> Result<CategoryView, QuestionnaireServiceError> {
        let profile = self.load(user_id).await?;
        let category = self
            .catalog
            .category(category_id)
            .ok_or_else(|| QuestionnaireServiceError::UnknownCategory(category_id.clone()))?;
        Ok(Self::category_view(category, &profile))
    }

    fn category_view(category: &Category, profile: &Profile) -> CategoryView {
        CategoryView {
            id: category.id().clone(),
            name: category.name().to_owned(),
            description: category.description().map(str::to_owned),
            weight: category.weight(),
            image_url: category.image_url().map(ToString::to_string),
            questions: category
                .questions()
                .iter()
                .map(|question| QuestionView {
                    id: question.id().clone(),
                    title: question.title().to_owned(),
                    description: question.description().map(str::to_owned),
                    kind: question.kind(),
                    options: question.options().to_vec(),
                    category_id: category.id().clone(),
                    category_name: category.name().to_owned(),
                    weight: question.weight(),
                    answer: profile.answers().get(question.id()).map(|a| a.to_value()),
                })
                .collect(),
        }
    }

    async fn load(&self, user_id: &UserId) -> Result<Profile, QuestionnaireServiceError> {
        let record = self
            .profiles
            .get_profile(user_id)
            .await?
            .ok_or(QuestionnaireServiceError::NotFound)?;
        record
            .into_profile(&self.catalog)
            .map_err(QuestionnaireServiceError::InvalidStoredProfile)
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
