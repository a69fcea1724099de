//! Shared error types for the services crate.

use thiserror::Error;

use gather_core::answers::AnswerError;
use gather_core::geo::GeoError;
use gather_core::model::{CategoryId, ExperienceError, ProfileError};
use storage::repository::StorageError;

/// Errors emitted by `ProfileService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProfileServiceError {
    #[error("profile not found")]
    NotFound,
    #[error("stored profile is no longer valid: {0}")]
    InvalidStoredProfile(#[source] gather_core::Error),
    #[error(transparent)]
    Profile(#[from] ProfileError),
    #[error(transparent)]
    Geo(#[from] GeoError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `QuestionnaireService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QuestionnaireServiceError {
    #[error("profile not found")]
    NotFound,
    #[error("category {0} is not in the catalog")]
    UnknownCategory(CategoryId),
    #[error("stored profile is no longer valid: {0}")]
    InvalidStoredProfile(#[source] gather_core::Error),
    #[error(transparent)]
    Answers(#[from] AnswerError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `DiscoveryService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DiscoveryServiceError {
    #[error("experience not found")]
    NotFound,
    #[error("stored experience is no longer valid: {0}")]
    InvalidStoredExperience(#[source] gather_core::Error),
    #[error(transparent)]
    Experience(#[from] ExperienceError),
    #[error(transparent)]
    Geo(#[from] GeoError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
