use thiserror::Error;

use crate::answers::AnswerError;
use crate::catalog::CatalogError;
use crate::geo::GeoError;
use crate::model::{ExperienceError, ProfileError};

/// Umbrella error for callers that do not care which core rule failed.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Answers(#[from] AnswerError),
    #[error(transparent)]
    Geo(#[from] GeoError),
    #[error(transparent)]
    Profile(#[from] ProfileError),
    #[error(transparent)]
    Experience(#[from] ExperienceError),
}
