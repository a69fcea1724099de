use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::answers::AnswerMap;
use crate::geo::GeoPoint;
use crate::model::ids::UserId;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProfileError {
    #[error("user id cannot be empty")]
    EmptyUserId,

    #[error("display name cannot be empty")]
    EmptyDisplayName,
}

//
// ─── PROFILE ───────────────────────────────────────────────────────────────────
//

/// A user's profile: identity handle, presentation fields, optional
/// location, and the stored answer map.
///
/// The answer map only ever changes through a merge; callers persist the
/// whole profile atomically after each update.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    user_id: UserId,
    display_name: String,
    bio: Option<String>,
    location: Option<GeoPoint>,
    answers: AnswerMap,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Profile {
    /// Creates a fresh profile with no answers.
    ///
    /// # Errors
    ///
    /// Returns `ProfileError` if the user id or display name is empty or
    /// whitespace-only.
    pub fn new(
        user_id: UserId,
        display_name: impl Into<String>,
        bio: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, ProfileError> {
        Self::from_persisted(
            user_id,
            display_name,
            bio,
            None,
            AnswerMap::new(),
            created_at,
            created_at,
        )
    }

    /// Rebuilds a profile from storage.
    ///
    /// # Errors
    ///
    /// Same validation as [`Profile::new`].
    pub fn from_persisted(
        user_id: UserId,
        display_name: impl Into<String>,
        bio: Option<String>,
        location: Option<GeoPoint>,
        answers: AnswerMap,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<Self, ProfileError> {
        if user_id.as_str().trim().is_empty() {
            return Err(ProfileError::EmptyUserId);
        }
        let display_name = display_name.into();
        if display_name.trim().is_empty() {
            return Err(ProfileError::EmptyDisplayName);
        }

        let bio = bio.map(|b| b.trim().to_owned()).filter(|b| !b.is_empty());

        Ok(Self {
            user_id,
            display_name: display_name.trim().to_owned(),
            bio,
            location,
            answers,
            created_at,
            updated_at,
        })
    }

    // Accessors
    #[must_use]
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    #[must_use]
    pub fn bio(&self) -> Option<&str> {
        self.bio.as_deref()
    }

    #[must_use]
    pub fn location(&self) -> Option<GeoPoint> {
        self.location
    }

    #[must_use]
    pub fn answers(&self) -> &AnswerMap {
        &self.answers
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns the profile with new presentation fields.
    ///
    /// # Errors
    ///
    /// Returns `ProfileError::EmptyDisplayName` if the new name is blank.
    pub fn with_details(
        self,
        display_name: impl Into<String>,
        bio: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, ProfileError> {
        Self::from_persisted(
            self.user_id,
            display_name,
            bio,
            self.location,
            self.answers,
            self.created_at,
            now,
        )
    }

    /// Returns the profile with its location replaced (or cleared).
    #[must_use]
    pub fn with_location(mut self, location: Option<GeoPoint>, now: DateTime<Utc>) -> Self {
        self.location = location;
        self.updated_at = now;
        self
    }

    /// Returns the profile carrying a merged answer map.
    #[must_use]
    pub fn with_answers(mut self, answers: AnswerMap, now: DateTime<Utc>) -> Self {
        self.answers = answers;
        self.updated_at = now;
        self
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
