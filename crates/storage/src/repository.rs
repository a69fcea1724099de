use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use gather_core::answers::{AnswerMap, AnswerValue};
use gather_core::catalog::Catalog;
use gather_core::geo::{GeoCell, GeoPoint};
use gather_core::model::{Experience, ExperienceId, Profile, QuestionId, UserId};
use gather_core::progress::ProgressReport;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    /// A conditional update lost the race: the row changed since it was
    /// read. The caller re-reads and retries or gives up.
    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

//
// ─── RECORDS ───────────────────────────────────────────────────────────────────
//

/// Persisted shape of a profile.
///
/// Answers are stored in their wire form (question id to string-or-list) and
/// re-validated against the catalog on the way back into the domain, so a
/// stale or hand-edited row cannot smuggle an invalid map past the rules.
/// The progress snapshot is display-only and never read back for scoring.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileRecord {
    pub user_id: UserId,
    pub display_name: String,
    pub bio: Option<String>,
    pub location: Option<GeoPoint>,
    pub answers: BTreeMap<QuestionId, AnswerValue>,
    pub progress: Option<ProgressReport>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProfileRecord {
    #[must_use]
    pub fn from_profile(profile: &Profile, progress: Option<ProgressReport>) -> Self {
        Self {
            user_id: profile.user_id().clone(),
            display_name: profile.display_name().to_owned(),
            bio: profile.bio().map(str::to_owned),
            location: profile.location(),
            answers: profile.answers().to_wire(),
            progress,
            created_at: profile.created_at(),
            updated_at: profile.updated_at(),
        }
    }

    /// Convert the record back into a domain `Profile`.
    ///
    /// # Errors
    ///
    /// Returns a core error if the presentation fields fail validation or a
    /// stored answer no longer matches the catalog.
    pub fn into_profile(self, catalog: &Catalog) -> Result<Profile, gather_core::Error> {
        let answers = AnswerMap::from_wire(catalog, self.answers)?;
        let profile = Profile::from_persisted(
            self.user_id,
            self.display_name,
            self.bio,
            self.location,
            answers,
            self.created_at,
            self.updated_at,
        )?;
        Ok(profile)
    }
}

/// Persisted shape of an experience plus its interested-user set.
#[derive(Debug, Clone, PartialEq)]
pub struct ExperienceRecord {
    pub id: ExperienceId,
    pub host: UserId,
    pub title: String,
    pub description: Option<String>,
    pub location: GeoPoint,
    pub cell: GeoCell,
    pub starts_at: DateTime<Utc>,
    pub max_guests: Option<u32>,
    pub interested: BTreeSet<UserId>,
    pub created_at: DateTime<Utc>,
}

impl ExperienceRecord {
    #[must_use]
    pub fn from_experience(experience: &Experience) -> Self {
        Self {
            id: experience.id(),
            host: experience.host().clone(),
            title: experience.title().to_owned(),
            description: experience.description().map(str::to_owned),
            location: experience.location(),
            cell: experience.cell().clone(),
            starts_at: experience.starts_at(),
            max_guests: experience.max_guests(),
            interested: experience.interested().clone(),
            created_at: experience.created_at(),
        }
    }

    /// Convert the record back into a domain `Experience`.
    ///
    /// # Errors
    ///
    /// Returns a core error if stored fields fail domain validation.
    pub fn into_experience(self) -> Result<Experience, gather_core::Error> {
        let experience = Experience::from_persisted(
            self.id,
            self.host,
            self.title,
            self.description,
            self.location,
            self.cell,
            self.starts_at,
            self.max_guests,
            self.interested,
            self.created_at,
        )?;
        Ok(experience)
    }
}

//
// ─── REPOSITORY CONTRACTS ──────────────────────────────────────────────────────
//

/// Repository contract for user profiles.
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    /// Persist a profile unconditionally (create or replace).
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the profile cannot be stored.
    async fn upsert_profile(&self, record: &ProfileRecord) -> Result<(), StorageError>;

    /// Persist a profile only if the stored row still carries
    /// `expected_updated_at`. This is the compare-and-swap bound for
    /// read-modify-write flows such as an answer merge.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the row is gone and
    /// `StorageError::Conflict` if it changed since the read.
    async fn update_profile(
        &self,
        record: &ProfileRecord,
        expected_updated_at: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    /// Fetch a profile by user id; `Ok(None)` when absent.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on adapter failures.
    async fn get_profile(&self, user_id: &UserId) -> Result<Option<ProfileRecord>, StorageError>;

    /// Remove a profile and everything hanging off it.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if no such profile exists.
    async fn delete_profile(&self, user_id: &UserId) -> Result<(), StorageError>;
}

/// Repository contract for experiences.
#[async_trait]
pub trait ExperienceRepository: Send + Sync {
    /// Persist a new experience.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the id already exists.
    async fn insert_experience(&self, record: &ExperienceRecord) -> Result<(), StorageError>;

    /// Fetch an experience by id; `Ok(None)` when absent.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on adapter failures.
    async fn get_experience(
        &self,
        id: ExperienceId,
    ) -> Result<Option<ExperienceRecord>, StorageError>;

    /// Fetch experiences whose cell is in the given set, soonest first.
    ///
    /// This is the coarse filter for "nearby" queries; the caller ranks the
    /// result precisely by distance.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on adapter failures.
    async fn list_by_cells(
        &self,
        cells: &[GeoCell],
        limit: u32,
    ) -> Result<Vec<ExperienceRecord>, StorageError>;

    /// Record a user's interest in an experience. Idempotent.
    ///
    /// The capacity check happens inside the write, so two callers racing
    /// for the last seat cannot both land.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the experience does not exist,
    /// or `StorageError::Conflict` if the guest list is already at
    /// `max_guests`.
    async fn add_interest(
        &self,
        id: ExperienceId,
        user: &UserId,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    /// Remove a user's interest. A no-op if none was recorded.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the experience does not exist.
    async fn remove_interest(&self, id: ExperienceId, user: &UserId)
    -> Result<(), StorageError>;
}

//
// ─── IN-MEMORY ─────────────────────────────────────────────────────────────────
//

/// Simple in-memory implementation for tests and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    profiles: Arc<Mutex<HashMap<UserId, ProfileRecord>>>,
    experiences: Arc<Mutex<HashMap<ExperienceId, ExperienceRecord>>>,
}

impl InMemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProfileRepository for InMemoryStorage {
    async fn upsert_profile(&self, record: &ProfileRecord) -> Result<(), StorageError> {
        let mut guard = self
            .profiles
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(record.user_id.clone(), record.clone());
        Ok(())
    }

    async fn update_profile(
        &self,
        record: &ProfileRecord,
        expected_updated_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut guard = self
            .profiles
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let existing = guard.get(&record.user_id).ok_or(StorageError::NotFound)?;
        if existing.updated_at != expected_updated_at {
            return Err(StorageError::Conflict);
        }
        guard.insert(record.user_id.clone(), record.clone());
        Ok(())
    }

    async fn get_profile(&self, user_id: &UserId) -> Result<Option<ProfileRecord>, StorageError> {
        let guard = self
            .profiles
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(user_id).cloned())
    }

    async fn delete_profile(&self, user_id: &UserId) -> Result<(), StorageError> {
        let mut guard = self
            .profiles
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.remove(user_id).ok_or(StorageError::NotFound)?;
        Ok(())
    }
}

#[async_trait]
impl ExperienceRepository for InMemoryStorage {
    async fn insert_experience(&self, record: &ExperienceRecord) -> Result<(), StorageError> {
        let mut guard = self
            .experiences
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        if guard.contains_key(&record.id) {
            return Err(StorageError::Conflict);
        }
        guard.insert(record.id, record.clone());
        Ok(())
    }

    async fn get_experience(
        &self,
        id: ExperienceId,
    ) -> Result<Option<ExperienceRecord>, StorageError> {
        let guard = self
            .experiences
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(&id).cloned())
    }

    async fn list_by_cells(
        &self,
        cells: &[GeoCell],
        limit: u32,
    ) -> Result<Vec<ExperienceRecord>, StorageError> {
        let guard = self
            .experiences
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let mut matching: Vec<ExperienceRecord> = guard
            .values()
            .filter(|r| cells.contains(&r.cell))
            .cloned()
            .collect();
        matching.sort_by_key(|r| r.starts_at);
        matching.truncate(limit as usize);
        Ok(matching)
    }

    async fn add_interest(
        &self,
        id: ExperienceId,
        user: &UserId,
        _at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut guard = self
            .experiences
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let record = guard.get_mut(&id).ok_or(StorageError::NotFound)?;
        if record.interested.contains(user) {
            return Ok(());
        }
        if let Some(max) = record.max_guests {
            if record.interested.len() >= max as usize {
                return Err(StorageError::Conflict);
            }
        }
        record.interested.insert(user.clone());
        Ok(())
    }

    async fn remove_interest(
        &self,
        id: ExperienceId,
        user: &UserId,
    ) -> Result<(), StorageError> {
        let mut guard = self
            .experiences
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let record = guard.get_mut(&id).ok_or(StorageError::NotFound)?;
        record.interested.remove(user);
        Ok(())
    }
}

//
// ─── STORAGE AGGREGATE ─────────────────────────────────────────────────────────
//

/// Aggregates the repositories behind trait objects for easy backend
/// swapping.
#[derive(Clone)]
pub struct Storage {
    pub profiles: Arc<dyn ProfileRepository>,
    pub experiences: Arc<dyn ExperienceRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryStorage::new();
        let profiles: Arc<dyn ProfileRepository> = Arc::new(repo.clone());
        let experiences: Arc<dyn ExperienceRepository> = Arc::new(repo);
        Self {
            profiles,
            experiences,
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
