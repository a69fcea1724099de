use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::geo::{GeoCell, GeoPoint};
use crate::model::ids::{ExperienceId, UserId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ExperienceError {
    #[error("experience title cannot be empty")]
    EmptyTitle,

    #[error("guest capacity must be > 0 when set")]
    InvalidCapacity,

    #[error("the host cannot register interest in their own experience")]
    HostInterest,

    #[error("experience is at guest capacity")]
    CapacityReached,
}

//
// ─── EXPERIENCE ────────────────────────────────────────────────────────────────
//

/// A hosted listing that other users can discover nearby and register
/// interest in.
///
/// The cell is derived from the location once at creation with the
/// deployment's configured precision; discovery queries filter on it.
#[derive(Debug, Clone, PartialEq)]
pub struct Experience {
    id: ExperienceId,
    host: UserId,
    title: String,
    description: Option<String>,
    location: GeoPoint,
    cell: GeoCell,
    starts_at: DateTime<Utc>,
    max_guests: Option<u32>,
    interested: BTreeSet<UserId>,
    created_at: DateTime<Utc>,
}

impl Experience {
    /// Creates a new experience with no interested users.
    ///
    /// The caller supplies the cell derived from `location` so that the cell
    /// precision stays a single deployment-level choice.
    ///
    /// # Errors
    ///
    /// Returns `ExperienceError::EmptyTitle` for a blank title and
    /// `ExperienceError::InvalidCapacity` for a zero capacity.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: ExperienceId,
        host: UserId,
        title: impl Into<String>,
        description: Option<String>,
        location: GeoPoint,
        cell: GeoCell,
        starts_at: DateTime<Utc>,
        max_guests: Option<u32>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, ExperienceError> {
        Self::from_persisted(
            id,
            host,
            title,
            description,
            location,
            cell,
            starts_at,
            max_guests,
            BTreeSet::new(),
            created_at,
        )
    }

    /// Rebuilds an experience from storage.
    ///
    /// # Errors
    ///
    /// Same validation as [`Experience::new`].
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        id: ExperienceId,
        host: UserId,
        title: impl Into<String>,
        description: Option<String>,
        location: GeoPoint,
        cell: GeoCell,
        starts_at: DateTime<Utc>,
        max_guests: Option<u32>,
        interested: BTreeSet<UserId>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, ExperienceError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(ExperienceError::EmptyTitle);
        }
        if max_guests == Some(0) {
            return Err(ExperienceError::InvalidCapacity);
        }

        let description = description
            .map(|d| d.trim().to_owned())
            .filter(|d| !d.is_empty());

        Ok(Self {
            id,
            host,
            title: title.trim().to_owned(),
            description,
            location,
            cell,
            starts_at,
            max_guests,
            interested,
            created_at,
        })
    }

    // Accessors
    #[must_use]
    pub fn id(&self) -> ExperienceId {
        self.id
    }

    #[must_use]
    pub fn host(&self) -> &UserId {
        &self.host
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
    pub fn location(&self) -> GeoPoint {
        self.location
    }

    #[must_use]
    pub fn cell(&self) -> &GeoCell {
        &self.cell
    }

    #[must_use]
    pub fn starts_at(&self) -> DateTime<Utc> {
        self.starts_at
    }

    #[must_use]
    pub fn max_guests(&self) -> Option<u32> {
        self.max_guests
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn interested(&self) -> &BTreeSet<UserId> {
        &self.interested
    }

    #[must_use]
    pub fn interest_count(&self) -> usize {
        self.interested.len()
    }

    /// Registers a user's interest. Idempotent for a user already on the
    /// list.
    ///
    /// # Errors
    ///
    /// Returns `ExperienceError::HostInterest` if the host tries to join
    /// their own listing, or `ExperienceError::CapacityReached` when the
    /// guest list is full.
    pub fn register_interest(&mut self, user: UserId) -> Result<(), ExperienceError> {
        if user == self.host {
            return Err(ExperienceError::HostInterest);
        }
        if self.interested.contains(&user) {
            return Ok(());
        }
        if let Some(max) = self.max_guests {
            if self.interested.len() >= max as usize {
                return Err(ExperienceError::CapacityReached);
            }
        }
        self.interested.insert(user);
        Ok(())
    }

    /// Withdraws a user's interest; a no-op for users not on the list.
    pub fn withdraw_interest(&mut self, user: &UserId) {
        self.interested.remove(user);
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::DEFAULT_CELL_PRECISION;
    use crate::time::fixed_now;

    fn sample(max_guests: Option<u32>) -> Experience {
        let location = GeoPoint::new(19.076, 72.8777).unwrap();
        let cell = location.cell(DEFAULT_CELL_PRECISION).unwrap();
        Experience::new(
            ExperienceId::generate(),
            UserId::new("host"),
            "Street food walk",
            Some("Tastings across three markets".to_owned()),
            location,
            cell,
            fixed_now() + chrono::Duration::days(3),
            max_guests,
            fixed_now(),
        )
        .unwrap()
    }

    #[test]
    fn rejects_blank_title() {
        let location = GeoPoint::new(0.0, 0.0).unwrap();
        let cell = location.cell(DEFAULT_CELL_PRECISION).unwrap();
        let err = Experience::new(
            ExperienceId::generate(),
            UserId::new("host"),
            " ",
            None,
            location,
            cell,
            fixed_now(),
            None,
            fixed_now(),
        )
        .unwrap_err();
        assert_eq!(err, ExperienceError::EmptyTitle);
    }

    #[test]
    fn rejects_zero_capacity() {
        let location = GeoPoint::new(0.0, 0.0).unwrap();
        let cell = location.cell(DEFAULT_CELL_PRECISION).unwrap();
        let err = Experience::new(
            ExperienceId::generate(),
            UserId::new("host"),
            "Walk",
            None,
            location,
            cell,
            fixed_now(),
            Some(0),
            fixed_now(),
        )
        .unwrap_err();
        assert_eq!(err, ExperienceError::InvalidCapacity);
    }

    #[test]
    fn interest_is_idempotent_and_capped() {
        let mut exp = sample(Some(2));
        exp.register_interest(UserId::new("a")).unwrap();
        exp.register_interest(UserId::new("a")).unwrap();
        assert_eq!(exp.interest_count(), 1);

        exp.register_interest(UserId::new("b")).unwrap();
        let err = exp.register_interest(UserId::new("c")).unwrap_err();
        assert_eq!(err, ExperienceError::CapacityReached);
    }

    #[test]
    fn host_cannot_join_own_listing() {
        let mut exp = sample(None);
        let err = exp.register_interest(UserId::new("host")).unwrap_err();
        assert_eq!(err, ExperienceError::HostInterest);
    }

    #[test]
    fn withdraw_is_a_no_op_for_strangers() {
        let mut exp = sample(None);
        exp.register_interest(UserId::new("a")).unwrap();
        exp.withdraw_interest(&UserId::new("b"));
        exp.withdraw_interest(&UserId::new("a"));
        assert_eq!(exp.interest_count(), 0);
    }

    #[test]
    fn cell_matches_location() {
        let exp = sample(None);
        assert_eq!(exp.cell().as_str(), "te7ud2");
    }
}
