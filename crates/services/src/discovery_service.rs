use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use gather_core::geo::GeoPoint;
use gather_core::model::{Experience, ExperienceError, ExperienceId, UserId};
use storage::repository::{ExperienceRecord, ExperienceRepository, StorageError};

use crate::Clock;
use crate::config::DiscoveryConfig;
use crate::error::DiscoveryServiceError;

/// An experience returned by a nearby query, with its great-circle
/// distance from the query origin.
#[derive(Debug, Clone, PartialEq)]
pub struct NearbyExperience {
    pub experience: Experience,
    pub distance_km: f64,
}

//
// ─── SERVICE ───────────────────────────────────────────────────────────────────
//

/// Hosts experiences and finds them again by proximity.
///
/// Discovery is two-phase: a coarse cell filter in the repository, then an
/// exact distance ranking here. The cell precision comes from
/// [`DiscoveryConfig`] and is applied at write time too, so listings and
/// queries always agree on cell size.
#[derive(Clone)]
pub struct DiscoveryService {
    clock: Clock,
    config: DiscoveryConfig,
    experiences: Arc<dyn ExperienceRepository>,
}

impl DiscoveryService {
    #[must_use]
    pub fn new(
        clock: Clock,
        config: DiscoveryConfig,
        experiences: Arc<dyn ExperienceRepository>,
    ) -> Self {
        Self {
            clock,
            config,
            experiences,
        }
    }

    #[must_use]
    pub fn config(&self) -> DiscoveryConfig {
        self.config
    }

    /// Create and persist an experience hosted by `host`.
    ///
    /// The cell is derived from the coordinates at the configured precision
    /// before the write.
    ///
    /// # Errors
    ///
    /// Returns `DiscoveryServiceError::Geo` for out-of-range coordinates,
    /// `Experience` for a blank title or zero capacity, and `Storage` if
    /// persistence fails.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_experience(
        &self,
        host: UserId,
        title: &str,
        description: Option<String>,
        lat: f64,
        lon: f64,
        starts_at: DateTime<Utc>,
        max_guests: Option<u32>,
    ) -> Result<Experience, DiscoveryServiceError> {
        let location = GeoPoint::new(lat, lon)?;
        let cell = location.cell(self.config.cell_precision())?;
        let experience = Experience::new(
            ExperienceId::generate(),
            host,
            title,
            description,
            location,
            cell,
            starts_at,
            max_guests,
            self.clock.now(),
        )?;

        self.experiences
            .insert_experience(&ExperienceRecord::from_experience(&experience))
            .await?;
        info!(
            experience_id = %experience.id(),
            cell = %experience.cell(),
            "created experience"
        );
        Ok(experience)
    }

    /// Fetch a single experience by id.
    ///
    /// # Errors
    ///
    /// Returns `DiscoveryServiceError::NotFound` when absent, or `Storage`
    /// if repository access fails.
    pub async fn get_experience(
        &self,
        id: ExperienceId,
    ) -> Result<Experience, DiscoveryServiceError> {
        self.load(id).await
    }

    /// Experiences within the configured radius of the given coordinates,
    /// closest first.
    ///
    /// Candidates come from the 3x3 cell block around the origin; anything
    /// outside that block is never considered, so the radius should not
    /// exceed what the block covers at the configured precision.
    ///
    /// # Errors
    ///
    /// Returns `DiscoveryServiceError::Geo` for out-of-range coordinates,
    /// `InvalidStoredExperience` if a stored row no longer validates, or
    /// `Storage` if repository access fails.
    pub async fn nearby(
        &self,
        lat: f64,
        lon: f64,
    ) -> Result<Vec<NearbyExperience>, DiscoveryServiceError> {
        let origin = GeoPoint::new(lat, lon)?;
        let cells: Vec<_> = origin
            .neighbor_cells(self.config.cell_precision())?
            .into_iter()
            .collect();

        let records = self
            .experiences
            .list_by_cells(&cells, self.config.max_results())
            .await?;

        let mut results = Vec::with_capacity(records.len());
        for record in records {
            let experience = record
                .into_experience()
                .map_err(DiscoveryServiceError::InvalidStoredExperience)?;
            let distance_km = origin.distance_km(&experience.location());
            if distance_km <= self.config.radius_km() {
                results.push(NearbyExperience {
                    experience,
                    distance_km,
                });
            }
        }
        results.sort_by(|a, b| f64::total_cmp(&a.distance_km, &b.distance_km));
        Ok(results)
    }

    /// Register `user`'s interest in an experience.
    ///
    /// Host and capacity rules are checked against the current guest list
    /// before the write; the repository re-checks capacity inside the
    /// write, so a concurrent taker of the last seat surfaces as
    /// `CapacityReached` rather than overfilling the list. The write
    /// itself is idempotent.
    ///
    /// # Errors
    ///
    /// Returns `DiscoveryServiceError::NotFound` when the experience does
    /// not exist, `Experience` when the host joins their own listing or
    /// the guest list is full, and `Storage` if the write fails.
    pub async fn express_interest(
        &self,
        id: ExperienceId,
        user: UserId,
    ) -> Result<(), DiscoveryServiceError> {
        let mut experience = self.load(id).await?;
        experience.register_interest(user.clone())?;

        self.experiences
            .add_interest(id, &user, self.clock.now())
            .await
            .map_err(|err| match err {
                StorageError::Conflict => {
                    DiscoveryServiceError::Experience(ExperienceError::CapacityReached)
                }
                other => DiscoveryServiceError::Storage(other),
            })
    }

    /// Withdraw `user`'s interest; a no-op if none was recorded.
    ///
    /// # Errors
    ///
    /// Returns `DiscoveryServiceError::NotFound` when the experience does
    /// not exist, or `Storage` if the write fails.
    pub async fn withdraw_interest(
        &self,
        id: ExperienceId,
        user: &UserId,
    ) -> Result<(), DiscoveryServiceError> {
        self.experiences
            .remove_interest(id, user)
            .await
            .map_err(|err| match err {
                StorageError::NotFound => DiscoveryServiceError::NotFound,
                other => DiscoveryServiceError::Storage(other),
            })
    }

    async fn load(&self, id: ExperienceId) -> Result<Experience, DiscoveryServiceError> {
        let record = self
            .experiences
            .get_experience(id)
            .await?
            .ok_or(DiscoveryServiceError::NotFound)?;
        record
            .into_experience()
            .map_err(DiscoveryServiceError::InvalidStoredExperience)
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    use gather_core::time::{fixed_clock, fixed_now};
    use storage::repository::InMemoryStorage;

    fn service() -> DiscoveryService {
        DiscoveryService::new(
            fixed_clock(),
            DiscoveryConfig::default(),
            Arc::new(InMemoryStorage::new()),
        )
    }

    async fn host_at(
        service: &DiscoveryService,
        title: &str,
        lat: f64,
        lon: f64,
        max_guests: Option<u32>,
    ) -> Experience {
        service
            .create_experience(
                UserId::new("host"),
                title,
                None,
                lat,
                lon,
                fixed_now() + chrono::Duration::days(1),
                max_guests,
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn created_experience_is_readable_with_derived_cell() {
        let service = service();
        let created = host_at(&service, "Street food walk", 19.076, 72.8777, None).await;
        assert_eq!(created.cell().as_str(), "te7ud2");

        let fetched = service.get_experience(created.id()).await.unwrap();
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn rejects_out_of_range_coordinates() {
        let service = service();
        let err = service
            .create_experience(
                UserId::new("host"),
                "Walk",
                None,
                95.0,
                0.0,
                fixed_now(),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryServiceError::Geo(_)));
    }

    #[tokio::test]
    async fn nearby_ranks_by_distance_and_drops_far_cells() {
        let service = service();
        // te7ud0, a lateral neighbor of the origin cell, ~0.88 km away.
        let mid = host_at(&service, "Morning run", 19.0730, 72.8700, None).await;
        // Same cell as the origin, ~0.06 km away.
        let near = host_at(&service, "Chai tasting", 19.0765, 72.8780, None).await;
        // Paris: not in the origin's cell block at all.
        host_at(&service, "Louvre sketching", 48.8583, 2.2945, None).await;

        let results = service.nearby(19.076, 72.8777).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].experience.id(), near.id());
        assert_eq!(results[1].experience.id(), mid.id());
        assert!(results[0].distance_km < results[1].distance_km);
        assert!(results[1].distance_km < 1.0);
    }

    #[tokio::test]
    async fn nearby_honors_a_tighter_radius() {
        let service = DiscoveryService::new(
            fixed_clock(),
            DiscoveryConfig::new(6, 0.5, 50).unwrap(),
            Arc::new(InMemoryStorage::new()),
        );
        let near = host_at(&service, "Chai tasting", 19.0765, 72.8780, None).await;
        host_at(&service, "Morning run", 19.0730, 72.8700, None).await;

        let results = service.nearby(19.076, 72.8777).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].experience.id(), near.id());
    }

    #[tokio::test]
    async fn interest_round_trip() {
        let service = service();
        let created = host_at(&service, "Chai tasting", 19.076, 72.8777, Some(2)).await;

        service
            .express_interest(created.id(), UserId::new("guest"))
            .await
            .unwrap();
        // Idempotent for the same guest.
        service
            .express_interest(created.id(), UserId::new("guest"))
            .await
            .unwrap();
        let fetched = service.get_experience(created.id()).await.unwrap();
        assert_eq!(fetched.interest_count(), 1);

        service
            .withdraw_interest(created.id(), &UserId::new("guest"))
            .await
            .unwrap();
        let fetched = service.get_experience(created.id()).await.unwrap();
        assert_eq!(fetched.interest_count(), 0);
    }

    #[tokio::test]
    async fn host_and_capacity_rules_apply_before_the_write() {
        let service = service();
        let created = host_at(&service, "Chai tasting", 19.076, 72.8777, Some(1)).await;

        let err = service
            .express_interest(created.id(), UserId::new("host"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DiscoveryServiceError::Experience(ExperienceError::HostInterest)
        ));

        service
            .express_interest(created.id(), UserId::new("guest"))
            .await
            .unwrap();
        let err = service
            .express_interest(created.id(), UserId::new("latecomer"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DiscoveryServiceError::Experience(ExperienceError::CapacityReached)
        ));
    }

    /// Backend where every interest write loses the race for the last
    /// seat, regardless of the guest list a prior read showed.
    struct LastSeatTaken(InMemoryStorage);

    #[async_trait::async_trait]
    impl ExperienceRepository for LastSeatTaken {
        async fn insert_experience(&self, record: &ExperienceRecord) -> Result<(), StorageError> {
            self.0.insert_experience(record).await
        }

        async fn get_experience(
            &self,
            id: ExperienceId,
        ) -> Result<Option<ExperienceRecord>, StorageError> {
            self.0.get_experience(id).await
        }

        async fn list_by_cells(
            &self,
            cells: &[gather_core::geo::GeoCell],
            limit: u32,
        ) -> Result<Vec<ExperienceRecord>, StorageError> {
            self.0.list_by_cells(cells, limit).await
        }

        async fn add_interest(
            &self,
            _id: ExperienceId,
            _user: &UserId,
            _at: chrono::DateTime<chrono::Utc>,
        ) -> Result<(), StorageError> {
            Err(StorageError::Conflict)
        }

        async fn remove_interest(
            &self,
            id: ExperienceId,
            user: &UserId,
        ) -> Result<(), StorageError> {
            self.0.remove_interest(id, user).await
        }
    }

    #[tokio::test]
    async fn losing_the_last_seat_race_reads_as_capacity_reached() {
        let service = DiscoveryService::new(
            fixed_clock(),
            DiscoveryConfig::default(),
            Arc::new(LastSeatTaken(InMemoryStorage::new())),
        );
        let created = host_at(&service, "Chai tasting", 19.076, 72.8777, Some(1)).await;

        // the snapshot shows a free seat, but the write itself conflicts
        let err = service
            .express_interest(created.id(), UserId::new("guest"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DiscoveryServiceError::Experience(ExperienceError::CapacityReached)
        ));
    }

    #[tokio::test]
    async fn missing_experience_maps_to_not_found() {
        let service = service();
        let err = service
            .get_experience(ExperienceId::generate())
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryServiceError::NotFound));

        let err = service
            .express_interest(ExperienceId::generate(), UserId::new("guest"))
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryServiceError::NotFound));

        let err = service
            .withdraw_interest(ExperienceId::generate(), &UserId::new("guest"))
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryServiceError::NotFound));
    }
}
