use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use gather_core::geo::GeoCell;
use gather_core::model::{ExperienceId, UserId};

use super::SqliteRepository;
use super::mapping::{experience_id_from_str, max_guests_from_i64, point_from_columns};
use crate::repository::{ExperienceRecord, ExperienceRepository, StorageError};

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait::async_trait]
impl ExperienceRepository for SqliteRepository {
    async fn insert_experience(&self, record: &ExperienceRecord) -> Result<(), StorageError> {
        let res = sqlx::query(
            r"
            INSERT OR IGNORE INTO experiences
                (id, host_user_id, title, description, lat, lon, geo_cell, starts_at, max_guests, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ",
        )
        .bind(record.id.to_string())
        .bind(record.host.as_str())
        .bind(&record.title)
        .bind(&record.description)
        .bind(record.location.lat())
        .bind(record.location.lon())
        .bind(record.cell.as_str())
        .bind(record.starts_at)
        .bind(record.max_guests.map(i64::from))
        .bind(record.created_at)
        .execute(self.pool())
        .await
        .map_err(conn)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::Conflict);
        }
        Ok(())
    }

    async fn get_experience(
        &self,
        id: ExperienceId,
    ) -> Result<Option<ExperienceRecord>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, host_user_id, title, description, lat, lon, geo_cell, starts_at, max_guests, created_at
            FROM experiences WHERE id = ?1
            ",
        )
        .bind(id.to_string())
        .fetch_optional(self.pool())
        .await
        .map_err(conn)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut record = experience_from_row(&row)?;
        record.interested = self.interested_users(id).await?;
        Ok(Some(record))
    }

    async fn list_by_cells(
        &self,
        cells: &[GeoCell],
        limit: u32,
    ) -> Result<Vec<ExperienceRecord>, StorageError> {
        if cells.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        // sqlite has no array binds; expand one placeholder per cell
        let placeholders = (1..=cells.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT id, host_user_id, title, description, lat, lon, geo_cell, starts_at, max_guests, created_at
             FROM experiences
             WHERE geo_cell IN ({placeholders})
             ORDER BY starts_at ASC
             LIMIT ?{}",
            cells.len() + 1
        );

        let mut query = sqlx::query(&sql);
        for cell in cells {
            query = query.bind(cell.as_str());
        }
        query = query.bind(i64::from(limit));

        let rows = query.fetch_all(self.pool()).await.map_err(conn)?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            records.push(experience_from_row(row)?);
        }
        self.attach_interests(&mut records).await?;
        Ok(records)
    }

    async fn add_interest(
        &self,
        id: ExperienceId,
        user: &UserId,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        self.require_experience(id).await?;
        // the capacity guard runs inside the insert so concurrent writers
        // cannot both take the last seat
        let res = sqlx::query(
            r"
            INSERT INTO experience_interests (experience_id, user_id, created_at)
            SELECT ?1, ?2, ?3
            WHERE (SELECT COUNT(*) FROM experience_interests WHERE experience_id = ?1)
                < COALESCE((SELECT max_guests FROM experiences WHERE id = ?1),
                           (SELECT COUNT(*) FROM experience_interests WHERE experience_id = ?1) + 1)
            ON CONFLICT(experience_id, user_id) DO NOTHING
            ",
        )
        .bind(id.to_string())
        .bind(user.as_str())
        .bind(at)
        .execute(self.pool())
        .await
        .map_err(conn)?;

        if res.rows_affected() == 0 && !self.has_interest(id, user).await? {
            return Err(StorageError::Conflict);
        }
        Ok(())
    }

    async fn remove_interest(
        &self,
        id: ExperienceId,
        user: &UserId,
    ) -> Result<(), StorageError> {
        self.require_experience(id).await?;
        sqlx::query(
            "DELETE FROM experience_interests WHERE experience_id = ?1 AND user_id = ?2",
        )
        .bind(id.to_string())
        .bind(user.as_str())
        .execute(self.pool())
        .await
        .map_err(conn)?;
        Ok(())
    }
}

impl SqliteRepository {
    async fn require_experience(&self, id: ExperienceId) -> Result<(), StorageError> {
        let row = sqlx::query("SELECT 1 FROM experiences WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(self.pool())
            .await
            .map_err(conn)?;
        if row.is_none() {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn has_interest(&self, id: ExperienceId, user: &UserId) -> Result<bool, StorageError> {
        let row = sqlx::query(
            "SELECT 1 FROM experience_interests WHERE experience_id = ?1 AND user_id = ?2",
        )
        .bind(id.to_string())
        .bind(user.as_str())
        .fetch_optional(self.pool())
        .await
        .map_err(conn)?;
        Ok(row.is_some())
    }

    async fn interested_users(&self, id: ExperienceId) -> Result<BTreeSet<UserId>, StorageError> {
        let rows = sqlx::query(
            "SELECT user_id FROM experience_interests WHERE experience_id = ?1",
        )
        .bind(id.to_string())
        .fetch_all(self.pool())
        .await
        .map_err(conn)?;

        rows.iter()
            .map(|row| {
                row.try_get::<String, _>("user_id")
                    .map(UserId::new)
                    .map_err(ser)
            })
            .collect()
    }

    async fn attach_interests(
        &self,
        records: &mut [ExperienceRecord],
    ) -> Result<(), StorageError> {
        if records.is_empty() {
            return Ok(());
        }

        let placeholders = (1..=records.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT experience_id, user_id FROM experience_interests
             WHERE experience_id IN ({placeholders})"
        );

        let mut query = sqlx::query(&sql);
        for record in records.iter() {
            query = query.bind(record.id.to_string());
        }
        let rows = query.fetch_all(self.pool()).await.map_err(conn)?;

        let mut by_experience: HashMap<ExperienceId, BTreeSet<UserId>> = HashMap::new();
        for row in &rows {
            let experience_id =
                experience_id_from_str(&row.try_get::<String, _>("experience_id").map_err(ser)?)?;
            let user = UserId::new(row.try_get::<String, _>("user_id").map_err(ser)?);
            by_experience.entry(experience_id).or_default().insert(user);
        }

        for record in records {
            if let Some(interested) = by_experience.remove(&record.id) {
                record.interested = interested;
            }
        }
        Ok(())
    }
}

fn experience_from_row(row: &SqliteRow) -> Result<ExperienceRecord, StorageError> {
    let location = point_from_columns(
        row.try_get("lat").map_err(ser)?,
        row.try_get("lon").map_err(ser)?,
    )?;

    Ok(ExperienceRecord {
        id: experience_id_from_str(&row.try_get::<String, _>("id").map_err(ser)?)?,
        host: UserId::new(row.try_get::<String, _>("host_user_id").map_err(ser)?),
        title: row.try_get("title").map_err(ser)?,
        description: row.try_get("description").map_err(ser)?,
        location,
        cell: GeoCell::from(row.try_get::<String, _>("geo_cell").map_err(ser)?),
        starts_at: row.try_get("starts_at").map_err(ser)?,
        max_guests: max_guests_from_i64(row.try_get("max_guests").map_err(ser)?)?,
        interested: BTreeSet::new(),
        created_at: row.try_get("created_at").map_err(ser)?,
    })
}
