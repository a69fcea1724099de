use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use gather_core::answers::AnswerValue;
use gather_core::model::{QuestionId, UserId};
use gather_core::progress::ProgressReport;

use super::SqliteRepository;
use super::mapping::point_from_columns;
use crate::repository::{ProfileRecord, ProfileRepository, StorageError};

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

fn answers_json(record: &ProfileRecord) -> Result<String, StorageError> {
    serde_json::to_string(&record.answers).map_err(ser)
}

fn progress_json(record: &ProfileRecord) -> Result<Option<String>, StorageError> {
    record
        .progress
        .as_ref()
        .map(|p| serde_json::to_string(p).map_err(ser))
        .transpose()
}

#[async_trait::async_trait]
impl ProfileRepository for SqliteRepository {
    async fn upsert_profile(&self, record: &ProfileRecord) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO profiles (user_id, display_name, bio, lat, lon, answers, progress, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(user_id) DO UPDATE SET
                display_name = excluded.display_name,
                bio = excluded.bio,
                lat = excluded.lat,
                lon = excluded.lon,
                answers = excluded.answers,
                progress = excluded.progress,
                updated_at = excluded.updated_at
            ",
        )
        .bind(record.user_id.as_str())
        .bind(&record.display_name)
        .bind(&record.bio)
        .bind(record.location.map(|p| p.lat()))
        .bind(record.location.map(|p| p.lon()))
        .bind(answers_json(record)?)
        .bind(progress_json(record)?)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(self.pool())
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }

    async fn update_profile(
        &self,
        record: &ProfileRecord,
        expected_updated_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let res = sqlx::query(
            r"
            UPDATE profiles SET
                display_name = ?1,
                bio = ?2,
                lat = ?3,
                lon = ?4,
                answers = ?5,
                progress = ?6,
                updated_at = ?7
            WHERE user_id = ?8 AND updated_at = ?9
            ",
        )
        .bind(&record.display_name)
        .bind(&record.bio)
        .bind(record.location.map(|p| p.lat()))
        .bind(record.location.map(|p| p.lon()))
        .bind(answers_json(record)?)
        .bind(progress_json(record)?)
        .bind(record.updated_at)
        .bind(record.user_id.as_str())
        .bind(expected_updated_at)
        .execute(self.pool())
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        if res.rows_affected() == 0 {
            // distinguish a missing row from a lost race
            let exists = sqlx::query("SELECT 1 FROM profiles WHERE user_id = ?1")
                .bind(record.user_id.as_str())
                .fetch_optional(self.pool())
                .await
                .map_err(|e| StorageError::Connection(e.to_string()))?;
            return Err(if exists.is_some() {
                StorageError::Conflict
            } else {
                StorageError::NotFound
            });
        }
        Ok(())
    }

    async fn get_profile(&self, user_id: &UserId) -> Result<Option<ProfileRecord>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT user_id, display_name, bio, lat, lon, answers, progress, created_at, updated_at
            FROM profiles WHERE user_id = ?1
            ",
        )
        .bind(user_id.as_str())
        .fetch_optional(self.pool())
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        match row {
            Some(row) => profile_from_row(&row).map(Some),
            None => Ok(None),
        }
    }

    async fn delete_profile(&self, user_id: &UserId) -> Result<(), StorageError> {
        let res = sqlx::query("DELETE FROM profiles WHERE user_id = ?1")
            .bind(user_id.as_str())
            .execute(self.pool())
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }
}

fn profile_from_row(row: &SqliteRow) -> Result<ProfileRecord, StorageError> {
    let answers_raw: String = row.try_get("answers").map_err(ser)?;
    let answers: BTreeMap<QuestionId, AnswerValue> =
        serde_json::from_str(&answers_raw).map_err(ser)?;

    let progress_raw: Option<String> = row.try_get("progress").map_err(ser)?;
    let progress: Option<ProgressReport> = progress_raw
        .map(|raw| serde_json::from_str(&raw).map_err(ser))
        .transpose()?;

    let lat: Option<f64> = row.try_get("lat").map_err(ser)?;
    let lon: Option<f64> = row.try_get("lon").map_err(ser)?;
    let location = match (lat, lon) {
        (Some(lat), Some(lon)) => Some(point_from_columns(lat, lon)?),
        (None, None) => None,
        _ => {
            return Err(StorageError::Serialization(
                "profile row has only one coordinate".into(),
            ));
        }
    };

    Ok(ProfileRecord {
        user_id: UserId::new(row.try_get::<String, _>("user_id").map_err(ser)?),
        display_name: row.try_get("display_name").map_err(ser)?,
        bio: row.try_get("bio").map_err(ser)?,
        location,
        answers,
        progress,
        created_at: row.try_get("created_at").map_err(ser)?,
        updated_at: row.try_get("updated_at").map_err(ser)?,
    })
}
