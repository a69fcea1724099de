use gather_core::geo::GeoPoint;
use gather_core::model::ExperienceId;

use crate::repository::StorageError;

pub(crate) fn experience_id_from_str(raw: &str) -> Result<ExperienceId, StorageError> {
    raw.parse::<ExperienceId>()
        .map_err(|e| StorageError::Serialization(e.to_string()))
}

pub(crate) fn point_from_columns(lat: f64, lon: f64) -> Result<GeoPoint, StorageError> {
    GeoPoint::new(lat, lon).map_err(|e| StorageError::Serialization(e.to_string()))
}

pub(crate) fn max_guests_from_i64(raw: Option<i64>) -> Result<Option<u32>, StorageError> {
    raw.map(|v| {
        u32::try_from(v).map_err(|_| StorageError::Serialization("max_guests overflow".into()))
    })
    .transpose()
}
