#![forbid(unsafe_code)]

pub mod repository;
pub mod sqlite;

pub use repository::{
    ExperienceRecord, ExperienceRepository, InMemoryStorage, ProfileRecord, ProfileRepository,
    Storage, StorageError,
};
pub use sqlite::{SqliteInitError, SqliteRepository};
