#![forbid(unsafe_code)]

pub mod answers;
pub mod catalog;
pub mod error;
pub mod geo;
pub mod model;
pub mod progress;
pub mod time;

pub use answers::{Answer, AnswerError, AnswerMap, AnswerValue};
pub use catalog::{Catalog, CatalogError, Category, Question, QuestionKind};
pub use error::Error;
pub use geo::{DEFAULT_CELL_PRECISION, GeoCell, GeoError, GeoPoint};
pub use model::{
    CategoryId, Experience, ExperienceError, ExperienceId, Profile, ProfileError, QuestionId,
    UserId,
};
pub use progress::{CategoryProgress, ProgressReport, compute_progress};
pub use time::Clock;
