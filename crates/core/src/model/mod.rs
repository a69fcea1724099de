mod experience;
pub(crate) mod ids;
mod profile;

pub use experience::{Experience, ExperienceError};
pub use ids::{CategoryId, ExperienceId, ParseIdError, QuestionId, UserId};
pub use profile::{Profile, ProfileError};
