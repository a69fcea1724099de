#![forbid(unsafe_code)]

pub mod config;
pub mod discovery_service;
pub mod error;
pub mod profile_service;
pub mod questionnaire_service;

pub use gather_core::Clock;

pub use config::{DiscoveryConfig, DiscoveryConfigError};
pub use discovery_service::{DiscoveryService, NearbyExperience};
pub use error::{DiscoveryServiceError, ProfileServiceError, QuestionnaireServiceError};
pub use profile_service::ProfileService;
pub use questionnaire_service::{
    CategoryView, QuestionView, QuestionnaireService, QuestionnaireView, SubmissionOutcome,
};
