//! Shared types, errors, and configuration for kybcheck.

mod config;
mod error;
mod types;

pub use config::{
    AiConfig, AppConfig, PipelineConfig, RegistryConfig, SearchConfig, ServerConfig,
    StorageConfig, config_dir, config_file_path, init_config, load_config, load_config_from,
    validate_api_keys,
};
pub use error::{KybError, Result};
pub use types::{
    CandidateIdentity, CheckOutcome, CheckStatus, Confidence, ContinueInput, CrnSource, JobId,
    JobStatus, LogEntry, LogEvent, Officer, RegisteredAddress, RequiredFields,
    VerificationDetails, VerificationResult, VerificationStatus, WebsiteSource,
};
