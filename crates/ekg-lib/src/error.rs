use thiserror::Error;

/// Hard failures raised at the library boundary.
///
/// Degenerate-but-well-formed input (too few beats, no P wave) is reported as
/// a not-ok value by the measurement stages instead.
#[derive(Debug, Error)]
pub enum EcgError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("sampling rate must be a positive finite number, got {0}")]
    InvalidSamplingRate(f64),

    #[error("duration must be a positive finite number of seconds, got {0}")]
    InvalidDuration(f64),

    #[error("record contains no usable leads")]
    NoLeads,

    #[error("lead {lead} sample {index} is not numeric")]
    NonNumericSample { lead: String, index: usize },

    #[error("lead {0} has an unsupported container type (expected array or index-keyed object)")]
    MalformedLead(String),

    #[error("unknown lead name `{0}`")]
    UnknownLead(String),

    #[error("lead {0} is required but absent")]
    MissingLead(String),

    #[error("unknown diagnosis label `{0}`")]
    UnknownDiagnosis(String),

    #[error("electrode geometry is missing electrode {0}")]
    MissingElectrode(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, EcgError>;
