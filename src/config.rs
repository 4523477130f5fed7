//! Environment-driven configuration for analysis runs.
//!
//! CLI flags override whatever the environment provides; both funnel
//! into a validated [`AnalysisOptions`].

use std::env;

use thiserror::Error;
use validator::Validate;

use crate::analysis::AnalysisOptions;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    #[error("Parse error for {field}: {value} - {source}")]
    Parse {
        field: String,
        value: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Build analysis options from `SCHEMALIFT_*` environment variables,
/// falling back to the defaults for anything unset.
pub fn options_from_env() -> Result<AnalysisOptions, ConfigError> {
    let defaults = AnalysisOptions::default();

    let options = AnalysisOptions {
        detect_hierarchies: parse_env_var(
            "SCHEMALIFT_DETECT_HIERARCHIES",
            defaults.detect_hierarchies,
        )?,
        detect_enums: parse_env_var("SCHEMALIFT_DETECT_ENUMS", defaults.detect_enums)?,
        detect_constraints: parse_env_var(
            "SCHEMALIFT_DETECT_CONSTRAINTS",
            defaults.detect_constraints,
        )?,
        detect_derived: parse_env_var("SCHEMALIFT_DETECT_DERIVED", defaults.detect_derived)?,
        analyze_document_relationships: parse_env_var(
            "SCHEMALIFT_ANALYZE_DOCUMENTS",
            defaults.analyze_document_relationships,
        )?,
        use_llm: parse_env_var("SCHEMALIFT_USE_LLM", defaults.use_llm)?,
        confidence_threshold: parse_env_var(
            "SCHEMALIFT_CONFIDENCE_THRESHOLD",
            defaults.confidence_threshold,
        )?,
        document_confidence_floor: parse_env_var(
            "SCHEMALIFT_DOCUMENT_CONFIDENCE_FLOOR",
            defaults.document_confidence_floor,
        )?,
        max_hierarchies: parse_env_var("SCHEMALIFT_MAX_HIERARCHIES", defaults.max_hierarchies)?,
        max_enums: parse_env_var("SCHEMALIFT_MAX_ENUMS", defaults.max_enums)?,
        max_constraints: parse_env_var("SCHEMALIFT_MAX_CONSTRAINTS", defaults.max_constraints)?,
        max_derived: parse_env_var("SCHEMALIFT_MAX_DERIVED", defaults.max_derived)?,
    };

    options.validate()?;
    Ok(options)
}

/// Parse an environment variable, using `default` when unset.
fn parse_env_var<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value.parse().map_err(|e| ConfigError::Parse {
            field: key.to_string(),
            value,
            source: Box::new(e),
        }),
        Err(_) => Ok(default),
    }
}
