//! Settings error types.

/// Errors raised while loading, validating, or saving settings.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The settings file could not be read.
    #[error("failed to read settings file {path}: {source}")]
    ReadError {
        /// Path of the file.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The settings file is not valid TOML or has mistyped keys.
    #[error("failed to parse settings file {path}: {source}")]
    ParseError {
        /// Path of the file.
        path: String,
        /// Underlying TOML error.
        source: toml::de::Error,
    },

    /// The settings could not be serialized.
    #[error("failed to serialize settings: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// The settings file could not be written.
    #[error("failed to write settings file {path}: {source}")]
    WriteError {
        /// Path of the file.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A setting holds an out-of-range value.
    #[error("invalid setting '{field}': {message}")]
    ValidationError {
        /// Dotted name of the offending key.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// No home directory could be determined for the default location.
    #[error("could not determine the home directory")]
    NoHomeDir,
}

/// Result type for settings operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
