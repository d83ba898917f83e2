//! Settings validation.

use crate::error::{ConfigError, ConfigResult};
use crate::types::Settings;

/// Validate a deserialized settings value.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(settings: &Settings) -> ConfigResult<()> {
    if !(0.0..=1.0).contains(&settings.install_tip_threshold) {
        return Err(ConfigError::ValidationError {
            field: "install_tip_threshold".to_owned(),
            message: format!(
                "{} is out of range; must be between 0.0 and 1.0",
                settings.install_tip_threshold
            ),
        });
    }

    if settings.namespace_config_filename.trim().is_empty()
        || settings.namespace_config_filename.contains(['/', '\\'])
    {
        return Err(ConfigError::ValidationError {
            field: "namespace_config_filename".to_owned(),
            message: "must be a plain, non-empty file name".to_owned(),
        });
    }

    if settings.unit_extension.is_empty()
        || !settings
            .unit_extension
            .chars()
            .all(|c| c.is_ascii_alphanumeric())
    {
        return Err(ConfigError::ValidationError {
            field: "unit_extension".to_owned(),
            message: format!(
                "'{}' is not a valid extension; use letters and digits only, without the dot",
                settings.unit_extension
            ),
        });
    }

    if settings.default_installer.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "default_installer".to_owned(),
            message: "must not be empty".to_owned(),
        });
    }

    for (name, path) in &settings.search_paths {
        if path.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError {
                field: format!("search_paths.{name}"),
                message: "path must not be empty".to_owned(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(validate(&Settings::default()).is_ok());
    }

    #[test]
    fn threshold_out_of_range() {
        let settings = Settings {
            install_tip_threshold: 1.5,
            ..Settings::default()
        };
        let err = validate(&settings).unwrap_err();
        assert!(err.to_string().contains("install_tip_threshold"));
    }

    #[test]
    fn extension_with_dot_rejected() {
        let settings = Settings {
            unit_extension: ".toml".to_owned(),
            ..Settings::default()
        };
        assert!(matches!(
            validate(&settings),
            Err(ConfigError::ValidationError { field, .. }) if field == "unit_extension"
        ));
    }

    #[test]
    fn metadata_filename_must_be_plain() {
        let settings = Settings {
            namespace_config_filename: "meta/namespace.yml".to_owned(),
            ..Settings::default()
        };
        assert!(validate(&settings).is_err());
    }
}
