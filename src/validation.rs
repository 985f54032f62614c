//! Static-settings validation, performed once before any connect attempt.

use crate::{ConnectSettings, PgManagedError, Result};

/// PostgreSQL identifier limit (NAMEDATALEN - 1).
const MAX_DATABASE_NAME_LENGTH: usize = 63;

/// Validates resolved connection settings.
///
/// Failures here are [`PgManagedError::Config`]: fatal, never retried, and
/// reported before the first network round-trip so a bad deployment fails
/// loudly at startup rather than inside the reconnect path.
///
/// # Errors
///
/// - Database name empty and no `service` option to supply the target.
/// - Database name longer than PostgreSQL's 63-character limit.
/// - Empty host.
/// - `isolation_level` smuggled in through driver options with an invalid
///   value (the well-formed spelling is accepted and consumed separately).
///
/// # Example
///
/// ```
/// use pgmanaged::{validation::validate_settings, ConnectSettings};
///
/// assert!(validate_settings(&ConnectSettings::new("orders", "db")).is_ok());
/// assert!(validate_settings(&ConnectSettings::new("", "db")).is_err());
/// ```
pub fn validate_settings(settings: &ConnectSettings) -> Result<()> {
    if settings.database.is_empty() && !settings.options.contains_key("service") {
        return Err(PgManagedError::Config(
            "settings are improperly configured: supply a database name or a 'service' option"
                .to_string(),
        ));
    }

    if settings.database.len() > MAX_DATABASE_NAME_LENGTH {
        return Err(PgManagedError::Config(format!(
            "the database name '{}' ({} characters) is longer than PostgreSQL's limit of {} characters",
            settings.database,
            settings.database.len(),
            MAX_DATABASE_NAME_LENGTH
        )));
    }

    if settings.host.is_empty() {
        return Err(PgManagedError::Config("host cannot be empty".to_string()));
    }

    if let Some(level) = settings.options.get("isolation_level") {
        crate::config::IsolationLevel::parse(level)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConnectSettings;

    #[test]
    fn test_valid_settings() {
        assert!(validate_settings(&ConnectSettings::new("orders", "db")).is_ok());
    }

    #[test]
    fn test_missing_database_name() {
        let result = validate_settings(&ConnectSettings::new("", "db"));
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("database name"));
    }

    #[test]
    fn test_service_option_allows_empty_name() {
        let settings = ConnectSettings::new("", "db").with_option("service", "orders");
        assert!(validate_settings(&settings).is_ok());
    }

    #[test]
    fn test_database_name_too_long() {
        let settings = ConnectSettings::new("d".repeat(64), "db");
        let result = validate_settings(&settings);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("limit of 63"));
    }

    #[test]
    fn test_empty_host() {
        let result = validate_settings(&ConnectSettings::new("orders", ""));
        assert!(result.is_err());
    }

    #[test]
    fn test_isolation_level_option_checked() {
        let good = ConnectSettings::new("orders", "db").with_option("isolation_level", "serializable");
        assert!(validate_settings(&good).is_ok());

        let bad = ConnectSettings::new("orders", "db").with_option("isolation_level", "nope");
        assert!(validate_settings(&bad).is_err());
    }
}
