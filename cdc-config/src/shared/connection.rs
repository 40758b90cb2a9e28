use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tokio_postgres::Config as TokioPgConnectOptions;
use tokio_postgres::config::SslMode as TokioPgSslMode;

use crate::SerializableSecretString;
use crate::shared::ValidationError;

/// Configuration for connecting to a Postgres database.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PgConnectionConfig {
    /// Hostname or IP address of the Postgres server.
    pub host: String,
    pub port: u16,
    /// Name of the database to replicate from. It becomes the catalog of every table id.
    pub name: String,
    pub username: String,
    /// Password for the specified user, redacted in debug output.
    pub password: Option<SerializableSecretString>,
}

impl PgConnectionConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.host.is_empty() {
            return Err(ValidationError::MissingField("pg_connection.host"));
        }
        if self.name.is_empty() {
            return Err(ValidationError::MissingField("pg_connection.name"));
        }
        if self.username.is_empty() {
            return Err(ValidationError::MissingField("pg_connection.username"));
        }

        Ok(())
    }
}

/// Converts a [`PgConnectionConfig`] into driver specific connect options.
pub trait IntoConnectOptions<Output> {
    /// Creates connection options without selecting a database.
    fn without_db(&self) -> Output;

    /// Creates connection options for the configured database.
    fn with_db(&self) -> Output;
}

impl IntoConnectOptions<TokioPgConnectOptions> for PgConnectionConfig {
    fn without_db(&self) -> TokioPgConnectOptions {
        let mut config = TokioPgConnectOptions::new();
        config
            .host(self.host.clone())
            .port(self.port)
            .user(self.username.clone())
            .ssl_mode(TokioPgSslMode::Disable);

        if let Some(password) = &self.password {
            config.password(password.expose_secret());
        }

        config
    }

    fn with_db(&self) -> TokioPgConnectOptions {
        let mut options: TokioPgConnectOptions = self.without_db();
        options.dbname(self.name.clone());
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PgConnectionConfig {
        PgConnectionConfig {
            host: "localhost".to_string(),
            port: 5432,
            name: "inventory".to_string(),
            username: "postgres".to_string(),
            password: Some("postgres".into()),
        }
    }

    #[test]
    fn connect_options_carry_database_name() {
        let options: TokioPgConnectOptions = config().with_db();
        assert_eq!(options.get_dbname(), Some("inventory"));
        assert_eq!(options.get_user(), Some("postgres"));
        assert_eq!(options.get_ports(), [5432]);

        let options: TokioPgConnectOptions = config().without_db();
        assert_eq!(options.get_dbname(), None);
    }

    #[test]
    fn missing_host_is_rejected() {
        let mut config = config();
        config.host.clear();
        assert!(matches!(
            config.validate(),
            Err(ValidationError::MissingField("pg_connection.host"))
        ));
    }
}
