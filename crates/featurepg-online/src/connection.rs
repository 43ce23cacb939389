//! Single-connection manager
//!
//! Each store instance owns at most one PostgreSQL connection. The manager is
//! a small state machine:
//!
//! ```text
//! Unconnected ──open ok──► Connected ──closed by server──► Failed
//!      │                                                    ▲
//!      └──────────────────open error────────────────────────┘
//! ```
//!
//! There is no pooling, retry or reconnect. Once `Failed`, every later
//! `open` reports the original failure.

use crate::config::PostgresConfig;
use crate::sql::quote_identifier;
use featurepg_core::{Error, Result};
use tokio_postgres::error::SqlState;
use tokio_postgres::{Client, NoTls};

/// Observable connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Unconnected,
    Connected,
    Failed,
}

enum ConnectionState {
    Unconnected,
    Connected(Client),
    Failed(String),
}

/// Owns the store's one connection
pub struct ConnectionManager {
    state: ConnectionState,
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Unconnected,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        match self.state {
            ConnectionState::Unconnected => ConnectionStatus::Unconnected,
            ConnectionState::Connected(_) => ConnectionStatus::Connected,
            ConnectionState::Failed(_) => ConnectionStatus::Failed,
        }
    }

    /// Returns the live connection, opening it on first use
    ///
    /// The config is validated on every call, so a config of the wrong store
    /// type fails with [`Error::Config`] whatever the connection state.
    pub async fn open(&mut self, config: &PostgresConfig) -> Result<&mut Client> {
        config.validate()?;

        if matches!(&self.state, ConnectionState::Connected(client) if client.is_closed()) {
            tracing::warn!(host = %config.host, "PostgreSQL connection was closed");
            self.state = ConnectionState::Failed("connection to PostgreSQL was closed".into());
        }

        if matches!(self.state, ConnectionState::Unconnected) {
            self.state = match connect(config).await {
                Ok(client) => ConnectionState::Connected(client),
                Err(err) => ConnectionState::Failed(err.to_string()),
            };
        }

        match &mut self.state {
            ConnectionState::Connected(client) => Ok(client),
            ConnectionState::Failed(reason) => Err(Error::connection(reason.clone())),
            ConnectionState::Unconnected => Err(Error::connection("not connected")),
        }
    }
}

async fn connect(config: &PostgresConfig) -> Result<Client> {
    let search_path = escape_option_value(&quote_identifier(config.schema())?);

    let mut pg_config = tokio_postgres::Config::new();
    pg_config
        .host(&config.host)
        .port(config.port)
        .dbname(&config.database)
        .user(&config.user)
        .options(&format!("-c search_path={}", search_path));
    if let Some(password) = &config.password {
        pg_config.password(password);
    }

    let (client, connection) = pg_config.connect(NoTls).await.map_err(|e| {
        Error::connection(format!(
            "failed to connect to {}:{}/{} as '{}': {}",
            config.host, config.port, config.database, config.user, e
        ))
    })?;

    // The connection object drives the socket; it resolves when the session ends
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!(error = %e, "PostgreSQL connection terminated");
        }
    });

    tracing::info!(
        host = %config.host,
        port = config.port,
        database = %config.database,
        schema = %config.schema(),
        "Connected to PostgreSQL"
    );

    Ok(client)
}

/// Escapes a value for the libpq `options` startup parameter
fn escape_option_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if c == '\\' || c.is_whitespace() {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Maps a driver error onto the error taxonomy
pub(crate) fn pg_error(context: &str, err: tokio_postgres::Error) -> Error {
    if err.is_closed() {
        return Error::connection(format!("{}: connection closed", context));
    }

    let message = err
        .as_db_error()
        .map(|db| db.message().to_string())
        .unwrap_or_else(|| err.to_string());

    match err.code() {
        Some(code) if *code == SqlState::UNDEFINED_TABLE || *code == SqlState::INVALID_SCHEMA_NAME => {
            Error::schema(format!("{}: {}", context, message))
        }
        _ => Error::Database(format!("{}: {}", context, message)),
    }
}
