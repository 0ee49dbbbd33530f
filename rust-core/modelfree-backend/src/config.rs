// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Backend configuration.

use serde::{Deserialize, Serialize};

use crate::error::{StorageError, StorageResult};
use crate::keygen::DEFAULT_KEY_SIZE;

/// In-memory backend configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Key size for collections provisioned without an explicit one
    pub key_size: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            key_size: DEFAULT_KEY_SIZE,
        }
    }
}

/// PostgreSQL backend configuration
///
/// `connection_string`, when set, overrides the individual connection
/// fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostgresConfig {
    /// Key size for collections provisioned without an explicit one
    pub key_size: usize,
    /// Server host
    pub hostname: String,
    /// Server port
    pub port: u16,
    /// Login role
    pub username: String,
    /// Login password
    pub password: Option<String>,
    /// Logical database holding the collection tables (created if absent)
    pub database_name: String,
    /// Complete `postgres://` URL
    pub connection_string: Option<String>,
    /// Database the admin connection uses when the target must be created
    pub maintenance_database: String,
    /// Upper bound on pooled query connections
    pub max_connections: u32,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            key_size: DEFAULT_KEY_SIZE,
            hostname: "localhost".to_string(),
            port: 5432,
            username: "postgres".to_string(),
            password: None,
            database_name: "postgres".to_string(),
            connection_string: None,
            maintenance_database: "postgres".to_string(),
            max_connections: 5,
        }
    }
}

impl PostgresConfig {
    /// Configuration taking everything from a connection URL.
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            connection_string: Some(url.into()),
            ..Self::default()
        }
    }

    /// Override the default key size.
    pub fn with_key_size(mut self, key_size: usize) -> Self {
        self.key_size = key_size;
        self
    }

    /// Check the values that cannot be validated by the driver.
    pub fn validate(&self) -> StorageResult<()> {
        if self.key_size == 0 {
            return Err(StorageError::Configuration(
                "key_size must be greater than zero".to_string(),
            ));
        }
        if self.max_connections == 0 {
            return Err(StorageError::Configuration(
                "max_connections must be greater than zero".to_string(),
            ));
        }
        if self.maintenance_database.is_empty() {
            return Err(StorageError::Configuration(
                "maintenance_database must not be empty".to_string(),
            ));
        }
        if self.connection_string.is_none() && self.database_name.is_empty() {
            return Err(StorageError::Configuration(
                "database_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Build driver connect options for the target database.
    #[cfg(feature = "postgres")]
    pub fn connect_options(&self) -> StorageResult<sqlx::postgres::PgConnectOptions> {
        use std::str::FromStr;

        use sqlx::postgres::PgConnectOptions;

        if let Some(url) = &self.connection_string {
            return PgConnectOptions::from_str(url).map_err(|e| {
                StorageError::Configuration(format!("invalid connection string: {e}"))
            });
        }

        let mut options = PgConnectOptions::new()
            .host(&self.hostname)
            .port(self.port)
            .username(&self.username)
            .database(&self.database_name);
        if let Some(password) = &self.password {
            options = options.password(password);
        }
        Ok(options)
    }
}
