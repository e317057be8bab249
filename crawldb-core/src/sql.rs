//! Connection strings for relational data sources.
//!
//! Crawl results may also be exported to MySQL or PostgreSQL. This module only
//! formats the driver connection strings; opening the connection is up to the
//! caller's SQL driver.

use std::{fmt, str::FromStr};

use crate::error::StoreError;

/// A supported relational data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDataSource {
    MySql,
    Postgres,
}

impl FromStr for SqlDataSource {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mysql" => Ok(SqlDataSource::MySql),
            "postgres" => Ok(SqlDataSource::Postgres),
            other => Err(StoreError::UnsupportedDataSource(other.to_string())),
        }
    }
}

impl fmt::Display for SqlDataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlDataSource::MySql => f.write_str("mysql"),
            SqlDataSource::Postgres => f.write_str("postgres"),
        }
    }
}

/// Where and as whom to connect.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SqlConnectionParams {
    pub host: String,
    pub port: String,
    pub username: String,
    pub password: String,
    pub database: String,
}

impl fmt::Debug for SqlConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlConnectionParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .finish()
    }
}

impl SqlDataSource {
    /// Formats the driver connection string for this data source.
    pub fn connection_string(self, params: &SqlConnectionParams) -> String {
        let SqlConnectionParams {
            host,
            port,
            username,
            password,
            database,
        } = params;

        match self {
            SqlDataSource::MySql => format!(
                "{username}:{password}@({host}:{port})/{database}?charset=utf8&parseTime=True&loc=Local"
            ),
            SqlDataSource::Postgres => format!(
                "host={host} port={port} user={username} dbname={database} password={password} sslmode=disable"
            ),
        }
    }
}

/// Formats the connection string for a data source given by name.
///
/// # Errors
///
/// Returns [`StoreError::UnsupportedDataSource`] for anything but `mysql` and
/// `postgres`.
pub fn connection_string(
    data_source: &str,
    params: &SqlConnectionParams,
) -> Result<String, StoreError> {
    Ok(data_source.parse::<SqlDataSource>()?.connection_string(params))
}
