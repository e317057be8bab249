//! Builds driver options from a resolved descriptor and connects.

use std::str::FromStr;

use async_trait::async_trait;
use bson::{Document, doc};
use mongodb::{
    Client,
    options::{AuthMechanism, ClientOptions, Credential, ServerAddress},
};
use tracing::debug;

use crawldb_core::{
    backend::Connector,
    config::{ConnectionDescriptor, ConnectionTarget, Credentials},
    error::{StoreError, StoreResult},
};

use crate::store::MongoDbStore;

/// Connects to MongoDB and verifies the deployment answers a `ping`.
#[derive(Debug, Clone, Default)]
pub struct MongoDbConnector;

impl MongoDbConnector {
    pub fn new() -> Self {
        Self
    }

    /// Translates a descriptor into driver options.
    ///
    /// A URI is parsed verbatim and keeps its own credentials. Otherwise the
    /// seed list or the synthesized endpoint is used and the discrete
    /// credential, if any, is attached.
    pub async fn client_options(descriptor: &ConnectionDescriptor) -> StoreResult<ClientOptions> {
        let mut options = match descriptor.target() {
            ConnectionTarget::Uri(uri) | ConnectionTarget::Endpoint(uri) => {
                ClientOptions::parse(&uri).await.map_err(|e| {
                    StoreError::ConfigurationIncomplete(format!("invalid connection string: {e}"))
                })?
            }
            ConnectionTarget::Hosts(hosts) => {
                let mut options = ClientOptions::default();
                options.hosts = hosts
                    .iter()
                    .map(|host| {
                        ServerAddress::parse(host).map_err(|e| {
                            StoreError::ConfigurationIncomplete(format!("invalid host {host}: {e}"))
                        })
                    })
                    .collect::<StoreResult<Vec<_>>>()?;
                options
            }
        };

        if options.app_name.is_none() {
            options.app_name = Some(descriptor.app_name.clone());
        }
        if let Some(credentials) = descriptor.credentials() {
            options.credential = Some(credential(credentials)?);
        }

        Ok(options)
    }
}

fn credential(credentials: Credentials) -> StoreResult<Credential> {
    let mut credential = Credential::default();
    credential.username = Some(credentials.username);
    credential.password = Some(credentials.password);
    credential.source = Some(credentials.source);

    if let Some(mechanism) = credentials.mechanism {
        credential.mechanism = Some(AuthMechanism::from_str(&mechanism).map_err(|e| {
            StoreError::ConfigurationIncomplete(format!(
                "unknown authentication mechanism {mechanism}: {e}"
            ))
        })?);
    }
    if !credentials.mechanism_properties.is_empty() {
        credential.mechanism_properties = Some(
            credentials
                .mechanism_properties
                .into_iter()
                .map(|(key, value)| (key, value.into()))
                .collect::<Document>(),
        );
    }

    Ok(credential)
}

#[async_trait]
impl Connector for MongoDbConnector {
    type Backend = MongoDbStore;

    async fn connect(&self, descriptor: &ConnectionDescriptor) -> StoreResult<MongoDbStore> {
        let options = Self::client_options(descriptor).await?;
        debug!(hosts = ?options.hosts, database = %descriptor.database, "connecting to mongodb");

        let client = Client::with_options(options).map_err(|e| StoreError::operation(e))?;
        client
            .database(&descriptor.database)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| StoreError::operation(e))?;

        Ok(MongoDbStore::new(client))
    }
}

#[cfg(test)]
mod tests {
    use crawldb_core::config::{ConfigResolver, ConnectOptions, ValueConfigSource};

    use super::*;

    fn descriptor(options: ConnectOptions) -> ConnectionDescriptor {
        ConfigResolver::default().resolve(&options, &ValueConfigSource::new())
    }

    #[tokio::test]
    async fn seed_list_with_credentials() {
        let options = MongoDbConnector::client_options(&descriptor(
            ConnectOptions::new()
                .with_hosts(["db-a:27017", "db-b:27018"])
                .with_username("crawler")
                .with_password("secret")
                .with_auth_mechanism("SCRAM-SHA-256"),
        ))
        .await
        .unwrap();

        assert_eq!(
            options.hosts,
            vec![
                ServerAddress::parse("db-a:27017").unwrap(),
                ServerAddress::parse("db-b:27018").unwrap(),
            ]
        );
        assert_eq!(options.app_name.as_deref(), Some("crawldb"));

        let credential = options.credential.unwrap();
        assert_eq!(credential.username.as_deref(), Some("crawler"));
        assert_eq!(credential.source.as_deref(), Some("admin"));
        assert_eq!(credential.mechanism, Some(AuthMechanism::ScramSha256));
    }

    #[tokio::test]
    async fn endpoint_without_credentials() {
        let options = MongoDbConnector::client_options(&descriptor(
            ConnectOptions::new().with_host("mongo").with_port(27100),
        ))
        .await
        .unwrap();

        assert_eq!(options.hosts, vec![ServerAddress::parse("mongo:27100").unwrap()]);
        assert!(options.credential.is_none());
    }

    #[tokio::test]
    async fn unknown_mechanism_is_a_configuration_error() {
        let result = MongoDbConnector::client_options(&descriptor(
            ConnectOptions::new()
                .with_username("crawler")
                .with_password("secret")
                .with_auth_mechanism("NOT-A-MECHANISM"),
        ))
        .await;

        assert!(matches!(result, Err(StoreError::ConfigurationIncomplete(_))));
    }

    #[tokio::test]
    async fn malformed_uri_is_a_configuration_error() {
        let result = MongoDbConnector::client_options(&descriptor(
            ConnectOptions::new().with_uri("not-a-mongodb-uri"),
        ))
        .await;

        assert!(matches!(result, Err(StoreError::ConfigurationIncomplete(_))));
    }
}
