use bytes::Bytes;
use futures::StreamExt;
use google_cloud_auth::credentials::CredentialsFile;
use google_cloud_pubsub::client::{Client, ClientConfig};
use google_cloud_pubsub::subscriber::ReceivedMessage;
use google_cloud_pubsub::subscription::MessageStream;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::channel::base::{MessageSource, MessageSubscription, SourceMessage};
use crate::error::{ErrorKind, RelayResult};
use crate::relay_error;
use crate::types::ChannelRef;

/// Message source backed by Google Cloud Pub/Sub.
///
/// Clients are created lazily per project and cached for the lifetime of the
/// source. Authentication uses the supplied service account key when one is
/// configured, and falls back to application default credentials (or the
/// emulator, when `PUBSUB_EMULATOR_HOST` is set) otherwise.
#[derive(Clone)]
pub struct PubSubMessageSource {
    service_account_key: Option<String>,
    clients: Arc<Mutex<HashMap<String, Client>>>,
}

impl PubSubMessageSource {
    pub fn new(service_account_key: Option<String>) -> Self {
        Self {
            service_account_key,
            clients: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    async fn client_config(&self, project: &str) -> RelayResult<ClientConfig> {
        let mut config = match &self.service_account_key {
            Some(key) => {
                let credentials = CredentialsFile::new_from_str(key).await.map_err(|err| {
                    relay_error!(
                        ErrorKind::AuthenticationFailed,
                        "Failed to parse service account key",
                        err.to_string()
                    )
                })?;

                ClientConfig::default()
                    .with_credentials(credentials)
                    .await
                    .map_err(|err| {
                        relay_error!(
                            ErrorKind::AuthenticationFailed,
                            "Failed to authenticate with service account key",
                            err.to_string()
                        )
                    })?
            }
            None => ClientConfig::default().with_auth().await.map_err(|err| {
                relay_error!(
                    ErrorKind::AuthenticationFailed,
                    "Failed to load application default credentials",
                    err.to_string()
                )
            })?,
        };
        config.project_id = Some(project.to_string());

        Ok(config)
    }

    async fn project_client(&self, project: &str) -> RelayResult<Client> {
        {
            let clients = self.clients.lock().await;
            if let Some(client) = clients.get(project) {
                return Ok(client.clone());
            }
        }

        let config = self.client_config(project).await?;
        let client = Client::new(config).await.map_err(|err| {
            relay_error!(
                ErrorKind::SubscriptionFailed,
                "Failed to create Pub/Sub client",
                err.to_string()
            )
        })?;

        let mut clients = self.clients.lock().await;
        Ok(clients
            .entry(project.to_string())
            .or_insert(client)
            .clone())
    }
}

impl MessageSource for PubSubMessageSource {
    type Subscription = PubSubSubscription;

    async fn subscribe(&self, channel: &ChannelRef) -> RelayResult<PubSubSubscription> {
        let client = self.project_client(&channel.project).await?;
        let subscription = client.subscription(&channel.subscription);

        let stream = subscription.subscribe(None).await.map_err(|err| {
            relay_error!(
                ErrorKind::SubscriptionFailed,
                "Failed to subscribe to Pub/Sub subscription",
                format!("channel {channel}: {err}")
            )
        })?;

        Ok(PubSubSubscription { stream })
    }
}

/// Subscription handed out by [`PubSubMessageSource`].
pub struct PubSubSubscription {
    stream: MessageStream,
}

impl MessageSubscription for PubSubSubscription {
    type Message = PubSubMessage;

    async fn next_message(&mut self) -> Option<PubSubMessage> {
        let received = self.stream.next().await?;
        let payload = Bytes::from(received.message.data.clone());

        Some(PubSubMessage { payload, received })
    }
}

/// Message handed out by [`PubSubSubscription`].
pub struct PubSubMessage {
    payload: Bytes,
    received: ReceivedMessage,
}

impl SourceMessage for PubSubMessage {
    fn payload(&self) -> &Bytes {
        &self.payload
    }

    async fn ack(self) -> RelayResult<()> {
        self.received.ack().await.map_err(|err| {
            relay_error!(
                ErrorKind::AckFailed,
                "Message acknowledgment failed",
                err.to_string()
            )
        })
    }
}
