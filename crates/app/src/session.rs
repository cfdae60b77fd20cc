//! One connection session and the poll cycle run inside it.

use blegate_domain::item::{CharacteristicItem, Method};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::envelope::CollectedData;
use crate::error::BleError;
use crate::notification::NotificationRegistry;
use crate::ports::{BleClient, Notification, NotificationSink, ServiceInfo};

/// State that only lives as long as one connection.
///
/// Dropping the session drops its subscriptions, its cached service tree
/// and its notification channel; the next connect starts from scratch.
#[derive(Debug)]
pub struct Session {
    registry: NotificationRegistry,
    sink: NotificationSink,
    pushes: mpsc::UnboundedReceiver<Notification>,
    services: Option<Vec<ServiceInfo>>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        let (sink, pushes) = mpsc::unbounded_channel();
        Self {
            registry: NotificationRegistry::new(),
            sink,
            pushes,
            services: None,
        }
    }

    #[must_use]
    pub const fn registry(&self) -> &NotificationRegistry {
        &self.registry
    }

    /// Wait for the next push of this session.
    pub async fn next_push(&mut self) -> Option<Notification> {
        self.pushes.recv().await
    }

    /// Run one poll cycle over `items`.
    ///
    /// `read` items are read and collected. `notify` items not yet
    /// subscribed in this session get their handle resolved, are
    /// subscribed, and deliver later through [`next_push`](Self::next_push).
    /// Transient errors skip the item.
    ///
    /// # Errors
    ///
    /// Returns the first link-level [`BleError`]; the session is then
    /// unusable.
    pub async fn poll<C: BleClient>(
        &mut self,
        client: &C,
        device: &str,
        items: &mut [CharacteristicItem],
    ) -> Result<CollectedData, BleError> {
        let mut collected = CollectedData::default();

        for index in 0..items.len() {
            let item = &items[index];
            match item.method {
                Method::Read => match client.read_characteristic(item.uuid).await {
                    Ok(data) => collected.push(item, data),
                    Err(err) if err.is_transient() => {
                        tracing::warn!(
                            device,
                            key = %item.key,
                            uuid = %item.uuid,
                            %err,
                            "skipping item"
                        );
                    }
                    Err(err) => return Err(err),
                },
                Method::Notify => {
                    let uuid = item.uuid;
                    if self.registry.is_registered(&uuid) {
                        continue;
                    }
                    match self.subscribe(client, uuid, items).await {
                        Ok(()) => tracing::debug!(device, %uuid, "subscribed"),
                        Err(err) if err.is_transient() => {
                            tracing::warn!(device, %uuid, %err, "cannot subscribe");
                        }
                        Err(err) => return Err(err),
                    }
                }
            }
        }

        Ok(collected)
    }

    async fn subscribe<C: BleClient>(
        &mut self,
        client: &C,
        uuid: Uuid,
        items: &mut [CharacteristicItem],
    ) -> Result<(), BleError> {
        let handle = self
            .services(client)
            .await?
            .iter()
            .flat_map(|service| &service.characteristics)
            .find(|characteristic| characteristic.uuid == uuid)
            .map(|characteristic| characteristic.handle)
            .ok_or(BleError::CharacteristicNotFound { uuid })?;

        for item in items.iter_mut().filter(|item| item.uuid == uuid) {
            item.handle = Some(handle);
        }

        client.subscribe(uuid, self.sink.clone()).await?;
        self.registry.register(uuid);
        Ok(())
    }

    /// The service tree, listed once per session.
    async fn services<C: BleClient>(&mut self, client: &C) -> Result<&[ServiceInfo], BleError> {
        if self.services.is_none() {
            self.services = Some(client.list_services().await?);
        }
        Ok(self.services.as_deref().unwrap_or_default())
    }
}
