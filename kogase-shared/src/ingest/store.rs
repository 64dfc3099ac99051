/// Transactional storage used by the ingestion pipeline
///
/// The pipeline never talks to a connection directly. It asks an [`IngestStore`]
/// for a transaction and does all of its device and event writes through the
/// returned [`IngestTx`]; nothing becomes visible to readers until
/// [`IngestTx::commit`]. Dropping a transaction without committing discards
/// its writes.
///
/// [`PgIngestStore`] is the PostgreSQL implementation.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::models::{
    device::{Device, DeviceTouch, NewDevice},
    event::{Event, NewEvent},
};

/// Storage failure during ingestion
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Failure from a non-SQL backend
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Opens ingestion transactions
#[async_trait]
pub trait IngestStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn IngestTx>, StoreError>;
}

/// One open ingestion transaction
#[async_trait]
pub trait IngestTx: Send {
    /// Live device with this client identifier in a project
    async fn find_device(
        &mut self,
        project_id: Uuid,
        device_id: &str,
    ) -> Result<Option<Device>, StoreError>;

    /// Creates a device; `Ok(None)` if a live device with the same
    /// (project, identifier) already exists
    async fn insert_device(&mut self, device: &NewDevice) -> Result<Option<Device>, StoreError>;

    /// Refreshes liveness fields of an existing device
    async fn update_device(&mut self, id: Uuid, touch: &DeviceTouch) -> Result<Device, StoreError>;

    /// Appends an event
    async fn insert_event(&mut self, event: &NewEvent) -> Result<Event, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// [`IngestStore`] backed by a PostgreSQL pool
#[derive(Clone)]
pub struct PgIngestStore {
    pool: PgPool,
}

impl PgIngestStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IngestStore for PgIngestStore {
    async fn begin(&self) -> Result<Box<dyn IngestTx>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgIngestTx { tx }))
    }
}

/// A sqlx transaction; rolled back by sqlx if dropped uncommitted
pub struct PgIngestTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl IngestTx for PgIngestTx {
    async fn find_device(
        &mut self,
        project_id: Uuid,
        device_id: &str,
    ) -> Result<Option<Device>, StoreError> {
        Ok(Device::find_live(&mut *self.tx, project_id, device_id).await?)
    }

    async fn insert_device(&mut self, device: &NewDevice) -> Result<Option<Device>, StoreError> {
        Ok(Device::insert_if_absent(&mut *self.tx, device).await?)
    }

    async fn update_device(&mut self, id: Uuid, touch: &DeviceTouch) -> Result<Device, StoreError> {
        Ok(Device::touch(&mut *self.tx, id, touch).await?)
    }

    async fn insert_event(&mut self, event: &NewEvent) -> Result<Event, StoreError> {
        Ok(Event::insert(&mut *self.tx, event).await?)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
