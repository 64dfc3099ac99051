/// Device registry: client identifier to stored device
///
/// [`resolve_device`] is an upsert built from three primitive operations so it
/// works against any [`IngestTx`]:
///
/// 1. Look the device up. If found, refresh its liveness fields.
/// 2. Otherwise try to insert it. If the insert lands, that is the new device.
/// 3. If the insert hit the uniqueness constraint, another request created the
///    device in the meantime: read it back and refresh it as in step 1.
///
/// Calling it any number of times for the same (project, identifier), from any
/// number of concurrent requests, leaves exactly one device row.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

use super::store::{IngestTx, StoreError};
use crate::models::device::{Device, DeviceTouch, NewDevice};

/// What the client reported about its device on one request
#[derive(Debug, Clone, Copy)]
pub struct DeviceReport<'a> {
    pub project_id: Uuid,
    pub device_id: &'a str,
    pub platform: &'a str,
    pub os_version: &'a str,
    pub app_version: &'a str,
    pub ip_address: &'a str,
}

impl DeviceReport<'_> {
    fn touch(&self, now: DateTime<Utc>) -> DeviceTouch {
        DeviceTouch {
            os_version: self.os_version.to_string(),
            app_version: self.app_version.to_string(),
            ip_address: self.ip_address.to_string(),
            seen_at: now,
        }
    }
}

/// Finds or creates the device described by `report`
pub async fn resolve_device(
    tx: &mut dyn IngestTx,
    report: &DeviceReport<'_>,
    now: DateTime<Utc>,
) -> Result<Device, StoreError> {
    if let Some(existing) = tx.find_device(report.project_id, report.device_id).await? {
        return tx.update_device(existing.id, &report.touch(now)).await;
    }

    let new_device = NewDevice {
        id: Uuid::new_v4(),
        project_id: report.project_id,
        device_id: report.device_id.to_string(),
        platform: report.platform.to_string(),
        os_version: report.os_version.to_string(),
        app_version: report.app_version.to_string(),
        ip_address: report.ip_address.to_string(),
        seen_at: now,
    };

    if let Some(created) = tx.insert_device(&new_device).await? {
        tracing::debug!(project_id = %report.project_id, device_id = report.device_id, "Registered new device");
        return Ok(created);
    }

    // Lost a first-sighting race; the winner's row is committed by now
    tracing::debug!(project_id = %report.project_id, device_id = report.device_id, "Device created concurrently, re-reading");
    let winner = tx
        .find_device(report.project_id, report.device_id)
        .await?
        .ok_or_else(|| {
            StoreError::Backend(format!(
                "device {} conflicted on insert but could not be read back",
                report.device_id
            ))
        })?;

    tx.update_device(winner.id, &report.touch(now)).await
}

/// Per-transaction memo of resolved devices
///
/// Within one batch each distinct identifier is resolved through the store once;
/// later events for the same identifier reuse the result. The cache lives exactly
/// as long as the transaction it was filled from.
#[derive(Debug, Default)]
pub struct BatchDeviceCache {
    devices: HashMap<String, Device>,
}

impl BatchDeviceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves through the store on first sight of an identifier, from memory after
    pub async fn resolve(
        &mut self,
        tx: &mut dyn IngestTx,
        report: &DeviceReport<'_>,
        now: DateTime<Utc>,
    ) -> Result<Device, StoreError> {
        if let Some(device) = self.devices.get(report.device_id) {
            return Ok(device.clone());
        }

        let device = resolve_device(tx, report, now).await?;
        self.devices.insert(report.device_id.to_string(), device.clone());
        Ok(device)
    }

    /// Number of distinct devices resolved so far
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
