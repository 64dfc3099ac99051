//! In-memory storage for integration tests
//!
//! - [`MemoryIngestStore`]: an [`IngestStore`] with serialized transactions,
//!   snapshot-and-swap commits and failure injection
//! - [`MemoryAccessStore`]: an [`AccessStore`] over two maps
//! - payload and fixture builders
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use kogase_shared::auth::authorization::AccessStore;
use kogase_shared::auth::middleware::{Principal, UserPrincipal};
use kogase_shared::ingest::store::{IngestStore, IngestTx, StoreError};
use kogase_shared::ingest::EventPayload;
use kogase_shared::models::{
    device::{Device, DeviceTouch, NewDevice},
    event::{Event, NewEvent},
    project::Project,
    project_user::ProjectRole,
    user::UserRole,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

/// Committed contents of a [`MemoryIngestStore`]
#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    pub devices: Vec<Device>,
    pub events: Vec<Event>,
}

#[derive(Debug, Default)]
struct Counters {
    device_inserts: AtomicUsize,
    device_updates: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
}

/// Knobs for simulating storage behaviour
#[derive(Debug, Clone, Default)]
pub struct Faults {
    /// Fail the Nth event insert (1-based) of every transaction
    pub fail_event_insert: Option<usize>,

    /// Make the first device insert lose a race to a concurrent writer
    pub lose_insert_race: bool,
}

/// Transactions run one at a time, each on a private copy of the state
#[derive(Clone, Default)]
pub struct MemoryIngestStore {
    state: Arc<AsyncMutex<MemoryState>>,
    counters: Arc<Counters>,
    faults: Arc<Mutex<Faults>>,
}

impl MemoryIngestStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_faults(faults: Faults) -> Self {
        let store = Self::default();
        *store.faults.lock().unwrap() = faults;
        store
    }

    pub async fn snapshot(&self) -> MemoryState {
        self.state.lock().await.clone()
    }

    pub fn device_inserts(&self) -> usize {
        self.counters.device_inserts.load(Ordering::SeqCst)
    }

    pub fn device_updates(&self) -> usize {
        self.counters.device_updates.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.counters.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.counters.rollbacks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IngestStore for MemoryIngestStore {
    async fn begin(&self) -> Result<Box<dyn IngestTx>, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        let faults = self.faults.lock().unwrap().clone();

        Ok(Box::new(MemoryTx {
            guard,
            working,
            counters: self.counters.clone(),
            faults,
            event_inserts: 0,
        }))
    }
}

struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    counters: Arc<Counters>,
    faults: Faults,
    event_inserts: usize,
}

impl MemoryTx {
    fn live_device(&self, project_id: Uuid, device_id: &str) -> Option<&Device> {
        self.working
            .devices
            .iter()
            .find(|d| d.project_id == project_id && d.device_id == device_id && d.deleted_at.is_none())
    }
}

fn device_from(new: &NewDevice) -> Device {
    let now = Utc::now();
    Device {
        id: new.id,
        project_id: new.project_id,
        device_id: new.device_id.clone(),
        platform: new.platform.clone(),
        os_version: new.os_version.clone(),
        app_version: new.app_version.clone(),
        first_seen: new.seen_at,
        last_seen: new.seen_at,
        ip_address: new.ip_address.clone(),
        country: String::new(),
        created_at: now,
        updated_at: now,
        deleted_at: None,
    }
}

#[async_trait]
impl IngestTx for MemoryTx {
    async fn find_device(
        &mut self,
        project_id: Uuid,
        device_id: &str,
    ) -> Result<Option<Device>, StoreError> {
        Ok(self.live_device(project_id, device_id).cloned())
    }

    async fn insert_device(&mut self, device: &NewDevice) -> Result<Option<Device>, StoreError> {
        if self.faults.lose_insert_race {
            // Another writer committed the same device first
            self.faults.lose_insert_race = false;
            let mut rival = device_from(device);
            rival.id = Uuid::new_v4();
            rival.first_seen = device.seen_at - chrono::Duration::seconds(1);
            rival.last_seen = rival.first_seen;
            self.working.devices.push(rival);
            return Ok(None);
        }

        if self.live_device(device.project_id, &device.device_id).is_some() {
            return Ok(None);
        }

        let created = device_from(device);
        self.working.devices.push(created.clone());
        self.counters.device_inserts.fetch_add(1, Ordering::SeqCst);
        Ok(Some(created))
    }

    async fn update_device(&mut self, id: Uuid, touch: &DeviceTouch) -> Result<Device, StoreError> {
        let device = self
            .working
            .devices
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| StoreError::Backend(format!("no device {}", id)))?;

        device.last_seen = device.last_seen.max(touch.seen_at);
        device.os_version = touch.os_version.clone();
        device.app_version = touch.app_version.clone();
        device.ip_address = touch.ip_address.clone();
        device.updated_at = Utc::now();

        self.counters.device_updates.fetch_add(1, Ordering::SeqCst);
        Ok(device.clone())
    }

    async fn insert_event(&mut self, event: &NewEvent) -> Result<Event, StoreError> {
        self.event_inserts += 1;
        if self.faults.fail_event_insert == Some(self.event_inserts) {
            return Err(StoreError::Backend("injected event insert failure".to_string()));
        }

        let stored = Event {
            id: event.id,
            project_id: event.project_id,
            device_id: event.device_id,
            event_type: event.event_type,
            event_name: event.event_name.clone(),
            parameters: event.parameters.clone(),
            timestamp: event.timestamp,
            received_at: event.received_at,
            created_at: event.received_at,
            deleted_at: None,
        };
        self.working.events.push(stored.clone());
        Ok(stored)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTx {
            mut guard,
            working,
            counters,
            ..
        } = *self;
        *guard = working;
        counters.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.counters.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// [`AccessStore`] over in-memory projects and memberships
#[derive(Default)]
pub struct MemoryAccessStore {
    projects: Mutex<HashMap<Uuid, Project>>,
    members: Mutex<HashMap<(Uuid, Uuid), ProjectRole>>,
}

impl MemoryAccessStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_project(&self, owner_id: Uuid) -> Project {
        let project = Project {
            id: Uuid::new_v4(),
            name: "Game1".to_string(),
            api_key: format!("kg_{}", Uuid::new_v4().simple()),
            owner_id,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        };
        self.projects.lock().unwrap().insert(project.id, project.clone());
        project
    }

    pub fn soft_delete(&self, project_id: Uuid) {
        if let Some(p) = self.projects.lock().unwrap().get_mut(&project_id) {
            p.deleted_at = Some(Utc::now());
        }
    }

    pub fn grant(&self, project_id: Uuid, user_id: Uuid, role: ProjectRole) {
        self.members.lock().unwrap().insert((project_id, user_id), role);
    }

    pub fn revoke(&self, project_id: Uuid, user_id: Uuid) {
        self.members.lock().unwrap().remove(&(project_id, user_id));
    }
}

#[async_trait]
impl AccessStore for MemoryAccessStore {
    async fn find_project(&self, project_id: Uuid) -> Result<Option<Project>, sqlx::Error> {
        Ok(self
            .projects
            .lock()
            .unwrap()
            .get(&project_id)
            .filter(|p| p.deleted_at.is_none())
            .cloned())
    }

    async fn membership_role(
        &self,
        project_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<ProjectRole>, sqlx::Error> {
        Ok(self.members.lock().unwrap().get(&(project_id, user_id)).copied())
    }
}

pub fn user_principal(role: UserRole) -> (Uuid, Principal) {
    let user_id = Uuid::new_v4();
    let principal = Principal::User(UserPrincipal {
        user_id,
        role,
        token_id: Uuid::new_v4(),
    });
    (user_id, principal)
}

/// A complete custom event for `device_id`
pub fn event(device_id: &str, name: &str) -> EventPayload {
    EventPayload {
        device_id: Some(device_id.to_string()),
        event_type: Some("custom".to_string()),
        event_name: Some(name.to_string()),
        parameters: None,
        timestamp: None,
        platform: Some("iOS".to_string()),
        os_version: Some("17".to_string()),
        app_version: Some("1.0".to_string()),
    }
}
