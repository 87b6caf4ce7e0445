//! In-memory [`Store`] implementation for tests.
//!
//! State lives behind a `std::sync::Mutex`. A transaction works on a private
//! copy of the state and remembers the version it started from; commit
//! swaps the copy in only if no other transaction committed in between,
//! otherwise it fails and nothing is applied.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::models::{ContactPlacement, EdgeEndpoints, Sibling, Status};

use super::{Store, StoreTx};

#[derive(Debug, Clone)]
struct StoredContact {
    status_id: Option<String>,
    position: i64,
    cluster_id: Option<i64>,
    seq: u64,
}

#[derive(Debug, Clone, Default)]
struct State {
    version: u64,
    next_seq: u64,
    statuses: HashMap<String, Status>,
    contacts: HashMap<String, StoredContact>,
    edges: Vec<EdgeEndpoints>,
}

/// In-memory store with optimistic concurrency control.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
    fail_writes_after: Arc<Mutex<Option<usize>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_status(&self, id: &str, name: &str) {
        let mut state = self.state.lock().unwrap();
        let sort_order = state.statuses.len() as i64 + 1;
        state.statuses.insert(
            id.to_string(),
            Status {
                id: id.to_string(),
                name: name.to_string(),
                sort_order,
                is_active: true,
            },
        );
        state.version += 1;
    }

    /// Insert a contact. Contacts are listed in insertion order.
    pub fn add_contact(&self, id: &str, status_id: Option<&str>, position: i64) {
        let mut state = self.state.lock().unwrap();
        let seq = state.next_seq;
        state.next_seq += 1;
        state.contacts.insert(
            id.to_string(),
            StoredContact {
                status_id: status_id.map(str::to_string),
                position,
                cluster_id: None,
                seq,
            },
        );
        state.version += 1;
    }

    pub fn add_edge(&self, source_id: &str, target_id: &str) {
        let mut state = self.state.lock().unwrap();
        state.edges.push(EdgeEndpoints::new(source_id, target_id));
        state.version += 1;
    }

    /// Make every transaction fail once it has issued `n` writes.
    pub fn fail_writes_after(&self, n: usize) {
        *self.fail_writes_after.lock().unwrap() = Some(n);
    }

    pub fn placement(&self, contact_id: &str) -> Option<(Option<String>, i64)> {
        let state = self.state.lock().unwrap();
        state
            .contacts
            .get(contact_id)
            .map(|c| (c.status_id.clone(), c.position))
    }

    pub fn cluster_id(&self, contact_id: &str) -> Option<i64> {
        let state = self.state.lock().unwrap();
        state.contacts.get(contact_id).and_then(|c| c.cluster_id)
    }

    /// Contact ids of a column ordered by position.
    pub fn column(&self, status_id: &str) -> Vec<(String, i64)> {
        let state = self.state.lock().unwrap();
        siblings_of(&state, status_id)
            .into_iter()
            .map(|s| (s.contact_id, s.position))
            .collect()
    }
}

fn siblings_of(state: &State, status_id: &str) -> Vec<Sibling> {
    let mut siblings: Vec<Sibling> = state
        .contacts
        .iter()
        .filter(|(_, c)| c.status_id.as_deref() == Some(status_id))
        .map(|(id, c)| Sibling {
            contact_id: id.clone(),
            position: c.position,
        })
        .collect();
    siblings.sort_by(|a, b| {
        a.position
            .cmp(&b.position)
            .then_with(|| a.contact_id.cmp(&b.contact_id))
    });
    siblings
}

#[async_trait]
impl Store for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>> {
        let staged = self.state.lock().unwrap().clone();
        Ok(Box::new(InMemoryTx {
            shared: self.state.clone(),
            base_version: staged.version,
            staged,
            writes: 0,
            fail_writes_after: *self.fail_writes_after.lock().unwrap(),
            committed: false,
        }))
    }
}

struct InMemoryTx {
    shared: Arc<Mutex<State>>,
    base_version: u64,
    staged: State,
    writes: usize,
    fail_writes_after: Option<usize>,
    committed: bool,
}

impl InMemoryTx {
    fn record_write(&mut self) -> Result<()> {
        if let Some(limit) = self.fail_writes_after {
            if self.writes >= limit {
                bail!("injected write failure after {} writes", limit);
            }
        }
        self.writes += 1;
        Ok(())
    }
}

#[async_trait]
impl StoreTx for InMemoryTx {
    async fn get_contact(&mut self, contact_id: &str) -> Result<Option<ContactPlacement>> {
        Ok(self
            .staged
            .contacts
            .get(contact_id)
            .map(|c| ContactPlacement {
                contact_id: contact_id.to_string(),
                status_id: c.status_id.clone(),
                position: c.position,
            }))
    }

    async fn get_status(&mut self, status_id: &str) -> Result<Option<Status>> {
        Ok(self.staged.statuses.get(status_id).cloned())
    }

    async fn list_siblings(&mut self, status_id: &str) -> Result<Vec<Sibling>> {
        Ok(siblings_of(&self.staged, status_id))
    }

    async fn list_all_contacts(&mut self) -> Result<Vec<String>> {
        let mut ids: Vec<(&u64, &String)> = self
            .staged
            .contacts
            .iter()
            .map(|(id, c)| (&c.seq, id))
            .collect();
        ids.sort();
        Ok(ids.into_iter().map(|(_, id)| id.clone()).collect())
    }

    async fn list_all_edges(&mut self) -> Result<Vec<EdgeEndpoints>> {
        Ok(self.staged.edges.clone())
    }

    async fn update_position(
        &mut self,
        contact_id: &str,
        status_id: &str,
        position: i64,
    ) -> Result<()> {
        self.record_write()?;
        match self.staged.contacts.get_mut(contact_id) {
            Some(c) => {
                c.status_id = Some(status_id.to_string());
                c.position = position;
                Ok(())
            }
            None => bail!("no contact row to update: {}", contact_id),
        }
    }

    async fn update_cluster_label(&mut self, contact_id: &str, label: i64) -> Result<()> {
        self.record_write()?;
        match self.staged.contacts.get_mut(contact_id) {
            Some(c) => {
                c.cluster_id = Some(label);
                Ok(())
            }
            None => bail!("no contact row to update: {}", contact_id),
        }
    }

    async fn commit(&mut self) -> Result<()> {
        if self.committed {
            bail!("transaction already committed");
        }
        let mut shared = self.shared.lock().unwrap();
        if shared.version != self.base_version {
            bail!("serialization conflict: store changed since the transaction began");
        }
        let mut next = std::mem::take(&mut self.staged);
        next.version = self.base_version + 1;
        *shared = next;
        self.committed = true;
        Ok(())
    }
}
