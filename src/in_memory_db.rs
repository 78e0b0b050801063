use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use anyhow::anyhow;

use crate::domain::{
    db::{assemble_listing, DbResult},
    Registration, RegistrationId,
};

#[derive(Default)]
#[cfg_attr(test, derive(Debug))]
struct Inner {
    records: HashMap<RegistrationId, Registration>,
    index: Vec<RegistrationId>,
}

#[derive(Default, Clone)]
#[cfg_attr(test, derive(Debug))]
pub struct Db {
    inner: Arc<Mutex<Inner>>,
}

pub fn init_db() -> Db {
    Db::default()
}

impl Db {
    fn lock(&self) -> DbResult<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| anyhow!("in-memory store lock poisoned").into())
    }
}

impl crate::domain::db::Db for Db {
    fn save(&self, registration: Registration) -> DbResult {
        let mut inner = self.lock()?;
        inner.index.insert(0, registration.id.clone());
        inner.records.insert(registration.id.clone(), registration);
        Ok(())
    }

    fn list(&self) -> DbResult<Vec<Registration>> {
        let inner = self.lock()?;
        let ids = if inner.index.is_empty() {
            inner.records.keys().cloned().collect()
        } else {
            inner.index.clone()
        };
        assemble_listing(ids, |id| Ok(inner.records.get(id).cloned()))
    }

    fn delete(&self, id: &RegistrationId) -> DbResult<bool> {
        let mut inner = self.lock()?;
        if inner.records.remove(id).is_none() {
            return Ok(false);
        }
        inner.index.retain(|indexed| indexed != id);
        Ok(true)
    }

    fn delete_all(&self) -> DbResult<usize> {
        let mut inner = self.lock()?;
        let mut ids = std::mem::take(&mut inner.index);
        if ids.is_empty() {
            ids = inner.records.keys().cloned().collect();
        }
        ids.dedup();
        let removed = ids
            .iter()
            .filter(|id| inner.records.remove(*id).is_some())
            .count();
        Ok(removed)
    }
}
