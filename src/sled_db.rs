use std::path::Path;

use anyhow::{anyhow, Context};
use sled::transaction::{ConflictableTransactionError, TransactionError, TransactionalTree};

use crate::domain::{
    db::{assemble_listing, record_key, DbResult, INDEX_KEY, RECORD_PREFIX},
    Registration, RegistrationId,
};

#[derive(Clone)]
pub struct Db {
    tree: sled::Db,
}

pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Db> {
    let path = path.as_ref();
    let tree = sled::open(path).with_context(|| format!("open sled store at {}", path.display()))?;
    Ok(Db { tree })
}

/// Store that lives only as long as the handle, for tests and throwaway runs.
pub fn temporary() -> anyhow::Result<Db> {
    let tree = sled::Config::new()
        .temporary(true)
        .open()
        .context("open temporary sled store")?;
    Ok(Db { tree })
}

type TxResult<T> = Result<T, ConflictableTransactionError<anyhow::Error>>;

fn decode_index(raw: Option<sled::IVec>) -> anyhow::Result<Vec<RegistrationId>> {
    match raw {
        Some(bytes) => serde_json::from_slice(&bytes).context("decode registration index"),
        None => Ok(Vec::new()),
    }
}

fn read_index(tx: &TransactionalTree) -> TxResult<Vec<RegistrationId>> {
    decode_index(tx.get(INDEX_KEY)?).map_err(ConflictableTransactionError::Abort)
}

fn write_index(tx: &TransactionalTree, index: &[RegistrationId]) -> TxResult<()> {
    let encoded = serde_json::to_vec(index)
        .context("encode registration index")
        .map_err(ConflictableTransactionError::Abort)?;
    if index.is_empty() {
        tx.remove(INDEX_KEY)?;
    } else {
        tx.insert(INDEX_KEY, encoded)?;
    }
    Ok(())
}

fn flatten(err: TransactionError<anyhow::Error>) -> anyhow::Error {
    match err {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => anyhow!(e).context("sled transaction"),
    }
}

impl Db {
    fn get(&self, id: &RegistrationId) -> DbResult<Option<Registration>> {
        let raw = self
            .tree
            .get(record_key(id))
            .with_context(|| format!("read registration {}", id.0))?;
        let registration = raw
            .map(|bytes| serde_json::from_slice::<Registration>(&bytes))
            .transpose()
            .with_context(|| format!("decode registration {}", id.0))?;
        Ok(registration)
    }

    /// Ids of every stored record, including ones the index never learned about.
    fn scan_ids(&self) -> DbResult<Vec<RegistrationId>> {
        let mut ids = Vec::new();
        for key in self.tree.scan_prefix(RECORD_PREFIX).keys() {
            let key = key.context("scan registration keys")?;
            let id = std::str::from_utf8(&key[RECORD_PREFIX.len()..])
                .context("registration key is not utf-8")?;
            ids.push(RegistrationId(id.to_string()));
        }
        Ok(ids)
    }
}

impl crate::domain::db::Db for Db {
    fn save(&self, registration: Registration) -> DbResult {
        let key = record_key(&registration.id);
        let record = serde_json::to_vec(&registration).context("encode registration")?;
        self.tree
            .transaction(|tx| {
                let mut index = read_index(tx)?;
                index.insert(0, registration.id.clone());
                tx.insert(key.as_bytes(), record.as_slice())?;
                write_index(tx, &index)
            })
            .map_err(flatten)?;
        Ok(())
    }

    fn list(&self) -> DbResult<Vec<Registration>> {
        let index = decode_index(self.tree.get(INDEX_KEY).context("read registration index")?)?;
        let scanned = self.scan_ids()?;
        assemble_listing(index.into_iter().chain(scanned), |id| self.get(id))
    }

    fn delete(&self, id: &RegistrationId) -> DbResult<bool> {
        let key = record_key(id);
        let deleted = self
            .tree
            .transaction(|tx| {
                if tx.remove(key.as_bytes())?.is_none() {
                    return Ok(false);
                }
                let mut index = read_index(tx)?;
                index.retain(|indexed| indexed != id);
                write_index(tx, &index)?;
                Ok(true)
            })
            .map_err(flatten)?;
        Ok(deleted)
    }

    fn delete_all(&self) -> DbResult<usize> {
        let scanned = self.scan_ids()?;
        let deleted = self
            .tree
            .transaction(|tx| {
                let mut ids = read_index(tx)?;
                ids.extend(scanned.iter().cloned());
                ids.sort_by(|a, b| a.0.cmp(&b.0));
                ids.dedup();
                let mut deleted = 0;
                for id in &ids {
                    if tx.remove(record_key(id).as_bytes())?.is_some() {
                        deleted += 1;
                    }
                }
                write_index(tx, &[])?;
                Ok(deleted)
            })
            .map_err(flatten)?;
        Ok(deleted)
    }
}
