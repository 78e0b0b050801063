use super::{Registration, RegistrationId};

pub type DbResult<T = ()> = Result<T, DbError>;

/// Key of the id index list, newest id first.
pub const INDEX_KEY: &str = "registrations:list";
/// Prefix of the per-registration record keys.
pub const RECORD_PREFIX: &str = "registration:";

pub fn record_key(id: &RegistrationId) -> String {
    format!("{RECORD_PREFIX}{}", id.0)
}

#[derive(thiserror::Error, Debug)]
#[error("Db Error: {inner}")]
pub struct DbError {
    #[from]
    inner: anyhow::Error,
}

/// Registration storage laid out as an id index plus one record per id.
pub trait Db: Send + Sync {
    /// Stores the record and prepends its id to the index.
    fn save(&self, registration: Registration) -> DbResult;
    /// All records, newest first.
    fn list(&self) -> DbResult<Vec<Registration>>;
    /// Returns `false` if no record with that id exists.
    fn delete(&self, id: &RegistrationId) -> DbResult<bool>;
    /// Removes every record and clears the index, returning the number of records removed.
    fn delete_all(&self) -> DbResult<usize>;
}

/// Shared tail of `Db::list`: dedup the ids, drop dangling ones and order newest first.
pub(crate) fn assemble_listing(
    ids: impl IntoIterator<Item = RegistrationId>,
    mut fetch: impl FnMut(&RegistrationId) -> DbResult<Option<Registration>>,
) -> DbResult<Vec<Registration>> {
    let mut seen = std::collections::HashSet::new();
    let mut registrations = Vec::new();
    for id in ids {
        if !seen.insert(id.clone()) {
            continue;
        }
        if let Some(registration) = fetch(&id)? {
            registrations.push(registration);
        }
    }
    registrations.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(registrations)
}
