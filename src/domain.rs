use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use self::db::{Db, DbError};

pub mod admin;
pub mod db;
pub mod export;
pub mod notify;

#[derive(Serialize, Deserialize, PartialEq, Eq, Hash, Debug, Clone)]
#[serde(transparent)]
pub struct RegistrationId(pub String);

impl RegistrationId {
    /// Time-ordered (UUIDv7) so ids sort roughly by creation.
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }
}

#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub id: RegistrationId,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_title_degree: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub questions: Option<String>,
    pub created_at: DateTime<Utc>,
    pub confirmation_number: String,
}

impl Registration {
    fn matches(&self, term: &str) -> bool {
        let contains = |field: &str| field.to_lowercase().contains(term);
        contains(&self.full_name)
            || contains(&self.email)
            || [&self.organization, &self.job_title_degree, &self.questions]
                .into_iter()
                .flatten()
                .any(|field| contains(field))
    }
}

/// Registration form as submitted. Every field is optional here so that a missing field is a
/// validation failure rather than a parse failure.
#[derive(Deserialize, Default, Clone, Debug)]
#[serde(rename_all = "camelCase", default)]
pub struct RegistrationForm {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub organization: Option<String>,
    pub job_title_degree: Option<String>,
    pub questions: Option<String>,
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Full name, email, and phone number are required")]
    MissingRegistrationFields,
    #[error("All fields are required")]
    MissingContactFields,
    #[error("Invalid email format")]
    InvalidEmail,
}

pub(crate) fn present(field: &Option<String>) -> Option<String> {
    field
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub fn is_valid_email(email: &str) -> bool {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL
        .get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles"))
        .is_match(email)
}

impl RegistrationForm {
    fn into_registration(self, now: DateTime<Utc>) -> Result<Registration, ValidationError> {
        let (full_name, email, phone) =
            match (present(&self.full_name), present(&self.email), present(&self.phone)) {
                (Some(full_name), Some(email), Some(phone)) => (full_name, email, phone),
                _ => return Err(ValidationError::MissingRegistrationFields),
            };
        if !is_valid_email(&email) {
            return Err(ValidationError::InvalidEmail);
        }
        Ok(Registration {
            id: RegistrationId::generate(),
            full_name,
            email,
            phone,
            organization: present(&self.organization),
            job_title_degree: present(&self.job_title_degree),
            questions: present(&self.questions),
            created_at: now,
            confirmation_number: confirmation_number(now),
        })
    }
}

const BASE36: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

fn to_base36(mut n: u64) -> String {
    let mut digits = Vec::new();
    loop {
        digits.push(BASE36[(n % 36) as usize] as char);
        n /= 36;
        if n == 0 {
            break;
        }
    }
    digits.iter().rev().collect()
}

/// `MAIA-<creation millis in base36>-<4 random base36 chars>`
pub fn confirmation_number(created_at: DateTime<Utc>) -> String {
    let millis = u64::try_from(created_at.timestamp_millis()).unwrap_or_default();
    let mut rng = rand::thread_rng();
    let suffix: String = (0..4)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("MAIA-{}-{suffix}", to_base36(millis))
}

#[derive(thiserror::Error, Debug)]
pub enum RegisterError {
    #[error("{0}")]
    Invalid(#[from] ValidationError),
    #[error("{0}")]
    DbError(#[from] DbError),
}

pub fn register(db: &dyn Db, form: RegistrationForm) -> Result<Registration, RegisterError> {
    let registration = form.into_registration(Utc::now())?;
    db.save(registration.clone())?;
    tracing::info!(
        id = %registration.id.0,
        confirmation = %registration.confirmation_number,
        "registration saved"
    );
    Ok(registration)
}

/// Newest first, optionally narrowed to records containing `search` (case-insensitive).
pub fn list_registrations(db: &dyn Db, search: Option<&str>) -> Result<Vec<Registration>, DbError> {
    let registrations = db.list()?;
    let term = match search.map(str::trim).filter(|s| !s.is_empty()) {
        Some(term) => term.to_lowercase(),
        None => return Ok(registrations),
    };
    Ok(registrations
        .into_iter()
        .filter(|registration| registration.matches(&term))
        .collect())
}

#[derive(thiserror::Error, Debug)]
pub enum DeleteError {
    #[error("Registration not found")]
    NotFound,
    #[error("{0}")]
    DbError(#[from] DbError),
}

pub fn delete_registration(db: &dyn Db, id: &RegistrationId) -> Result<(), DeleteError> {
    if db.delete(id)? {
        tracing::info!(id = %id.0, "registration deleted");
        Ok(())
    } else {
        Err(DeleteError::NotFound)
    }
}

pub fn delete_all_registrations(db: &dyn Db) -> Result<usize, DbError> {
    let deleted = db.delete_all()?;
    tracing::info!(deleted, "all registrations deleted");
    Ok(deleted)
}

#[derive(Serialize, Debug, PartialEq)]
pub struct DashboardStats {
    pub total: usize,
}

pub fn dashboard_stats(db: &dyn Db) -> Result<DashboardStats, DbError> {
    Ok(DashboardStats {
        total: db.list()?.len(),
    })
}

#[cfg(test)]
pub(crate) fn form(full_name: &str, email: &str, phone: &str) -> RegistrationForm {
    RegistrationForm {
        full_name: Some(full_name.to_string()),
        email: Some(email.to_string()),
        phone: Some(phone.to_string()),
        ..RegistrationForm::default()
    }
}
