pub mod api;
pub mod config;
pub mod domain;
pub mod email_client;
pub mod in_memory_db;
pub mod sled_db;
pub mod telemetry;

pub use domain::{
    db, delete_all_registrations, delete_registration, list_registrations, register,
    DeleteError, RegisterError, Registration, RegistrationForm, RegistrationId, ValidationError,
};
