use std::sync::Arc;

use askama::Template;
use chrono::{Datelike, Utc};
use serde::Deserialize;

use super::{is_valid_email, present, Registration, ValidationError};

const EVENT_NAME: &str = "MAIA 2025 Professional AI Workshops";
const EVENT_LOCATION: &str = "ENS-Tetouan (Higher Normal School), Tetouan, Morocco";
const EVENT_DATE: &str = "December 20, 2025";
const EVENT_CONTACT: &str = "hichame.taoufik1@gmail.com";
const EVENT_ORGANIZER: &str = "MAIA Conference";

pub const CONFIRMATION_SUBJECT: &str = "Workshop Registration Confirmed - MAIA 2025";

#[derive(Debug, Clone, PartialEq)]
pub struct Email {
    pub from_name: &'static str,
    pub to: String,
    pub reply_to: Option<String>,
    pub subject: String,
    pub html_body: String,
}

/// Delivers an already rendered email. Implementations block until the provider answered.
pub trait Mailer: Send + Sync {
    fn send(&self, sender: &str, email: &Email) -> anyhow::Result<()>;
}

#[derive(Clone)]
struct Delivery {
    mailer: Arc<dyn Mailer>,
    sender: String,
    admin_email: String,
}

#[derive(thiserror::Error, Debug)]
pub enum NotifyError {
    #[error("Failed to render email")]
    Render(#[from] askama::Error),
    #[error("Failed to send email: {0}")]
    Send(#[source] anyhow::Error),
}

#[derive(Deserialize, Default, Clone, Debug)]
#[serde(default)]
pub struct ContactForm {
    pub name: Option<String>,
    pub email: Option<String>,
    pub subject: Option<String>,
    pub message: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ContactMessage {
    pub name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
}

impl ContactForm {
    pub fn validate(self) -> Result<ContactMessage, ValidationError> {
        let message = match (
            present(&self.name),
            present(&self.email),
            present(&self.subject),
            present(&self.message),
        ) {
            (Some(name), Some(email), Some(subject), Some(message)) => ContactMessage {
                name,
                email,
                subject,
                message,
            },
            _ => return Err(ValidationError::MissingContactFields),
        };
        if !is_valid_email(&message.email) {
            return Err(ValidationError::InvalidEmail);
        }
        Ok(message)
    }
}

#[derive(Template)]
#[template(path = "confirmation.html")]
struct ConfirmationTemplate<'a> {
    full_name: &'a str,
    confirmation_number: &'a str,
    organization: &'a str,
    position: &'a str,
    event_name: &'a str,
    event_location: &'a str,
    event_date: &'a str,
    event_contact_email: &'a str,
    event_organizer: &'a str,
    year: i32,
}

#[derive(Template)]
#[template(path = "contact.html")]
struct ContactTemplate<'a> {
    site: &'a str,
    name: &'a str,
    email: &'a str,
    subject: &'a str,
    lines: Vec<&'a str>,
}

pub fn confirmation_email(registration: &Registration) -> Result<Email, NotifyError> {
    let html_body = ConfirmationTemplate {
        full_name: &registration.full_name,
        confirmation_number: &registration.confirmation_number,
        organization: registration.organization.as_deref().unwrap_or_default(),
        position: registration.job_title_degree.as_deref().unwrap_or_default(),
        event_name: EVENT_NAME,
        event_location: EVENT_LOCATION,
        event_date: EVENT_DATE,
        event_contact_email: EVENT_CONTACT,
        event_organizer: EVENT_ORGANIZER,
        year: Utc::now().year(),
    }
    .render()?;
    Ok(Email {
        from_name: "MAIA 2025 Workshops",
        to: registration.email.clone(),
        reply_to: None,
        subject: CONFIRMATION_SUBJECT.to_string(),
        html_body,
    })
}

pub fn contact_email(admin_email: &str, message: &ContactMessage) -> Result<Email, NotifyError> {
    let html_body = ContactTemplate {
        site: "MAIA 2025 Workshop Website",
        name: &message.name,
        email: &message.email,
        subject: &message.subject,
        lines: message.message.lines().collect(),
    }
    .render()?;
    Ok(Email {
        from_name: "MAIA Workshop Contact",
        to: admin_email.to_string(),
        reply_to: Some(message.email.clone()),
        subject: format!("[MAIA Workshop Contact] {}", message.subject),
        html_body,
    })
}

/// Best-effort transactional mail. Without a configured mailer every send is a logged no-op.
#[derive(Clone, Default)]
pub struct Notifier {
    delivery: Option<Delivery>,
}

impl Notifier {
    pub fn disabled() -> Self {
        Self::default()
    }

    /// `admin_email` receives contact-form messages.
    pub fn new(mailer: Arc<dyn Mailer>, sender: String, admin_email: String) -> Self {
        Self {
            delivery: Some(Delivery {
                mailer,
                sender,
                admin_email,
            }),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.delivery.is_some()
    }

    fn deliver(delivery: &Delivery, email: &Email) -> Result<(), NotifyError> {
        delivery
            .mailer
            .send(&delivery.sender, email)
            .map_err(NotifyError::Send)?;
        tracing::info!(to = %email.to, subject = %email.subject, "email sent");
        Ok(())
    }

    pub fn send_confirmation(&self, registration: &Registration) -> Result<(), NotifyError> {
        let Some(delivery) = &self.delivery else {
            tracing::warn!(to = %registration.email, "mail not configured, skipping confirmation");
            return Ok(());
        };
        Self::deliver(delivery, &confirmation_email(registration)?)
    }

    pub fn send_contact_message(&self, message: &ContactMessage) -> Result<(), NotifyError> {
        let Some(delivery) = &self.delivery else {
            tracing::warn!(from = %message.email, "mail not configured, dropping contact message");
            return Ok(());
        };
        Self::deliver(delivery, &contact_email(&delivery.admin_email, message)?)
    }
}
