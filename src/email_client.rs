use std::time::Duration;

use anyhow::Context;
use serde::Serialize;

use crate::domain::notify::{Email, Mailer};

pub const DEFAULT_API_URL: &str = "https://api.postmarkapp.com/email";
const TOKEN_HEADER: &str = "X-Postmark-Server-Token";

pub struct EmailClient {
    http: reqwest::blocking::Client,
    api_url: String,
    token: String,
}

#[derive(Serialize, Debug, PartialEq)]
#[serde(rename_all = "PascalCase")]
struct SendEmailRequest<'a> {
    from: String,
    to: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<&'a str>,
    subject: &'a str,
    html_body: &'a str,
}

impl<'a> SendEmailRequest<'a> {
    fn new(sender: &str, email: &'a Email) -> Self {
        Self {
            from: format!("\"{}\" <{sender}>", email.from_name),
            to: &email.to,
            reply_to: email.reply_to.as_deref(),
            subject: &email.subject,
            html_body: &email.html_body,
        }
    }
}

impl EmailClient {
    pub fn new(api_url: String, token: String, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .context("build email http client")?;
        Ok(Self {
            http,
            api_url,
            token,
        })
    }
}

impl Mailer for EmailClient {
    fn send(&self, sender: &str, email: &Email) -> anyhow::Result<()> {
        self.http
            .post(&self.api_url)
            .header(TOKEN_HEADER, &self.token)
            .json(&SendEmailRequest::new(sender, email))
            .send()
            .with_context(|| format!("send email to {}", email.to))?
            .error_for_status()
            .context("email provider rejected the request")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_uses_provider_field_names() {
        let email = Email {
            from_name: "MAIA Workshop Contact",
            to: "admin@maia.ma".to_string(),
            reply_to: Some("sam@x.com".to_string()),
            subject: "[MAIA Workshop Contact] Hi".to_string(),
            html_body: "<p>Hi</p>".to_string(),
        };
        let body = serde_json::to_value(SendEmailRequest::new("noreply@maia.ma", &email)).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "From": "\"MAIA Workshop Contact\" <noreply@maia.ma>",
                "To": "admin@maia.ma",
                "ReplyTo": "sam@x.com",
                "Subject": "[MAIA Workshop Contact] Hi",
                "HtmlBody": "<p>Hi</p>",
            })
        );
    }

    #[test]
    fn reply_to_is_omitted_when_absent() {
        let email = Email {
            from_name: "MAIA 2025 Workshops",
            to: "jane@x.com".to_string(),
            reply_to: None,
            subject: "s".to_string(),
            html_body: "b".to_string(),
        };
        let body = serde_json::to_value(SendEmailRequest::new("noreply@maia.ma", &email)).unwrap();
        assert!(body.get("ReplyTo").is_none());
    }
}
