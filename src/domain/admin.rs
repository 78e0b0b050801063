use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "admin_session";
pub const SESSION_TTL_SECS: i64 = 12 * 60 * 60;
pub const ADMIN_AREA: &str = "/admin";
pub const LOGIN_PAGE: &str = "/admin/login";

const SUBJECT: &str = "admin";

#[derive(Clone)]
#[cfg_attr(test, derive(Debug))]
pub struct EncodedPassword(String);

impl EncodedPassword {
    fn verify(&self, entered_password: &EnteredPassword) -> Result<bool, argon2::Error> {
        argon2::verify_encoded(self.0.as_str(), entered_password.0.as_bytes())
    }
}

#[derive(PartialEq, Clone)]
#[cfg_attr(test, derive(Debug))]
pub struct EnteredPassword(String);

impl EnteredPassword {
    pub fn new(s: String) -> Self {
        Self(s)
    }
    pub fn encode(self) -> Result<EncodedPassword, argon2::Error> {
        let salt = Uuid::new_v4();
        let encoded = argon2::hash_encoded(
            self.0.as_bytes(),
            salt.as_bytes(),
            &argon2::Config::default(),
        )?;
        Ok(EncodedPassword(encoded))
    }
}

/// The configured admin login, with the password kept only in encoded form.
#[derive(Clone)]
pub struct AdminCredentials {
    username: String,
    password: EncodedPassword,
}

impl AdminCredentials {
    pub fn new(username: String, password: EnteredPassword) -> Result<Self, argon2::Error> {
        Ok(Self {
            username,
            password: password.encode()?,
        })
    }
}

#[derive(thiserror::Error, Debug)]
#[error("session secret rejected by HMAC")]
pub struct InvalidSecret;

/// Signs and verifies session tokens.
#[derive(Clone)]
pub struct SessionCodec {
    mac: Hmac<Sha256>,
}

impl SessionCodec {
    pub fn new(secret: &[u8]) -> Result<Self, InvalidSecret> {
        let mac = Hmac::<Sha256>::new_from_slice(secret).map_err(|_| InvalidSecret)?;
        Ok(Self { mac })
    }

    /// Codec with a random key; sessions do not survive a restart.
    pub fn with_random_key() -> Result<Self, InvalidSecret> {
        use rand::RngCore;
        let mut key = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut key);
        Self::new(&key)
    }

    fn tag(&self, payload: &[u8]) -> Hmac<Sha256> {
        let mut mac = self.mac.clone();
        mac.update(payload);
        mac
    }

    pub fn issue(&self, now: DateTime<Utc>) -> SessionToken {
        let payload = format!("{SUBJECT}:{}", now.timestamp() + SESSION_TTL_SECS);
        let tag = self.tag(payload.as_bytes()).finalize().into_bytes();
        SessionToken(format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(payload),
            URL_SAFE_NO_PAD.encode(tag)
        ))
    }

    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> bool {
        let Some((payload, tag)) = token.split_once('.') else {
            return false;
        };
        let (Ok(payload), Ok(tag)) = (URL_SAFE_NO_PAD.decode(payload), URL_SAFE_NO_PAD.decode(tag))
        else {
            return false;
        };
        if self.tag(&payload).verify_slice(&tag).is_err() {
            return false;
        }
        let expiry = std::str::from_utf8(&payload)
            .ok()
            .and_then(|p| p.strip_prefix(SUBJECT))
            .and_then(|p| p.strip_prefix(':'))
            .and_then(|p| p.parse::<i64>().ok());
        matches!(expiry, Some(expiry) if expiry > now.timestamp())
    }
}

#[derive(PartialEq, Eq, Clone)]
#[cfg_attr(test, derive(Debug))]
pub struct SessionToken(pub String);

#[derive(thiserror::Error, Debug)]
pub enum LoginError {
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Admin login is not configured")]
    Disabled,
    #[error("Failed to process password")]
    HashError(#[from] argon2::Error),
}

#[derive(PartialEq, Eq, Debug)]
pub enum Access {
    Granted,
    /// Location of the login page, remembering where the visitor was headed.
    Redirect(String),
}

fn is_under(path: &str, prefix: &str) -> bool {
    path.strip_prefix(prefix)
        .map_or(false, |rest| rest.is_empty() || rest.starts_with('/'))
}

pub fn login_redirect(from: &str) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("from", from)
        .finish();
    format!("{LOGIN_PAGE}?{query}")
}

#[derive(Clone)]
pub struct AdminGate {
    credentials: Option<AdminCredentials>,
    codec: SessionCodec,
    secure_cookie: bool,
}

impl AdminGate {
    /// `credentials: None` disables login altogether.
    pub fn new(
        credentials: Option<AdminCredentials>,
        codec: SessionCodec,
        secure_cookie: bool,
    ) -> Self {
        Self {
            credentials,
            codec,
            secure_cookie,
        }
    }

    pub fn login(
        &self,
        username: &str,
        password: &EnteredPassword,
        now: DateTime<Utc>,
    ) -> Result<SessionToken, LoginError> {
        let credentials = self.credentials.as_ref().ok_or(LoginError::Disabled)?;
        if username != credentials.username || !credentials.password.verify(password)? {
            tracing::warn!(username, "rejected admin login");
            return Err(LoginError::InvalidCredentials);
        }
        tracing::info!("admin logged in");
        Ok(self.codec.issue(now))
    }

    pub fn is_authenticated(&self, cookie: Option<&str>, now: DateTime<Utc>) -> bool {
        cookie.map_or(false, |token| self.codec.verify(token, now))
    }

    /// Decides whether a request for `path` may proceed. Everything outside the admin area and
    /// the login page itself is always granted.
    pub fn check(&self, path: &str, cookie: Option<&str>, now: DateTime<Utc>) -> Access {
        if !is_under(path, ADMIN_AREA) || is_under(path, LOGIN_PAGE) {
            return Access::Granted;
        }
        if self.is_authenticated(cookie, now) {
            Access::Granted
        } else {
            Access::Redirect(login_redirect(path))
        }
    }

    /// Whether the session cookie is restricted to HTTPS.
    pub fn secure_cookie(&self) -> bool {
        self.secure_cookie
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn gate() -> AdminGate {
        let credentials = AdminCredentials::new(
            "admin".to_string(),
            EnteredPassword::new("s3cret".to_string()),
        )
        .unwrap();
        AdminGate::new(Some(credentials), SessionCodec::new(b"test secret").unwrap(), false)
    }

    fn pw(s: &str) -> EnteredPassword {
        EnteredPassword::new(s.to_string())
    }

    #[test]
    fn wrong_password_or_username_is_unauthorized() {
        let gate = gate();
        let now = Utc::now();
        assert!(matches!(
            gate.login("admin", &pw("nope"), now),
            Err(LoginError::InvalidCredentials)
        ));
        assert!(matches!(
            gate.login("root", &pw("s3cret"), now),
            Err(LoginError::InvalidCredentials)
        ));
    }

    #[test]
    fn login_without_credentials_is_disabled() {
        let gate = AdminGate::new(None, SessionCodec::with_random_key().unwrap(), true);
        assert!(matches!(
            gate.login("admin", &pw("password123"), Utc::now()),
            Err(LoginError::Disabled)
        ));
    }

    #[test]
    fn admin_pages_redirect_to_login_with_origin() {
        let gate = gate();
        let now = Utc::now();
        assert_eq!(
            gate.check("/admin", None, now),
            Access::Redirect("/admin/login?from=%2Fadmin".to_string())
        );
        assert_eq!(
            gate.check("/admin/registrations", Some("garbage"), now),
            Access::Redirect("/admin/login?from=%2Fadmin%2Fregistrations".to_string())
        );
    }

    #[test]
    fn login_page_and_public_pages_pass() {
        let gate = gate();
        let now = Utc::now();
        assert_eq!(gate.check("/admin/login", None, now), Access::Granted);
        assert_eq!(gate.check("/register", None, now), Access::Granted);
        assert_eq!(gate.check("/administrivia", None, now), Access::Granted);
    }

    #[test]
    fn session_grants_access_until_expiry() {
        let gate = gate();
        let now = Utc::now();
        let token = gate.login("admin", &pw("s3cret"), now).unwrap();
        assert_eq!(gate.check("/admin", Some(&token.0), now), Access::Granted);
        let later = now + Duration::hours(11);
        assert_eq!(gate.check("/admin", Some(&token.0), later), Access::Granted);
        let expired = now + Duration::hours(12);
        assert!(matches!(
            gate.check("/admin", Some(&token.0), expired),
            Access::Redirect(_)
        ));
        // cookie removed by logout
        assert!(matches!(gate.check("/admin", None, now), Access::Redirect(_)));
    }

    #[test]
    fn tampered_or_foreign_tokens_are_rejected() {
        let gate = gate();
        let now = Utc::now();
        let token = gate.login("admin", &pw("s3cret"), now).unwrap();
        let (_, tag) = token.0.split_once('.').unwrap();
        let forged_payload = URL_SAFE_NO_PAD.encode(format!("admin:{}", i64::MAX));
        assert!(!gate.is_authenticated(Some(&format!("{forged_payload}.{tag}")), now));
        assert!(!gate.is_authenticated(Some("1"), now));

        let other = SessionCodec::new(b"another secret").unwrap().issue(now);
        assert!(!gate.is_authenticated(Some(&other.0), now));
    }

}
