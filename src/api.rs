use std::sync::Arc;

use anyhow::anyhow;
use async_std::task;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tide::{
    http::{
        cookies::{Cookie, SameSite},
        headers, mime,
    },
    Middleware, Next, Redirect, Request, Response, StatusCode,
};

use crate::{
    config::Config,
    domain::{
        self,
        admin::{
            Access, AdminCredentials, AdminGate, EnteredPassword, LoginError, SessionCodec,
            SESSION_COOKIE, SESSION_TTL_SECS,
        },
        db::Db,
        notify::{ContactForm, Notifier},
        DeleteError, RegisterError, RegistrationForm, RegistrationId,
    },
    email_client::EmailClient,
    in_memory_db, sled_db,
};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn Db>,
    pub gate: Arc<AdminGate>,
    pub notifier: Notifier,
}

impl AppState {
    pub fn new(db: Arc<dyn Db>, gate: AdminGate, notifier: Notifier) -> Self {
        Self {
            db,
            gate: Arc::new(gate),
            notifier,
        }
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let db: Arc<dyn Db> = match &config.database_path {
            Some(path) => Arc::new(sled_db::open(path)?),
            None => {
                tracing::warn!("DATABASE_PATH not set, registrations are kept in memory only");
                Arc::new(in_memory_db::init_db())
            }
        };

        let credentials = config
            .admin
            .clone()
            .map(|(username, password)| {
                AdminCredentials::new(username, EnteredPassword::new(password))
            })
            .transpose()
            .map_err(|e| anyhow!("encode admin password: {e}"))?;
        let codec = match &config.session_secret {
            Some(secret) => SessionCodec::new(secret.as_bytes())?,
            None => {
                tracing::warn!("SESSION_SECRET not set, admin sessions end on restart");
                SessionCodec::with_random_key()?
            }
        };
        let gate = AdminGate::new(credentials, codec, config.production);

        let notifier = match &config.mail {
            Some(mail) => {
                let client =
                    EmailClient::new(mail.api_url.clone(), mail.api_token.clone(), mail.timeout)?;
                Notifier::new(
                    Arc::new(client),
                    mail.sender.clone(),
                    mail.admin_email.clone(),
                )
            }
            None => {
                tracing::warn!("email provider not configured, notifications are disabled");
                Notifier::disabled()
            }
        };

        Ok(Self::new(db, gate, notifier))
    }
}

pub fn app(state: AppState) -> tide::Server<AppState> {
    let mut app = tide::with_state(state);
    app.with(AdminArea);
    app.at("/health").get(|_| async { Ok(StatusCode::Ok) });
    app.at("/api/register").post(register);
    app.at("/api/contact").post(contact);
    app.at("/api/registrations").get(registrations);
    app.at("/api/registrations/export").get(export);
    app.at("/api/registrations/delete").delete(delete);
    app.at("/api/admin/login").post(login);
    app.at("/api/admin/logout").post(logout);
    app.at("/admin").get(dashboard);
    app.at("/admin/login").get(login_page);
    app
}

fn json(status: StatusCode, body: serde_json::Value) -> Response {
    Response::builder(status).body(body).build()
}

fn error(status: StatusCode, message: impl std::fmt::Display) -> tide::Result {
    Ok(json(status, json!({ "error": message.to_string() })))
}

fn no_store(mut res: Response) -> Response {
    res.insert_header(
        headers::CACHE_CONTROL,
        "no-store, no-cache, must-revalidate, proxy-revalidate, max-age=0",
    );
    res.insert_header("Pragma", "no-cache");
    res.insert_header("Expires", "0");
    res.insert_header("X-Content-Type-Options", "nosniff");
    res
}

fn session_cookie(req: &Request<AppState>) -> Option<String> {
    req.cookie(SESSION_COOKIE).map(|c| c.value().to_string())
}

fn admin_cookie(value: String, max_age_secs: i64, secure: bool) -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE, value)
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(time::Duration::seconds(max_age_secs))
        .finish()
}

fn is_admin(req: &Request<AppState>) -> bool {
    req.state()
        .gate
        .is_authenticated(session_cookie(req).as_deref(), Utc::now())
}

/// Redirects anonymous visitors of the admin pages to the login page.
struct AdminArea;

#[tide::utils::async_trait]
impl Middleware<AppState> for AdminArea {
    async fn handle(&self, req: Request<AppState>, next: Next<'_, AppState>) -> tide::Result {
        let access = req
            .state()
            .gate
            .check(req.url().path(), session_cookie(&req).as_deref(), Utc::now());
        match access {
            Access::Granted => Ok(next.run(req).await),
            Access::Redirect(location) => {
                tracing::debug!(path = req.url().path(), "anonymous admin request redirected");
                Ok(Redirect::new(location).into())
            }
        }
    }
}

pub async fn register(mut req: Request<AppState>) -> tide::Result {
    let form: RegistrationForm = match req.body_json().await {
        Ok(form) => form,
        Err(_) => return error(StatusCode::BadRequest, "Invalid request body"),
    };

    let registration = match domain::register(req.state().db.as_ref(), form) {
        Ok(registration) => registration,
        Err(RegisterError::Invalid(e)) => return error(StatusCode::BadRequest, e),
        Err(RegisterError::DbError(e)) => {
            tracing::error!(error = %e, "registration failed");
            return error(StatusCode::InternalServerError, "Failed to process registration");
        }
    };

    let notifier = req.state().notifier.clone();
    let saved = registration.clone();
    if let Err(e) = task::spawn_blocking(move || notifier.send_confirmation(&saved)).await {
        tracing::error!(
            error = %e,
            id = %registration.id.0,
            "confirmation email failed, registration was saved"
        );
    }

    Ok(json(
        StatusCode::Created,
        json!({
            "success": true,
            "confirmationNumber": registration.confirmation_number,
            "registration": registration,
        }),
    ))
}

pub async fn contact(mut req: Request<AppState>) -> tide::Result {
    let form: ContactForm = match req.body_json().await {
        Ok(form) => form,
        Err(_) => return error(StatusCode::BadRequest, "Invalid request body"),
    };
    let message = match form.validate() {
        Ok(message) => message,
        Err(e) => return error(StatusCode::BadRequest, e),
    };

    let notifier = req.state().notifier.clone();
    match task::spawn_blocking(move || notifier.send_contact_message(&message)).await {
        Ok(()) => Ok(json(
            StatusCode::Ok,
            json!({ "success": true, "message": "Your message has been sent successfully!" }),
        )),
        Err(e) => {
            tracing::error!(error = %e, "contact form delivery failed");
            error(
                StatusCode::InternalServerError,
                "Failed to send message. Please try again or contact us directly.",
            )
        }
    }
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct Search {
    q: Option<String>,
}

pub async fn registrations(req: Request<AppState>) -> tide::Result {
    if !is_admin(&req) {
        return error(StatusCode::Unauthorized, "Unauthorized");
    }
    let search: Search = req.query()?;
    match domain::list_registrations(req.state().db.as_ref(), search.q.as_deref()) {
        Ok(registrations) => Ok(no_store(json(
            StatusCode::Ok,
            json!({ "registrations": registrations }),
        ))),
        Err(e) => {
            tracing::error!(error = %e, "listing registrations failed");
            let res = error(StatusCode::InternalServerError, "Failed to fetch registrations")?;
            Ok(no_store(res))
        }
    }
}

pub async fn export(req: Request<AppState>) -> tide::Result {
    if !is_admin(&req) {
        return error(StatusCode::Unauthorized, "Unauthorized");
    }
    let search: Search = req.query()?;
    let listed = domain::list_registrations(req.state().db.as_ref(), search.q.as_deref());
    let registrations = match listed {
        Ok(registrations) => registrations,
        Err(e) => {
            tracing::error!(error = %e, "exporting registrations failed");
            return error(StatusCode::InternalServerError, "Failed to export registrations");
        }
    };
    let file_name = domain::export::file_name(Utc::now());
    Ok(no_store(
        Response::builder(StatusCode::Ok)
            .header(headers::CONTENT_TYPE, "text/csv; charset=utf-8")
            .header(
                "content-disposition",
                format!("attachment; filename=\"{file_name}\""),
            )
            .body(domain::export::to_csv(&registrations))
            .build(),
    ))
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct DeleteQuery {
    id: Option<String>,
}

pub async fn delete(req: Request<AppState>) -> tide::Result {
    if !is_admin(&req) {
        return error(StatusCode::Unauthorized, "Unauthorized");
    }
    let query: DeleteQuery = req.query()?;
    let db = req.state().db.as_ref();
    match query.id.as_deref().filter(|id| !id.is_empty()) {
        None => error(StatusCode::BadRequest, "Registration ID is required"),
        Some("all") => match domain::delete_all_registrations(db) {
            Ok(deleted) => Ok(json(
                StatusCode::Ok,
                json!({
                    "success": true,
                    "message": format!("Deleted {deleted} registration(s)"),
                    "deletedCount": deleted,
                }),
            )),
            Err(e) => {
                tracing::error!(error = %e, "deleting all registrations failed");
                error(StatusCode::InternalServerError, "Failed to delete registration")
            }
        },
        Some(id) => match domain::delete_registration(db, &RegistrationId(id.to_string())) {
            Ok(()) => Ok(json(
                StatusCode::Ok,
                json!({ "success": true, "message": "Registration deleted successfully" }),
            )),
            Err(e @ DeleteError::NotFound) => error(StatusCode::NotFound, e),
            Err(DeleteError::DbError(e)) => {
                tracing::error!(error = %e, id, "deleting registration failed");
                error(StatusCode::InternalServerError, "Failed to delete registration")
            }
        },
    }
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct LoginForm {
    username: String,
    password: String,
}

pub async fn login(mut req: Request<AppState>) -> tide::Result {
    let form: LoginForm = match req.body_json().await {
        Ok(form) => form,
        Err(_) => return error(StatusCode::BadRequest, "Invalid request body"),
    };
    let gate = req.state().gate.clone();
    let password = EnteredPassword::new(form.password);
    let username = form.username;
    let attempt = {
        let gate = gate.clone();
        task::spawn_blocking(move || gate.login(&username, &password, Utc::now())).await
    };
    match attempt {
        Ok(token) => {
            let mut res = json(StatusCode::Ok, json!({ "success": true }));
            res.insert_cookie(admin_cookie(token.0, SESSION_TTL_SECS, gate.secure_cookie()));
            Ok(res)
        }
        Err(LoginError::InvalidCredentials | LoginError::Disabled) => {
            error(StatusCode::Unauthorized, "Invalid credentials")
        }
        Err(e @ LoginError::HashError(_)) => {
            tracing::error!(error = %e, "admin login failed");
            error(StatusCode::InternalServerError, "Login failed")
        }
    }
}

pub async fn logout(req: Request<AppState>) -> tide::Result {
    let mut res = json(StatusCode::Ok, json!({ "success": true }));
    res.insert_cookie(admin_cookie(String::new(), 0, req.state().gate.secure_cookie()));
    Ok(res)
}

pub async fn dashboard(req: Request<AppState>) -> tide::Result {
    match domain::dashboard_stats(req.state().db.as_ref()) {
        Ok(stats) => Ok(no_store(json(StatusCode::Ok, json!(stats)))),
        Err(e) => {
            tracing::error!(error = %e, "loading dashboard failed");
            error(StatusCode::InternalServerError, "Failed to fetch registrations")
        }
    }
}

pub async fn login_page(_req: Request<AppState>) -> tide::Result {
    Ok(Response::builder(StatusCode::Ok)
        .content_type(mime::HTML)
        .body("<!DOCTYPE html><html><body><h1>Admin login</h1></body></html>")
        .build())
}
