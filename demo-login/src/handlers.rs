use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Form, Router,
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use chrono::Utc;
use serde::Deserialize;

use sessionkit_axum::{CsrfToken, IntoResponseError, Session, Value, from_value};

use crate::auth::{AUTH_KEY, AuthData, CredentialChecker};

type HandlerResult = Result<Response, (StatusCode, String)>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub checker: Arc<dyn CredentialChecker>,
}

pub(crate) fn router(state: AppState) -> Router<()> {
    Router::new()
        .route("/", get(dashboard))
        .route("/login", get(login_page).post(login))
        .route("/logout", post(logout))
        .with_state(state)
}

#[derive(Deserialize)]
struct LoginForm {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn render_flash(flash: &HashMap<String, Value>) -> String {
    let mut keys: Vec<_> = flash.keys().collect();
    keys.sort();
    keys.into_iter()
        .filter_map(|kind| {
            let message: String = from_value(&flash[kind]).ok()?;
            Some(format!(
                r#"<p class="flash {}">{}</p>"#,
                escape_html(kind),
                escape_html(&message)
            ))
        })
        .collect()
}

fn page(title: &str, body: &str) -> Response {
    Html(format!(
        "<!doctype html><html><head><title>{title}</title></head><body><h1>{title}</h1>{body}</body></html>"
    ))
    .into_response()
}

async fn dashboard(session: Session, csrf: CsrfToken) -> HandlerResult {
    let flash = session.get_all_flash().await.into_response_error()?;
    let auth: Option<AuthData> = session.get(AUTH_KEY).await.into_response_error()?;

    let content = match auth {
        Some(auth) => format!(
            r#"<p>Signed in as <b>{}</b> since {}.</p>
<form method="post" action="/logout">{}<button>Sign out</button></form>"#,
            escape_html(&auth.username),
            auth.logged_in_at.format("%Y-%m-%d %H:%M:%S UTC"),
            csrf.hidden_input()
        ),
        None => r#"<p>You are browsing anonymously. <a href="/login">Sign in</a></p>"#.to_string(),
    };

    Ok(page("Dashboard", &format!("{}{}", render_flash(&flash), content)))
}

async fn login_page(session: Session, csrf: CsrfToken) -> HandlerResult {
    let flash = session.get_all_flash().await.into_response_error()?;
    let username: String = session
        .get_old_input("username")
        .await
        .into_response_error()?
        .unwrap_or_default();
    let errors = session.get_all_field_errors().await.into_response_error()?;

    let field_error = |field: &str| {
        errors
            .get(field)
            .map(|messages| {
                messages
                    .iter()
                    .map(|m| format!(r#"<span class="error">{} {}</span>"#, field, escape_html(m)))
                    .collect::<String>()
            })
            .unwrap_or_default()
    };

    let form = format!(
        r#"<form method="post" action="/login">{csrf}
<label>Username <input name="username" value="{username}"></label>{username_error}
<label>Password <input name="password" type="password"></label>{password_error}
<button>Sign in</button></form>"#,
        csrf = csrf.hidden_input(),
        username = escape_html(&username),
        username_error = field_error("username"),
        password_error = field_error("password"),
    );

    Ok(page("Sign in", &format!("{}{}", render_flash(&flash), form)))
}

async fn login(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> HandlerResult {
    let username = form.username.trim().to_string();

    if username.is_empty() {
        session
            .add_field_error("username", "is required")
            .await
            .into_response_error()?;
    }
    if form.password.is_empty() {
        session
            .add_field_error("password", "is required")
            .await
            .into_response_error()?;
    }
    if username.is_empty() || form.password.is_empty() {
        session
            .set_old_input("username", &username)
            .await
            .into_response_error()?;
        return Ok(Redirect::to("/login").into_response());
    }

    if !state.checker.verify(&username, &form.password) {
        tracing::info!("Failed sign-in attempt");
        session
            .set_flash("error", "Invalid username or password")
            .await
            .into_response_error()?;
        session
            .set_old_input("username", &username)
            .await
            .into_response_error()?;
        return Ok(Redirect::to("/login").into_response());
    }

    // New id before the session gains privileges.
    session.regenerate(true).await.into_response_error()?;
    session
        .set(
            AUTH_KEY,
            &AuthData {
                username: username.clone(),
                logged_in_at: Utc::now(),
            },
        )
        .await
        .into_response_error()?;
    session
        .set_flash("success", &format!("Welcome back, {username}!"))
        .await
        .into_response_error()?;

    tracing::info!("User signed in");
    Ok(Redirect::to("/").into_response())
}

async fn logout(session: Session) -> HandlerResult {
    session.regenerate_new().await.into_response_error()?;
    session
        .set_flash("success", "You have been signed out.")
        .await
        .into_response_error()?;
    Ok(Redirect::to("/").into_response())
}
