use actix_session::Session;
use actix_web::{web, HttpResponse};
use sea_orm::DatabaseConnection;

use crate::core::errors::{AppError, AppResult};
use crate::core::helpers::{redirect, verify_password};
use crate::core::{csrf, flash};
use crate::forms::{self, check_csrf, FormErrors, LoginForm};
use crate::models::user;
use crate::templates::{self, Layout};
use crate::users::{find_by_email, find_by_id};
use crate::AppState;

const USER_ID_KEY: &str = "user_id";

pub const UNKNOWN_EMAIL: &str = "That email does not exist, please try again.";
pub const WRONG_PASSWORD: &str = "Password incorrect, please try again.";

/// Starts an authenticated session under a fresh session id.
pub fn login_user(session: &Session, user: &user::Model) -> AppResult<()> {
    session.renew();
    session.insert(USER_ID_KEY, user.id)?;
    Ok(())
}

pub fn logout_user(session: &Session) {
    session.purge();
}

/// The logged-in user, if any. A session pointing at a user that no longer
/// exists is treated as anonymous.
pub async fn current_user(session: &Session, db: &DatabaseConnection) -> AppResult<Option<user::Model>> {
    let user_id = match session.get::<i32>(USER_ID_KEY)? {
        Some(id) => id,
        None => return Ok(None),
    };

    let user = find_by_id(db, user_id).await?;
    if user.is_none() {
        session.remove(USER_ID_KEY);
    }
    Ok(user)
}

pub async fn require_login(session: &Session, db: &DatabaseConnection) -> AppResult<user::Model> {
    current_user(session, db).await?.ok_or(AppError::Unauthorized)
}

/// Login required, and the user must be the admin account.
pub async fn require_admin(session: &Session, db: &DatabaseConnection) -> AppResult<user::Model> {
    let user = require_login(session, db).await?;
    if !user.is_admin() {
        tracing::warn!("user {} denied admin route", user.id);
        return Err(AppError::Forbidden);
    }
    Ok(user)
}

fn render_login(
    session: &Session,
    user: Option<&user::Model>,
    form: &LoginForm,
    errors: &FormErrors,
) -> AppResult<HttpResponse> {
    let layout = Layout::for_request("Log In", session, user)?.heading("Log In", "Welcome Back!");
    let token = csrf::token(session)?;
    let html = forms::form("/login", &token, errors, &form.fields_html(errors), "Let Me In!");
    templates::render_page("login.html", &layout, &[("form", html)])
}

pub async fn login_page(session: Session, state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let user = current_user(&session, &state.db).await?;
    render_login(&session, user.as_ref(), &LoginForm::default(), &FormErrors::new())
}

pub async fn login(
    session: Session,
    state: web::Data<AppState>,
    form: web::Form<LoginForm>,
) -> AppResult<HttpResponse> {
    let mut form = form.into_inner();
    form.normalize();
    let mut errors = form.errors();
    check_csrf(&session, &form.csrf_token, &mut errors)?;

    if !errors.is_empty() {
        let user = current_user(&session, &state.db).await?;
        return render_login(&session, user.as_ref(), &form, &errors);
    }

    let email = form.email.as_str();
    let user = match find_by_email(&state.db, email).await? {
        Some(u) => u,
        None => {
            tracing::warn!("login for unknown email {}", email);
            flash::push(&session, UNKNOWN_EMAIL)?;
            return Ok(redirect("/login"));
        }
    };

    if !verify_password(&form.password, &user.password) {
        tracing::warn!("wrong password for user {}", user.id);
        flash::push(&session, WRONG_PASSWORD)?;
        return Ok(redirect("/login"));
    }

    login_user(&session, &user)?;
    tracing::info!("user {} logged in", user.id);
    Ok(redirect("/"))
}

pub async fn logout(session: Session) -> HttpResponse {
    logout_user(&session);
    redirect("/")
}
