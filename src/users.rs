use actix_session::Session;
use actix_web::{web, HttpResponse};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set};

use crate::auth::{current_user, login_user};
use crate::core::db::is_unique_violation;
use crate::core::errors::AppResult;
use crate::core::helpers::{hash_password, redirect};
use crate::core::{csrf, flash};
use crate::forms::{self, check_csrf, FormErrors, RegisterForm};
use crate::models::user;
use crate::templates::{self, Layout};
use crate::AppState;

pub const ALREADY_REGISTERED: &str = "You've already signed up with that email, log in instead.";

pub async fn find_by_email(db: &DatabaseConnection, email: &str) -> Result<Option<user::Model>, DbErr> {
    user::Entity::find()
        .filter(user::Column::Email.eq(email))
        .one(db)
        .await
}

pub async fn find_by_id(db: &DatabaseConnection, id: i32) -> Result<Option<user::Model>, DbErr> {
    user::Entity::find_by_id(id).one(db).await
}

/// Inserts a user with a freshly salted hash. `Ok(None)` means the email is
/// already taken.
pub async fn create_user(
    db: &DatabaseConnection,
    name: &str,
    email: &str,
    password: &str,
) -> AppResult<Option<user::Model>> {
    if find_by_email(db, email).await?.is_some() {
        return Ok(None);
    }

    let new_user = user::ActiveModel {
        name: Set(name.to_string()),
        email: Set(email.to_string()),
        password: Set(hash_password(password)?),
        ..Default::default()
    };

    match new_user.insert(db).await {
        Ok(user) => Ok(Some(user)),
        // lost a race with a concurrent registration
        Err(e) if is_unique_violation(&e) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn render_register(
    session: &Session,
    user: Option<&user::Model>,
    form: &RegisterForm,
    errors: &FormErrors,
) -> AppResult<HttpResponse> {
    let layout = Layout::for_request("Register", session, user)?
        .heading("Register", "Start Contributing to the Blog Now!");
    let token = csrf::token(session)?;
    let html = forms::form(
        "/register",
        &token,
        errors,
        &form.fields_html(errors),
        "Sign Me Up!",
    );
    templates::render_page("register.html", &layout, &[("form", html)])
}

pub async fn register_page(session: Session, state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let user = current_user(&session, &state.db).await?;
    render_register(&session, user.as_ref(), &RegisterForm::default(), &FormErrors::new())
}

pub async fn register(
    session: Session,
    state: web::Data<AppState>,
    form: web::Form<RegisterForm>,
) -> AppResult<HttpResponse> {
    let mut form = form.into_inner();
    form.normalize();
    let mut errors = form.errors();
    check_csrf(&session, &form.csrf_token, &mut errors)?;

    if !errors.is_empty() {
        let user = current_user(&session, &state.db).await?;
        return render_register(&session, user.as_ref(), &form, &errors);
    }

    let email = form.email.as_str();
    match create_user(&state.db, &form.name, email, &form.password).await? {
        Some(user) => {
            tracing::info!("registered user {} ({})", user.id, user.email);
            login_user(&session, &user)?;
            Ok(redirect("/"))
        }
        None => {
            tracing::info!("registration refused, {} already exists", email);
            flash::push(&session, ALREADY_REGISTERED)?;
            Ok(redirect("/login"))
        }
    }
}
