use actix_session::Session;
use actix_web::{web, HttpResponse};

use crate::auth::current_user;
use crate::core::errors::{AppError, AppResult};
use crate::templates::{self, Layout};
use crate::AppState;

pub async fn about(session: Session, state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let user = current_user(&session, &state.db).await?;
    let layout = Layout::for_request("About Me", &session, user.as_ref())?
        .heading("About Me", "This is what I do.");
    templates::render_page("about.html", &layout, &[])
}

pub async fn contact(session: Session, state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let user = current_user(&session, &state.db).await?;
    let layout = Layout::for_request("Contact Me", &session, user.as_ref())?
        .heading("Contact Me", "Have questions? I have answers.");
    templates::render_page("contact.html", &layout, &[])
}

pub async fn not_found() -> AppResult<HttpResponse> {
    Err(AppError::NotFound("Page not found".to_string()))
}
