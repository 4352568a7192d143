pub mod auth;
pub mod comments;
pub mod config;
pub mod core;
pub mod forms;
pub mod handlers;
pub mod models;
pub mod posts;
pub mod static_server;
pub mod templates;
pub mod users;

use std::net::TcpListener;

use actix_session::{storage::CookieSessionStore, SessionMiddleware};
use actix_web::{dev::Server, middleware::Logger, web, App, HttpServer};
use sea_orm::DatabaseConnection;

use crate::config::Config;

/// Shared by every worker through `web::Data`.
pub struct AppState {
    pub db: DatabaseConnection,
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(posts::get_all_posts))
        .service(
            web::resource("/register")
                .route(web::get().to(users::register_page))
                .route(web::post().to(users::register)),
        )
        .service(
            web::resource("/login")
                .route(web::get().to(auth::login_page))
                .route(web::post().to(auth::login)),
        )
        .route("/logout", web::get().to(auth::logout))
        .service(
            web::resource("/post/{post_id}")
                .route(web::get().to(posts::show_post))
                .route(web::post().to(posts::comment_on_post)),
        )
        .service(
            web::resource("/new-post")
                .route(web::get().to(posts::new_post_page))
                .route(web::post().to(posts::add_new_post)),
        )
        .service(
            web::resource("/edit-post/{post_id}")
                .route(web::get().to(posts::edit_post_page))
                .route(web::post().to(posts::edit_post)),
        )
        .route("/delete/{post_id}", web::get().to(posts::delete_post))
        .route("/about", web::get().to(handlers::about))
        .route("/contact", web::get().to(handlers::contact))
        .route("/static/{path:.*}", web::get().to(static_server::serve_static));
}

/// Connects the database, creates missing tables and returns the running
/// server on `listener`. The caller decides where to drive it.
pub async fn start(config: &Config, listener: TcpListener) -> anyhow::Result<Server> {
    let db = crate::core::db::connect(&config.database_url).await?;
    crate::core::db::init_schema(&db).await?;

    let state = web::Data::new(AppState { db });
    let key = config.session_key();
    let cookie_secure = config.cookie_secure;

    tracing::info!("listening on http://{}", listener.local_addr()?);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(
                SessionMiddleware::builder(CookieSessionStore::default(), key.clone())
                    .cookie_secure(cookie_secure)
                    .build(),
            )
            .wrap(Logger::default())
            .app_data(state.clone())
            .configure(routes)
            .default_service(web::route().to(handlers::not_found))
    })
    .listen(listener)?
    .run();

    Ok(server)
}
