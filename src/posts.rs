use actix_session::Session;
use actix_web::{web, HttpResponse};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};

use crate::auth::{current_user, require_admin};
use crate::comments::{add_comment, comments_for_post, comments_html};
use crate::core::db::is_unique_violation;
use crate::core::errors::{AppError, AppResult};
use crate::core::helpers::{redirect, sanitize_html, today};
use crate::core::{csrf, flash};
use crate::forms::{self, check_csrf, CommentForm, CreatePostForm, FormErrors};
use crate::models::{comment, post, user};
use crate::templates::{self, escape, Layout};
use crate::AppState;

pub type PostWithAuthor = (post::Model, Option<user::Model>);

pub const LOGIN_TO_COMMENT: &str = "You need to be logged in to comment";
const TITLE_TAKEN: &str = "A post with that title already exists.";

// === Store ===

pub async fn all_posts(db: &DatabaseConnection) -> Result<Vec<PostWithAuthor>, DbErr> {
    post::Entity::find()
        .order_by_asc(post::Column::Id)
        .find_also_related(user::Entity)
        .all(db)
        .await
}

pub async fn find_post(db: &DatabaseConnection, id: i32) -> Result<Option<PostWithAuthor>, DbErr> {
    post::Entity::find_by_id(id)
        .find_also_related(user::Entity)
        .one(db)
        .await
}

/// Whether `title` belongs to a post other than `except`.
pub async fn title_taken(db: &DatabaseConnection, title: &str, except: Option<i32>) -> Result<bool, DbErr> {
    let mut query = post::Entity::find().filter(post::Column::Title.eq(title));
    if let Some(id) = except {
        query = query.filter(post::Column::Id.ne(id));
    }
    Ok(query.one(db).await?.is_some())
}

pub async fn create_post(
    db: &DatabaseConnection,
    form: &CreatePostForm,
    author: &user::Model,
) -> Result<post::Model, DbErr> {
    post::ActiveModel {
        title: Set(form.title.clone()),
        subtitle: Set(form.subtitle.clone()),
        body: Set(sanitize_html(&form.body)),
        img_url: Set(form.img_url.clone()),
        author_id: Set(author.id),
        date: Set(today()),
        ..Default::default()
    }
    .insert(db)
    .await
}

/// Rewrites the editable fields and hands authorship to `editor`. The
/// publication date is left alone.
pub async fn update_post(
    db: &DatabaseConnection,
    existing: post::Model,
    form: &CreatePostForm,
    editor: &user::Model,
) -> Result<post::Model, DbErr> {
    let mut active: post::ActiveModel = existing.into();
    active.title = Set(form.title.clone());
    active.subtitle = Set(form.subtitle.clone());
    active.body = Set(sanitize_html(&form.body));
    active.img_url = Set(form.img_url.clone());
    active.author_id = Set(editor.id);
    active.update(db).await
}

pub async fn delete_post_with_comments(db: &DatabaseConnection, id: i32) -> Result<(), DbErr> {
    let txn = db.begin().await?;
    comment::Entity::delete_many()
        .filter(comment::Column::PostId.eq(id))
        .exec(&txn)
        .await?;
    post::Entity::delete_by_id(id).exec(&txn).await?;
    txn.commit().await
}

// === Rendering ===

fn author_name(author: &Option<user::Model>) -> &str {
    author.as_ref().map(|a| a.name.as_str()).unwrap_or("[deleted]")
}

fn post_previews(posts: &[PostWithAuthor], admin: bool) -> String {
    posts
        .iter()
        .map(|(p, author)| {
            let delete = if admin {
                format!(r#" <a class="delete" href="/delete/{}">✘</a>"#, p.id)
            } else {
                String::new()
            };
            format!(
                r#"<div class="post-preview"><a href="/post/{id}"><h2 class="post-title">{title}</h2><h3 class="post-subtitle">{subtitle}</h3></a><p class="post-meta">Posted by {author} on {date}{delete}</p></div><hr class="my-4">"#,
                id = p.id,
                title = escape(&p.title),
                subtitle = escape(&p.subtitle),
                author = escape(author_name(author)),
                date = escape(&p.date),
                delete = delete,
            )
        })
        .collect()
}

fn render_post(
    session: &Session,
    db_user: Option<&user::Model>,
    (post, author): &PostWithAuthor,
    comments: &[crate::comments::CommentWithAuthor],
    form: &CommentForm,
    errors: &FormErrors,
) -> AppResult<HttpResponse> {
    let meta = format!("Posted by {} on {}", author_name(author), post.date);
    let layout = Layout::for_request(&post.title, session, db_user)?
        .heading(&post.title, &post.subtitle)
        .meta(&meta)
        .header_image(&post.img_url);

    let edit = if db_user.map(|u| u.is_admin()).unwrap_or(false) {
        format!(
            r#"<div class="d-flex justify-content-end mb-4"><a class="btn btn-primary" href="/edit-post/{}">Edit Post</a></div>"#,
            post.id
        )
    } else {
        String::new()
    };

    let token = csrf::token(session)?;
    let action = format!("/post/{}", post.id);
    let comment_form = forms::form(&action, &token, errors, &form.fields_html(errors), "Submit Comment");

    templates::render_page(
        "post.html",
        &layout,
        &[
            ("body", post.body.clone()),
            ("edit", edit),
            ("comment_form", comment_form),
            ("comments", comments_html(comments)),
        ],
    )
}

fn render_editor(
    session: &Session,
    admin: &user::Model,
    action: &str,
    is_edit: bool,
    form: &CreatePostForm,
    errors: &FormErrors,
) -> AppResult<HttpResponse> {
    let heading = if is_edit { "Edit Post" } else { "New Post" };
    let layout = Layout::for_request(heading, session, Some(admin))?
        .heading(heading, "You're going to make a great blog post!");
    let token = csrf::token(session)?;
    let html = forms::form(action, &token, errors, &form.fields_html(errors), "Submit Post");
    templates::render_page("make-post.html", &layout, &[("form", html)])
}

// === Handlers ===

pub async fn get_all_posts(session: Session, state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let user = current_user(&session, &state.db).await?;
    let admin = user.as_ref().map(|u| u.is_admin()).unwrap_or(false);
    let posts = all_posts(&state.db).await?;

    let create = if admin {
        r#"<div class="d-flex justify-content-end mb-4"><a class="btn btn-primary" href="/new-post">Create New Post</a></div>"#.to_string()
    } else {
        String::new()
    };

    let layout = Layout::for_request("Blog", &session, user.as_ref())?
        .heading("Blog", "A collection of random musings.");
    templates::render_page(
        "index.html",
        &layout,
        &[("posts", post_previews(&posts, admin)), ("create", create)],
    )
}

pub async fn show_post(
    session: Session,
    state: web::Data<AppState>,
    path: web::Path<i32>,
) -> AppResult<HttpResponse> {
    let post_id = path.into_inner();
    let user = current_user(&session, &state.db).await?;
    let found = find_post(&state.db, post_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Post not found".to_string()))?;
    let comments = comments_for_post(&state.db, post_id).await?;

    render_post(&session, user.as_ref(), &found, &comments, &CommentForm::default(), &FormErrors::new())
}

pub async fn comment_on_post(
    session: Session,
    state: web::Data<AppState>,
    path: web::Path<i32>,
    form: web::Form<CommentForm>,
) -> AppResult<HttpResponse> {
    let post_id = path.into_inner();
    let user = current_user(&session, &state.db).await?;
    let found = find_post(&state.db, post_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Post not found".to_string()))?;

    let mut form = form.into_inner();
    form.normalize();
    let mut errors = form.errors();
    check_csrf(&session, &form.csrf_token, &mut errors)?;

    if !errors.is_empty() {
        let comments = comments_for_post(&state.db, post_id).await?;
        return render_post(&session, user.as_ref(), &found, &comments, &form, &errors);
    }

    let Some(author) = user else {
        flash::push(&session, LOGIN_TO_COMMENT)?;
        return Ok(redirect("/login"));
    };

    let saved = add_comment(&state.db, post_id, author.id, &form.comment).await?;
    tracing::info!("user {} commented on post {} (comment {})", author.id, post_id, saved.id);
    Ok(redirect(&format!("/post/{}", post_id)))
}

pub async fn new_post_page(session: Session, state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let admin = require_admin(&session, &state.db).await?;
    render_editor(&session, &admin, "/new-post", false, &CreatePostForm::default(), &FormErrors::new())
}

pub async fn add_new_post(
    session: Session,
    state: web::Data<AppState>,
    form: web::Form<CreatePostForm>,
) -> AppResult<HttpResponse> {
    let admin = require_admin(&session, &state.db).await?;

    let mut form = form.into_inner();
    form.normalize();
    let mut errors = form.errors();
    check_csrf(&session, &form.csrf_token, &mut errors)?;
    if errors.is_empty() && title_taken(&state.db, &form.title, None).await? {
        errors.add("title", TITLE_TAKEN);
    }
    if !errors.is_empty() {
        return render_editor(&session, &admin, "/new-post", false, &form, &errors);
    }

    match create_post(&state.db, &form, &admin).await {
        Ok(created) => {
            tracing::info!("post {} created by {}", created.id, admin.id);
            Ok(redirect("/"))
        }
        Err(e) if is_unique_violation(&e) => {
            errors.add("title", TITLE_TAKEN);
            render_editor(&session, &admin, "/new-post", false, &form, &errors)
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn edit_post_page(
    session: Session,
    state: web::Data<AppState>,
    path: web::Path<i32>,
) -> AppResult<HttpResponse> {
    let admin = require_admin(&session, &state.db).await?;
    let post_id = path.into_inner();
    let (existing, _) = find_post(&state.db, post_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Post not found".to_string()))?;

    let form = CreatePostForm {
        title: existing.title,
        subtitle: existing.subtitle,
        img_url: existing.img_url,
        body: existing.body,
        csrf_token: String::new(),
    };
    let action = format!("/edit-post/{}", post_id);
    render_editor(&session, &admin, &action, true, &form, &FormErrors::new())
}

pub async fn edit_post(
    session: Session,
    state: web::Data<AppState>,
    path: web::Path<i32>,
    form: web::Form<CreatePostForm>,
) -> AppResult<HttpResponse> {
    let admin = require_admin(&session, &state.db).await?;
    let post_id = path.into_inner();
    let (existing, _) = find_post(&state.db, post_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Post not found".to_string()))?;

    let action = format!("/edit-post/{}", post_id);
    let mut form = form.into_inner();
    form.normalize();
    let mut errors = form.errors();
    check_csrf(&session, &form.csrf_token, &mut errors)?;
    if errors.is_empty() && title_taken(&state.db, &form.title, Some(post_id)).await? {
        errors.add("title", TITLE_TAKEN);
    }
    if !errors.is_empty() {
        return render_editor(&session, &admin, &action, true, &form, &errors);
    }

    match update_post(&state.db, existing, &form, &admin).await {
        Ok(updated) => {
            tracing::info!("post {} edited by {}", updated.id, admin.id);
            Ok(redirect(&format!("/post/{}", updated.id)))
        }
        Err(e) if is_unique_violation(&e) => {
            errors.add("title", TITLE_TAKEN);
            render_editor(&session, &admin, &action, true, &form, &errors)
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn delete_post(
    session: Session,
    state: web::Data<AppState>,
    path: web::Path<i32>,
) -> AppResult<HttpResponse> {
    let admin = require_admin(&session, &state.db).await?;
    let post_id = path.into_inner();
    if find_post(&state.db, post_id).await?.is_none() {
        return Err(AppError::NotFound("Post not found".to_string()));
    }

    delete_post_with_comments(&state.db, post_id).await?;
    tracing::info!("post {} deleted by {}", post_id, admin.id);
    Ok(redirect("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::memory_db;
    use sea_orm::PaginatorTrait;

    fn sample(id: i32, title: &str) -> PostWithAuthor {
        (
            post::Model {
                id,
                title: title.to_string(),
                subtitle: "Sub".to_string(),
                date: "January 02, 2026".to_string(),
                body: "<p>b</p>".to_string(),
                img_url: "https://example.com/c.jpg".to_string(),
                author_id: 1,
            },
            Some(user::Model {
                id: 1,
                name: "Admin".to_string(),
                email: "admin@example.com".to_string(),
                password: String::new(),
            }),
        )
    }

    #[test]
    fn previews_escape_titles_and_link_posts() {
        let html = post_previews(&[sample(7, "<i>Hello</i>")], false);
        assert!(html.contains(r#"href="/post/7""#));
        assert!(html.contains("&lt;i&gt;Hello&lt;/i&gt;"));
        assert!(html.contains("Posted by Admin on January 02, 2026"));
        assert!(!html.contains("/delete/7"));
    }

    #[test]
    fn admin_previews_carry_delete_links() {
        let html = post_previews(&[sample(3, "A"), sample(4, "B")], true);
        assert!(html.contains(r#"href="/delete/3""#));
        assert!(html.contains(r#"href="/delete/4""#));
    }

    fn editor_form(title: &str) -> CreatePostForm {
        CreatePostForm {
            title: title.to_string(),
            subtitle: "Sub".to_string(),
            img_url: "https://example.com/c.jpg".to_string(),
            body: "<p>b</p>".to_string(),
            csrf_token: String::new(),
        }
    }

    async fn admin(db: &DatabaseConnection) -> user::Model {
        user::ActiveModel {
            name: Set("Admin".to_string()),
            email: Set("admin@example.com".to_string()),
            password: Set("x".to_string()),
            ..Default::default()
        }
        .insert(db)
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn deleting_a_post_removes_only_its_comments() {
        let db = memory_db().await;
        let author = admin(&db).await;
        let doomed = create_post(&db, &editor_form("Doomed"), &author).await.unwrap();
        let kept = create_post(&db, &editor_form("Kept"), &author).await.unwrap();
        add_comment(&db, doomed.id, author.id, "<p>one</p>").await.unwrap();
        add_comment(&db, doomed.id, author.id, "<p>two</p>").await.unwrap();
        add_comment(&db, kept.id, author.id, "<p>stays</p>").await.unwrap();

        delete_post_with_comments(&db, doomed.id).await.unwrap();

        assert!(find_post(&db, doomed.id).await.unwrap().is_none());
        let orphans = comment::Entity::find()
            .filter(comment::Column::PostId.eq(doomed.id))
            .count(&db)
            .await
            .unwrap();
        assert_eq!(orphans, 0);
        assert_eq!(comment::Entity::find().count(&db).await.unwrap(), 1);
        assert_eq!(comments_for_post(&db, kept.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn title_taken_ignores_the_post_being_edited() {
        let db = memory_db().await;
        let author = admin(&db).await;
        let first = create_post(&db, &editor_form("First"), &author).await.unwrap();
        let second = create_post(&db, &editor_form("Second"), &author).await.unwrap();

        assert!(!title_taken(&db, "First", Some(first.id)).await.unwrap());
        assert!(title_taken(&db, "First", Some(second.id)).await.unwrap());
        assert!(title_taken(&db, "First", None).await.unwrap());
        assert!(!title_taken(&db, "Third", None).await.unwrap());
    }
}
