use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder, Set,
};

use crate::core::helpers::{gravatar_url, sanitize_html};
use crate::models::{comment, user};
use crate::templates::{escape, escape_attr};

pub type CommentWithAuthor = (comment::Model, Option<user::Model>);

pub async fn add_comment(
    db: &DatabaseConnection,
    post_id: i32,
    author_id: i32,
    text: &str,
) -> Result<comment::Model, DbErr> {
    comment::ActiveModel {
        post_id: Set(post_id),
        author_id: Set(author_id),
        text: Set(sanitize_html(text)),
        ..Default::default()
    }
    .insert(db)
    .await
}

/// Oldest first, each with its author.
pub async fn comments_for_post(db: &DatabaseConnection, post_id: i32) -> Result<Vec<CommentWithAuthor>, DbErr> {
    comment::Entity::find()
        .filter(comment::Column::PostId.eq(post_id))
        .order_by_asc(comment::Column::Id)
        .find_also_related(user::Entity)
        .all(db)
        .await
}

pub fn comments_html(comments: &[CommentWithAuthor]) -> String {
    let items: String = comments
        .iter()
        .map(|(c, author)| {
            let (name, avatar) = match author {
                Some(a) => (escape(&a.name), gravatar_url(&a.email)),
                None => ("[deleted]".to_string(), gravatar_url("")),
            };
            format!(
                r#"<li><div class="commenterImage"><img src="{}" alt=""></div><div class="commentText">{}<span class="sub-text">{}</span></div></li>"#,
                escape_attr(&avatar),
                c.text,
                name
            )
        })
        .collect();

    format!(r#"<ul class="commentList">{}</ul>"#, items)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn author(name: &str) -> user::Model {
        user::Model {
            id: 2,
            name: name.to_string(),
            email: "reader@example.com".to_string(),
            password: String::new(),
        }
    }

    fn comment(text: &str) -> comment::Model {
        comment::Model {
            id: 1,
            author_id: 2,
            post_id: 1,
            text: text.to_string(),
        }
    }

    #[test]
    fn renders_author_avatar_and_stored_html() {
        let html = comments_html(&[(comment("<p>Nice post</p>"), Some(author("Reader <3")))]);
        assert!(html.contains("<p>Nice post</p>"));
        assert!(html.contains("Reader &lt;3"));
        assert!(html.contains(&escape_attr(&gravatar_url("reader@example.com"))));
    }

    #[test]
    fn empty_list() {
        assert_eq!(comments_html(&[]), r#"<ul class="commentList"></ul>"#);
    }
}
