use std::collections::BTreeMap;

use actix_session::Session;
use serde::Deserialize;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::core::csrf;
use crate::core::errors::AppResult;
use crate::templates::{escape, escape_attr};

/// Key for errors that belong to the whole form rather than one field.
pub const FORM_LEVEL: &str = "__form__";

/// Field name → messages, in the order they should be shown.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FormErrors(BTreeMap<String, Vec<String>>);

impl FormErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: &str) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.to_string());
    }

    pub fn get(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<ValidationErrors> for FormErrors {
    fn from(errors: ValidationErrors) -> Self {
        let mut form_errors = FormErrors::new();
        for (field, errs) in errors.field_errors() {
            for err in errs.iter() {
                let message = err
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| err.code.to_string());
                form_errors.add(&field.to_string(), &message);
            }
        }
        form_errors
    }
}

/// Adds a form-level error when the submitted token is not the session's.
pub fn check_csrf(session: &Session, submitted: &str, errors: &mut FormErrors) -> AppResult<()> {
    if !csrf::verify(session, submitted)? {
        errors.add(FORM_LEVEL, csrf::INVALID_TOKEN_MESSAGE);
    }
    Ok(())
}

fn check<T: Validate>(form: &T) -> FormErrors {
    match form.validate() {
        Ok(()) => FormErrors::new(),
        Err(errors) => errors.into(),
    }
}

fn trim_in_place(value: &mut String) {
    let trimmed = value.trim();
    if trimmed.len() != value.len() {
        *value = trimmed.to_string();
    }
}

/// Passwords are never trimmed, but whitespace alone does not count.
fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("required");
        err.message = Some("This field is required.".into());
        return Err(err);
    }
    Ok(())
}

fn http_url(value: &str) -> Result<(), ValidationError> {
    let lower = value.trim().to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        Ok(())
    } else {
        let mut err = ValidationError::new("http_url");
        err.message = Some("URL must start with http:// or https://".into());
        Err(err)
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct RegisterForm {
    #[validate(email(message = "Invalid email address."))]
    pub email: String,
    #[validate(custom(function = "not_blank"))]
    pub password: String,
    #[validate(length(min = 1, max = 250, message = "Name must be between 1 and 250 characters."))]
    pub name: String,
    pub csrf_token: String,
}

impl RegisterForm {
    /// Strips surrounding whitespace from everything except the password.
    pub fn normalize(&mut self) {
        trim_in_place(&mut self.email);
        trim_in_place(&mut self.name);
    }

    pub fn errors(&self) -> FormErrors {
        check(self)
    }

    pub fn fields_html(&self, errors: &FormErrors) -> String {
        [
            input("email", "email", "Email", &self.email, errors),
            input("password", "password", "Password", "", errors),
            input("text", "name", "Name", &self.name, errors),
        ]
        .concat()
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct LoginForm {
    #[validate(email(message = "Invalid email address."))]
    pub email: String,
    #[validate(custom(function = "not_blank"))]
    pub password: String,
    pub csrf_token: String,
}

impl LoginForm {
    pub fn normalize(&mut self) {
        trim_in_place(&mut self.email);
    }

    pub fn errors(&self) -> FormErrors {
        check(self)
    }

    pub fn fields_html(&self, errors: &FormErrors) -> String {
        [
            input("email", "email", "Email", &self.email, errors),
            input("password", "password", "Password", "", errors),
        ]
        .concat()
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct CreatePostForm {
    #[validate(length(min = 1, max = 250, message = "Title must be between 1 and 250 characters."))]
    pub title: String,
    #[validate(length(min = 1, max = 250, message = "Subtitle must be between 1 and 250 characters."))]
    pub subtitle: String,
    #[validate(
        url(message = "Invalid URL."),
        length(max = 250, message = "URL must be at most 250 characters."),
        custom(function = "http_url")
    )]
    pub img_url: String,
    #[validate(length(min = 1, message = "This field is required."))]
    pub body: String,
    pub csrf_token: String,
}

impl CreatePostForm {
    pub fn normalize(&mut self) {
        trim_in_place(&mut self.title);
        trim_in_place(&mut self.subtitle);
        trim_in_place(&mut self.img_url);
        trim_in_place(&mut self.body);
    }

    pub fn errors(&self) -> FormErrors {
        check(self)
    }

    pub fn fields_html(&self, errors: &FormErrors) -> String {
        [
            input("text", "title", "Blog Post Title", &self.title, errors),
            input("text", "subtitle", "Subtitle", &self.subtitle, errors),
            input("url", "img_url", "Blog Image URL", &self.img_url, errors),
            textarea("body", "Blog Content", &self.body, errors),
        ]
        .concat()
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct CommentForm {
    #[validate(length(min = 1, message = "This field is required."))]
    pub comment: String,
    pub csrf_token: String,
}

impl CommentForm {
    pub fn normalize(&mut self) {
        trim_in_place(&mut self.comment);
    }

    pub fn errors(&self) -> FormErrors {
        check(self)
    }

    pub fn fields_html(&self, errors: &FormErrors) -> String {
        textarea("comment", "Comment", &self.comment, errors)
    }
}

fn field_errors(name: &str, errors: &FormErrors) -> String {
    errors
        .get(name)
        .iter()
        .map(|m| format!(r#"<div class="invalid-feedback">{}</div>"#, escape(m)))
        .collect()
}

pub fn input(kind: &str, name: &str, label: &str, value: &str, errors: &FormErrors) -> String {
    format!(
        r#"<div class="mb-3"><label for="{name}">{label}</label><input type="{kind}" id="{name}" name="{name}" value="{value}" class="form-control">{errs}</div>"#,
        name = name,
        label = escape(label),
        kind = kind,
        value = escape_attr(value),
        errs = field_errors(name, errors),
    )
}

/// Rich-text field; the page attaches the editor to it by id.
pub fn textarea(name: &str, label: &str, value: &str, errors: &FormErrors) -> String {
    format!(
        r#"<div class="mb-3"><label for="{name}">{label}</label><textarea id="{name}" name="{name}" class="form-control rich-text">{value}</textarea>{errs}</div>"#,
        name = name,
        label = escape(label),
        value = escape(value),
        errs = field_errors(name, errors),
    )
}

/// A complete `<form>` with the CSRF field, form-level errors and submit
/// button around `fields`.
pub fn form(action: &str, csrf_token: &str, errors: &FormErrors, fields: &str, submit: &str) -> String {
    format!(
        r#"<form method="post" action="{action}" novalidate>{form_errs}<input type="hidden" name="csrf_token" value="{token}">{fields}<button type="submit" class="btn btn-primary">{submit}</button></form>"#,
        action = escape_attr(action),
        form_errs = field_errors(FORM_LEVEL, errors),
        token = escape_attr(csrf_token),
        fields = fields,
        submit = escape(submit),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post_form() -> CreatePostForm {
        CreatePostForm {
            title: "Title".into(),
            subtitle: "Sub".into(),
            img_url: "https://images.example.com/cover.jpg".into(),
            body: "<p>Body</p>".into(),
            csrf_token: String::new(),
        }
    }

    #[test]
    fn valid_post_form_has_no_errors() {
        assert!(post_form().errors().is_empty());
    }

    #[test]
    fn post_form_requires_fields() {
        let errors = CreatePostForm::default().errors();
        assert!(!errors.get("title").is_empty());
        assert!(!errors.get("subtitle").is_empty());
        assert!(!errors.get("img_url").is_empty());
        assert!(!errors.get("body").is_empty());
    }

    #[test]
    fn image_url_must_be_http() {
        let mut form = post_form();
        form.img_url = "javascript:alert(1)".into();
        let errors = form.errors();
        assert!(errors
            .get("img_url")
            .iter()
            .any(|m| m.contains("http:// or https://")));
    }

    #[test]
    fn overlong_title_is_rejected() {
        let mut form = post_form();
        form.title = "t".repeat(251);
        assert!(!form.errors().get("title").is_empty());
    }

    #[test]
    fn register_form_checks_email() {
        let form = RegisterForm {
            email: "not-an-email".into(),
            password: "pw".into(),
            name: "Ann".into(),
            csrf_token: String::new(),
        };
        let errors = form.errors();
        assert_eq!(errors.get("email"), ["Invalid email address.".to_string()]);
        assert!(errors.get("password").is_empty());
    }

    #[test]
    fn login_form_requires_password() {
        let form = LoginForm {
            email: "a@example.com".into(),
            password: String::new(),
            csrf_token: String::new(),
        };
        assert_eq!(form.errors().get("password"), ["This field is required.".to_string()]);
    }

    #[test]
    fn whitespace_only_fields_are_required() {
        let mut post = CreatePostForm {
            title: "   ".into(),
            subtitle: "  ".into(),
            img_url: "https://images.example.com/cover.jpg".into(),
            body: " \n ".into(),
            csrf_token: String::new(),
        };
        post.normalize();
        let errors = post.errors();
        assert!(!errors.get("title").is_empty());
        assert!(!errors.get("subtitle").is_empty());
        assert_eq!(errors.get("body"), ["This field is required.".to_string()]);

        let mut comment = CommentForm {
            comment: "   ".into(),
            csrf_token: String::new(),
        };
        comment.normalize();
        assert_eq!(comment.errors().get("comment"), ["This field is required.".to_string()]);

        let mut register = RegisterForm {
            email: "ann@example.com".into(),
            password: "   ".into(),
            name: "   ".into(),
            csrf_token: String::new(),
        };
        register.normalize();
        let errors = register.errors();
        assert!(!errors.get("name").is_empty());
        assert_eq!(errors.get("password"), ["This field is required.".to_string()]);
    }

    #[test]
    fn normalize_trims_email_but_not_password() {
        let mut form = LoginForm {
            email: "  ann@example.com ".into(),
            password: " pw ".into(),
            csrf_token: String::new(),
        };
        form.normalize();
        assert_eq!(form.email, "ann@example.com");
        assert_eq!(form.password, " pw ");
        assert!(form.errors().is_empty());
    }

    #[test]
    fn password_is_never_echoed() {
        let form = LoginForm {
            email: "a@example.com".into(),
            password: "topsecret".into(),
            csrf_token: String::new(),
        };
        let html = form.fields_html(&FormErrors::new());
        assert!(html.contains(r#"value="a@example.com""#));
        assert!(!html.contains("topsecret"));
    }

    #[test]
    fn inline_errors_are_escaped_next_to_their_field() {
        let mut errors = FormErrors::new();
        errors.add("title", "<bad>");
        let html = input("text", "title", "Title", r#"x" onfocus="y"#, &errors);
        assert!(html.contains("&lt;bad&gt;"));
        assert!(html.contains(r#"value="x&quot; onfocus=&quot;y""#));
    }

    #[test]
    fn form_carries_csrf_and_form_level_errors() {
        let mut errors = FormErrors::new();
        errors.add(FORM_LEVEL, "The CSRF token is missing or invalid.");
        let html = form("/login", "tok123", &errors, "", "Let Me In!");
        assert!(html.contains(r#"name="csrf_token" value="tok123""#));
        assert!(html.contains("The CSRF token is missing or invalid."));
    }
}
