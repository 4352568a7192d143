use std::collections::HashMap;
use std::sync::OnceLock;

use actix_session::Session;
use actix_web::{http::StatusCode, HttpResponse};
use regex::{Captures, Regex};
use rust_embed::RustEmbed;

use crate::core::errors::AppResult;
use crate::core::flash;
use crate::models::user;

#[derive(RustEmbed)]
#[folder = "templates"]
struct Templates;

fn placeholder() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| Regex::new(r"\{\{\s*([a-z_]+)\s*\}\}").expect("placeholder pattern"))
}

pub fn load(name: &str) -> anyhow::Result<String> {
    let file = Templates::get(name)
        .ok_or_else(|| anyhow::anyhow!("Template {} not found", name))?;
    Ok(String::from_utf8(file.data.into_owned())?)
}

/// Substitutes `{{ name }}` placeholders in one pass. Values are inserted
/// verbatim and never rescanned, so user content that happens to look like a
/// placeholder stays as written. Unknown names become empty.
pub fn fill(template: &str, vars: &HashMap<&str, String>) -> String {
    placeholder()
        .replace_all(template, |caps: &Captures| {
            vars.get(&caps[1]).cloned().unwrap_or_default()
        })
        .into_owned()
}

pub fn escape(text: &str) -> String {
    html_escape::encode_text(text).to_string()
}

pub fn escape_attr(text: &str) -> String {
    html_escape::encode_double_quoted_attribute(text).to_string()
}

/// Everything the base layout needs besides the page body.
#[derive(Debug, Default)]
pub struct Layout {
    title: String,
    heading: String,
    subheading: String,
    meta: String,
    header_image: Option<String>,
    logged_in: bool,
    account_links: bool,
    flashes: Vec<String>,
}

impl Layout {
    pub fn new(title: &str) -> Self {
        Layout {
            title: title.to_string(),
            heading: title.to_string(),
            account_links: true,
            ..Default::default()
        }
    }

    /// Layout for a request: nav state from the user, pending flash messages
    /// drained from the session.
    pub fn for_request(title: &str, session: &Session, user: Option<&user::Model>) -> AppResult<Self> {
        let mut layout = Layout::new(title);
        layout.logged_in = user.is_some();
        layout.flashes = flash::take(session)?;
        Ok(layout)
    }

    pub fn heading(mut self, heading: &str, subheading: &str) -> Self {
        self.heading = heading.to_string();
        self.subheading = subheading.to_string();
        self
    }

    /// Byline shown under the heading, e.g. on a post page.
    pub fn meta(mut self, meta: &str) -> Self {
        self.meta = meta.to_string();
        self
    }

    pub fn header_image(mut self, url: &str) -> Self {
        if !url.is_empty() {
            self.header_image = Some(url.to_string());
        }
        self
    }

    /// Drops the login/logout links, for pages rendered without knowing who
    /// is signed in.
    pub fn without_account_links(mut self) -> Self {
        self.account_links = false;
        self
    }

    fn nav(&self) -> String {
        if !self.account_links {
            String::new()
        } else if self.logged_in {
            r#"<li class="nav-item"><a class="nav-link" href="/logout">Log Out</a></li>"#.to_string()
        } else {
            concat!(
                r#"<li class="nav-item"><a class="nav-link" href="/login">Login</a></li>"#,
                r#"<li class="nav-item"><a class="nav-link" href="/register">Register</a></li>"#
            )
            .to_string()
        }
    }

    fn flash_html(&self) -> String {
        self.flashes
            .iter()
            .map(|m| format!(r#"<div class="flash">{}</div>"#, escape(m)))
            .collect()
    }

    fn header_style(&self) -> String {
        match &self.header_image {
            // keep the URL from closing the CSS url('...') it sits in
            Some(url) => {
                let css_safe = url
                    .replace('\\', "%5C")
                    .replace('\'', "%27")
                    .replace('"', "%22")
                    .replace('(', "%28")
                    .replace(')', "%29");
                escape_attr(&format!("background-image: url('{}')", css_safe))
            }
            None => String::new(),
        }
    }
}

/// Renders `template` with `vars` inside the base layout.
pub fn render_page(template: &str, layout: &Layout, vars: &[(&str, String)]) -> AppResult<HttpResponse> {
    let html = render_html(template, layout, vars)?;
    Ok(HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(html))
}

fn render_html(template: &str, layout: &Layout, vars: &[(&str, String)]) -> anyhow::Result<String> {
    let page_vars: HashMap<&str, String> = vars.iter().cloned().collect();
    let content = fill(&load(template)?, &page_vars);

    let mut base_vars = HashMap::new();
    base_vars.insert("title", escape(&layout.title));
    base_vars.insert("heading", escape(&layout.heading));
    base_vars.insert("subheading", escape(&layout.subheading));
    base_vars.insert("meta", escape(&layout.meta));
    base_vars.insert("header_style", layout.header_style());
    base_vars.insert("nav", layout.nav());
    base_vars.insert("flashes", layout.flash_html());
    base_vars.insert("content", content);

    Ok(fill(&load("base.html")?, &base_vars))
}

/// Error pages are rendered without a session. A signed-in user still sees
/// Home, About and Contact, but neither Login/Register nor Log Out.
pub fn render_error(status: StatusCode, message: &str) -> HttpResponse {
    let reason = status.canonical_reason().unwrap_or("Error");
    let layout = Layout::new(reason)
        .heading(&status.as_u16().to_string(), reason)
        .without_account_links();
    let body = render_html("error.html", &layout, &[("message", escape(message))])
        .unwrap_or_else(|_| escape(message));

    HttpResponse::build(status)
        .content_type("text/html; charset=utf-8")
        .body(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_replaces_known_and_blanks_unknown() {
        let mut vars = HashMap::new();
        vars.insert("name", "World".to_string());
        assert_eq!(fill("Hello {{ name }}!{{missing}}", &vars), "Hello World!");
    }

    #[test]
    fn fill_does_not_rescan_inserted_values() {
        let mut vars = HashMap::new();
        vars.insert("body", "{{ secret }}".to_string());
        vars.insert("secret", "leaked".to_string());
        assert_eq!(fill("<p>{{ body }}</p>", &vars), "<p>{{ secret }}</p>");
    }

    #[test]
    fn escaping() {
        assert_eq!(escape("<b>&</b>"), "&lt;b&gt;&amp;&lt;/b&gt;");
        assert_eq!(escape_attr(r#"a"b"#), "a&quot;b");
    }

    #[test]
    fn header_image_cannot_break_out_of_css() {
        let layout = Layout::new("x").header_image("https://e.test/a.jpg') ; x: url('evil");
        let style = layout.header_style();
        assert_eq!(style.matches("')").count(), 1);
        assert!(style.ends_with("')"));
        assert!(style.starts_with("background-image: url('https://e.test/a.jpg%27%29"));
    }

    #[test]
    fn nav_depends_on_login() {
        let mut layout = Layout::new("x");
        assert!(layout.nav().contains("/register"));
        layout.logged_in = true;
        assert!(layout.nav().contains("/logout"));
        assert!(!layout.nav().contains("/register"));
    }

    #[actix_web::test]
    async fn error_pages_leave_out_account_links() {
        let resp = render_error(StatusCode::FORBIDDEN, "No entry");
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        let body = actix_web::body::to_bytes(resp.into_body()).await.unwrap();
        let body = String::from_utf8_lossy(&body);
        assert!(body.contains("No entry"));
        assert!(body.contains(r#"href="/about""#));
        assert!(!body.contains("/register"));
        assert!(!body.contains("/logout"));
    }

    #[test]
    fn every_page_template_is_embedded() {
        for name in [
            "base.html",
            "index.html",
            "post.html",
            "make-post.html",
            "register.html",
            "login.html",
            "about.html",
            "contact.html",
            "error.html",
        ] {
            assert!(load(name).is_ok(), "{} missing", name);
        }
    }

    #[test]
    fn error_page_has_status_and_message() {
        let html = render_html(
            "error.html",
            &Layout::new("Not Found").heading("404", "Not Found"),
            &[("message", escape("Post <1> not found"))],
        )
        .unwrap();
        assert!(html.contains("404"));
        assert!(html.contains("Post &lt;1&gt; not found"));
    }
}
