use std::sync::OnceLock;

use actix_web::http::StatusCode;
use html_escape::{encode_double_quoted_attribute, encode_text};
use regex::Regex;
use rust_embed::RustEmbed;

use crate::models::models::{HomePage, TimelineEntry, User};

#[derive(RustEmbed)]
#[folder = "templates"]
struct Templates;

fn load(name: &str) -> anyhow::Result<String> {
    let file = Templates::get(name).ok_or_else(|| anyhow::anyhow!("Template {} not found", name))?;
    Ok(String::from_utf8(file.data.to_vec())?)
}

/// Replaces each placeholder in a single pass, so substituted text is never
/// scanned again.
fn fill(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    loop {
        let next = values
            .iter()
            .filter_map(|(key, value)| rest.find(key).map(|at| (at, *key, *value)))
            .min_by_key(|(at, _, _)| *at);
        match next {
            Some((at, key, value)) => {
                out.push_str(&rest[..at]);
                out.push_str(value);
                rest = &rest[at + key.len()..];
            }
            None => {
                out.push_str(rest);
                return out;
            }
        }
    }
}

fn page(title: &str, user: Option<&User>, body: &str) -> anyhow::Result<String> {
    let nav = match user {
        Some(user) => format!(
            r#"<span>@{}</span> <form class="inline" method="post" action="/logout"><button type="submit">Log out</button></form>"#,
            encode_text(&user.username)
        ),
        None => String::new(),
    };
    Ok(fill(
        &load("layout.html")?,
        &[
            ("PAGE_TITLE", encode_text(title).as_ref()),
            ("PAGE_NAV", nav.as_str()),
            ("PAGE_BODY", body),
        ],
    ))
}

fn url_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"https?://[^\s<>]+").expect("Regex should compile"))
}

/// Escapes a message and turns http(s) URLs into links.
pub fn format_message(message: &str) -> String {
    let mut out = String::with_capacity(message.len());
    let mut last = 0;
    for found in url_regex().find_iter(message) {
        out.push_str(&encode_text(&message[last..found.start()]));
        let url = found.as_str();
        out.push_str(&format!(
            r#"<a href="{}" target="_blank" rel="noopener noreferrer">{}</a>"#,
            encode_double_quoted_attribute(url),
            encode_text(url)
        ));
        last = found.end();
    }
    out.push_str(&encode_text(&message[last..]));
    out
}

fn render_entry(entry: &TimelineEntry) -> String {
    format!(
        r#"<article class="entry"><div class="meta"><strong>@{}</strong> · <time datetime="{}">{}</time></div><p>{}</p></article>"#,
        encode_text(&entry.author_username),
        entry.created_at.to_rfc3339(),
        encode_text(&entry.relative_age),
        format_message(&entry.message)
    )
}

fn render_people(people: &[String], action: &str, label: &str, empty: &str) -> String {
    if people.is_empty() {
        return format!(r#"<p class="empty">{}</p>"#, empty);
    }
    let items: String = people
        .iter()
        .map(|name| {
            format!(
                r#"<li><span>@{}</span><form class="inline" method="post" action="{}"><input type="hidden" name="username" value="{}"><button type="submit">{}</button></form></li>"#,
                encode_text(name),
                action,
                encode_double_quoted_attribute(name),
                label
            )
        })
        .collect();
    format!(r#"<ul class="people">{}</ul>"#, items)
}

pub fn render_login(error: Option<&str>) -> anyhow::Result<String> {
    let error = error
        .map(|msg| format!(r#"<p class="error">{}</p>"#, encode_text(msg)))
        .unwrap_or_default();
    let body = fill(&load("login.html")?, &[("LOGIN_ERROR", error.as_str())]);
    page("Welcome", None, &body)
}

pub fn render_home(home: &HomePage) -> anyhow::Result<String> {
    let timeline = if home.timeline.is_empty() {
        r#"<p class="empty">Nothing here yet. Post something or follow someone.</p>"#.to_string()
    } else {
        home.timeline.iter().map(render_entry).collect()
    };
    let following = render_people(&home.following, "/unfollow", "Unfollow", "You are not following anyone.");
    let suggestions = render_people(&home.suggestions, "/follow", "Follow", "Nobody left to follow.");

    let body = fill(
        &load("home.html")?,
        &[
            ("HOME_TIMELINE", timeline.as_str()),
            ("HOME_FOLLOWING", following.as_str()),
            ("HOME_SUGGESTIONS", suggestions.as_str()),
        ],
    );
    page("Timeline", Some(&home.user), &body)
}

pub fn render_post_form(user: &User, max_len: usize) -> anyhow::Result<String> {
    let body = fill(
        &load("post.html")?,
        &[
            ("POST_MAX_LEN", max_len.to_string().as_str()),
            ("POST_USERNAME", encode_double_quoted_attribute(&user.username).as_ref()),
        ],
    );
    page("New post", Some(user), &body)
}

/// Never fails; falls back to plain text when the template is unavailable.
pub fn render_error(status: StatusCode, message: &str) -> String {
    let heading = format!(
        "{} {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("Error")
    );
    let rendered = load("error.html").and_then(|template| {
        let body = fill(
            &template,
            &[
                ("ERROR_STATUS", encode_text(&heading).as_ref()),
                ("ERROR_MESSAGE", encode_text(message).as_ref()),
            ],
        );
        page(&heading, None, &body)
    });
    rendered.unwrap_or_else(|_| format!("{}: {}", heading, encode_text(message)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn fill_does_not_rescan_substituted_text() {
        let out = fill("A=KEY_A B=KEY_B", &[("KEY_A", "KEY_B"), ("KEY_B", "x")]);
        assert_eq!(out, "A=KEY_B B=x");
    }

    #[test]
    fn messages_are_escaped_and_linked() {
        let html = format_message("<b>hi</b> see https://example.com/a?b=1&c=2 ok");
        assert!(html.starts_with("&lt;b&gt;hi&lt;/b&gt; see "));
        assert!(html.contains(r#"href="https://example.com/a?b=1&amp;c=2""#));
        assert!(html.ends_with(" ok"));
        assert!(!html.contains("<b>"));
    }

    #[test]
    fn home_page_lists_entries_and_people() {
        let home = HomePage {
            user: User { id: 2, username: "alice".into() },
            timeline: vec![TimelineEntry {
                post_id: 1,
                message: "hello".into(),
                author_username: "bob".into(),
                created_at: Utc::now(),
                relative_age: "just now".into(),
            }],
            suggestions: vec!["carol".into()],
            following: vec!["bob".into()],
        };
        let html = render_home(&home).unwrap();
        assert!(html.contains("hello"));
        assert!(html.contains("@bob"));
        assert!(html.contains(r#"action="/follow""#));
        assert!(html.contains(r#"value="carol""#));
        assert!(html.contains(r#"action="/unfollow""#));
        assert!(html.contains("Log out"));
    }

    #[test]
    fn login_page_shows_error() {
        let html = render_login(Some("<nope>")).unwrap();
        assert!(html.contains("&lt;nope&gt;"));
        assert!(html.contains(r#"action="/""#));
    }

    #[test]
    fn error_page_has_status() {
        let html = render_error(StatusCode::NOT_FOUND, "post 3 not found");
        assert!(html.contains("404 Not Found"));
        assert!(html.contains("post 3 not found"));
    }
}
