//! Message template rendering
//!
//! Templates are plain text with `{placeholder}` substitutions filled
//! from the session and creator context:
//!
//! | placeholder          | value                              |
//! |----------------------|------------------------------------|
//! | `{id}`               | session identifier                 |
//! | `{title}`            | session title                      |
//! | `{url}`              | public session link                |
//! | `{creator_id}`       | creator account identifier         |
//! | `{creator_name}`     | creator display name               |
//! | `{creator_username}` | creator handle                     |
//! | `{scheduled_start}`  | announced start (RFC 3339, or "")  |
//! | `{started_at}`       | actual start (RFC 3339, or "")     |
//!
//! `{{` and `}}` produce literal braces. An unknown placeholder or an
//! unbalanced brace is a render error: the template is configuration,
//! so a typo should fail loudly rather than post a broken message.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::{Error, Result};
use crate::traits::session_source::{Creator, SessionSnapshot};

fn format_time(time: Option<DateTime<Utc>>) -> String {
    time.map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_default()
}

fn lookup(name: &str, session: &SessionSnapshot, creator: &Creator) -> Option<String> {
    match name {
        "id" => Some(session.id.clone()),
        "title" => Some(session.title.clone()),
        "url" => Some(session.url.clone()),
        "creator_id" => Some(creator.id.clone()),
        "creator_name" => Some(creator.name.clone()),
        "creator_username" => Some(creator.username.clone()),
        "scheduled_start" => Some(format_time(session.scheduled_start)),
        "started_at" => Some(format_time(session.started_at)),
        _ => None,
    }
}

/// Render `template` with session and creator context.
///
/// # Errors
///
/// `Error::Render` on an unknown placeholder or unbalanced braces.
pub fn render(template: &str, session: &SessionSnapshot, creator: &Creator) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' => {
                if chars.peek() == Some(&'{') {
                    chars.next();
                    out.push('{');
                    continue;
                }

                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) => name.push(ch),
                        None => {
                            return Err(Error::render(format!(
                                "unclosed placeholder '{{{name}' in template"
                            )));
                        }
                    }
                }

                let value = lookup(&name, session, creator).ok_or_else(|| {
                    Error::render(format!("unknown placeholder '{{{name}}}' in template"))
                })?;
                out.push_str(&value);
            }
            '}' => {
                if chars.peek() == Some(&'}') {
                    chars.next();
                    out.push('}');
                } else {
                    return Err(Error::render("unbalanced '}' in template".to_string()));
                }
            }
            _ => out.push(c),
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn context() -> (SessionSnapshot, Creator) {
        let session = SessionSnapshot {
            id: "1abc".to_string(),
            creator_id: "42".to_string(),
            title: "launch party".to_string(),
            state: Some("scheduled".to_string()),
            scheduled_start: Some(Utc.with_ymd_and_hms(2026, 1, 9, 12, 0, 0).unwrap()),
            started_at: None,
            created_at: None,
            url: "https://example.com/s/1abc".to_string(),
        };
        let creator = Creator {
            id: "42".to_string(),
            name: "Host Name".to_string(),
            username: "host".to_string(),
        };
        (session, creator)
    }

    #[test]
    fn substitutes_placeholders() {
        let (session, creator) = context();
        let out = render(
            "{creator_name} (@{creator_username}) announced {title} {url}",
            &session,
            &creator,
        )
        .unwrap();
        assert_eq!(
            out,
            "Host Name (@host) announced launch party https://example.com/s/1abc"
        );
    }

    #[test]
    fn renders_timestamps_rfc3339() {
        let (session, creator) = context();
        let out = render("starts {scheduled_start}", &session, &creator).unwrap();
        assert_eq!(out, "starts 2026-01-09T12:00:00Z");
    }

    #[test]
    fn absent_timestamp_renders_empty() {
        let (session, creator) = context();
        let out = render("[{started_at}]", &session, &creator).unwrap();
        assert_eq!(out, "[]");
    }

    #[test]
    fn doubled_braces_are_literals() {
        let (session, creator) = context();
        let out = render("{{title}} is {title}", &session, &creator).unwrap();
        assert_eq!(out, "{title} is launch party");
    }

    #[test]
    fn unknown_placeholder_is_render_error() {
        let (session, creator) = context();
        let err = render("{nope}", &session, &creator).unwrap_err();
        assert!(matches!(err, Error::Render(_)));
    }

    #[test]
    fn unclosed_placeholder_is_render_error() {
        let (session, creator) = context();
        assert!(matches!(
            render("{title", &session, &creator).unwrap_err(),
            Error::Render(_)
        ));
        assert!(matches!(
            render("so }", &session, &creator).unwrap_err(),
            Error::Render(_)
        ));
    }

    #[test]
    fn plain_text_passes_through() {
        let (session, creator) = context();
        let out = render("no placeholders here", &session, &creator).unwrap();
        assert_eq!(out, "no placeholders here");
    }
}
