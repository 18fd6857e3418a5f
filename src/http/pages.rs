//! HTML for the console's pages. These are small enough that a template
//! engine would be overkill: plain `format!` with explicit escaping.

use crate::auth::Principal;


/// What the panel shows about the load-test engine.
pub enum EngineStatus {
    /// Engine reachable, with its current metrics report.
    Reachable { metrics: String },

    /// Engine could not be reached.
    Unreachable { error: String },
}

/// The login page. `error` is rendered as a banner above the form.
pub fn login(error: Option<&str>) -> String {
    let error_banner = match error {
        Some(error) => format!("<p class=\"error\">{}</p>\n", escape_html(error)),
        None => String::new(),
    };

    shell("Login", &format!(r#"<h1>gander</h1>
{error_banner}<form action="/login_submit" method="get">
  <label>Username <input type="text" name="username" autofocus></label>
  <label>Password <input type="password" name="password"></label>
  <button type="submit">Log in</button>
</form>
"#))
}

/// The control panel. `user` is `None` when the console runs without
/// authentication, in which case no logout link is shown. `msg` carries the
/// outcome of a previous start/stop action.
pub fn panel(user: Option<&Principal>, engine: &EngineStatus, msg: Option<&str>) -> String {
    let session_line = match user {
        Some(user) => format!(
            "<p class=\"session\">Logged in as <strong>{}</strong> \
                <a href=\"/logout\">Log out</a></p>\n",
            escape_html(user.username()),
        ),
        None => String::new(),
    };

    let msg_banner = match msg {
        Some(msg) => format!("<p class=\"msg\">{}</p>\n", escape_html(msg)),
        None => String::new(),
    };

    let engine_section = match engine {
        EngineStatus::Reachable { metrics } => {
            format!("<h2>Engine metrics</h2>\n<pre>{}</pre>\n", escape_html(metrics))
        }
        EngineStatus::Unreachable { error } => format!(
            "<p class=\"error\">Load-test engine unreachable: {}</p>\n",
            escape_html(error),
        ),
    };

    shell("Control panel", &format!(r#"<h1>gander</h1>
{session_line}{msg_banner}<form action="/start" method="post">
  <label>Users <input type="number" name="users" min="1" placeholder="10"></label>
  <label>Hatch rate <input type="text" name="hatch_rate" placeholder="1"></label>
  <button type="submit">Start load test</button>
</form>
<form action="/stop" method="post">
  <button type="submit">Stop load test</button>
</form>
{engine_section}"#))
}

const STYLE: &str = "\
    body { font-family: sans-serif; max-width: 44rem; margin: 2rem auto; padding: 0 1rem; }\n\
    label { display: block; margin: 0.5rem 0; }\n\
    form { margin: 1rem 0; }\n\
    pre { background: #f4f4f4; padding: 0.75rem; overflow-x: auto; }\n\
    .error { color: #b00020; border: 1px solid #b00020; padding: 0.5rem; }\n\
    .msg { background: #f4f4f4; border: 1px solid #999; padding: 0.5rem; }\n\
    .session { color: #555; }\n";

fn shell(title: &str, main: &str) -> String {
    format!(
        "<!DOCTYPE html>\n\
        <html>\n\
        <head>\n\
        <meta charset=\"utf-8\">\n\
        <title>{title} - gander</title>\n\
        <style>\n{STYLE}</style>\n\
        </head>\n\
        <body>\n{main}</body>\n\
        </html>\n"
    )
}

/// Escapes text for interpolation into HTML (element content and
/// double-quoted attribute values).
fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escaping() {
        assert_eq!(escape_html("plain text 123"), "plain text 123");
        assert_eq!(
            escape_html(r#"<script>alert("x & 'y'")</script>"#),
            "&lt;script&gt;alert(&quot;x &amp; &#39;y&#39;&quot;)&lt;/script&gt;",
        );
    }

    #[test]
    fn login_form_contract() {
        let page = login(None);
        assert!(page.contains(r#"action="/login_submit""#));
        assert!(page.contains(r#"method="get""#));
        assert!(page.contains(r#"name="username""#));
        assert!(page.contains(r#"name="password""#));
        assert!(!page.contains("class=\"error\""));

        let page = login(Some("Invalid username or password"));
        assert!(page.contains("Invalid username or password"));
    }

    #[test]
    fn panel_sections() {
        let user = Principal::new("admin");
        let engine = EngineStatus::Reachable { metrics: "GET /: 12 <reqs>".into() };
        let page = panel(Some(&user), &engine, Some("5 users & started"));
        assert!(page.contains("Logged in as <strong>admin</strong>"));
        assert!(page.contains(r#"href="/logout""#));
        assert!(page.contains("5 users &amp; started"));
        assert!(page.contains("GET /: 12 &lt;reqs&gt;"));
        assert!(page.contains(r#"action="/start""#));
        assert!(page.contains(r#"action="/stop""#));
    }

    #[test]
    fn panel_without_user_or_engine() {
        let engine = EngineStatus::Unreachable { error: "connection refused".into() };
        let page = panel(None, &engine, None);
        assert!(!page.contains("Logged in as"));
        assert!(!page.contains("/logout"));
        assert!(page.contains("Load-test engine unreachable"));
        assert!(page.contains("connection refused"));
    }
}
