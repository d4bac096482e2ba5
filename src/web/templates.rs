use chrono::{Datelike, Local};
use reqwest::Url;

use crate::backend::NewsletterSummary;

const PAGE_BASE_STYLES: &str = r#"
        :root { color-scheme: light; }
        body { font-family: "Helvetica Neue", Arial, sans-serif; margin: 0; background: #f8fafc; color: #0f172a; }
        header { background: #ffffff; padding: 2rem 1.5rem; border-bottom: 1px solid #e2e8f0; }
        .header-bar { display: flex; justify-content: space-between; align-items: center; flex-wrap: wrap; gap: 1rem; }
        .header-bar h1 { margin: 0; }
        .back-link, .logout-link { display: inline-flex; align-items: center; gap: 0.4rem; color: #1d4ed8; text-decoration: none; font-weight: 600; background: #e0f2fe; padding: 0.5rem 0.95rem; border-radius: 999px; border: 1px solid #bfdbfe; }
        .back-link:hover, .logout-link:hover { background: #bfdbfe; border-color: #93c5fd; }
        main { padding: 2rem 1.5rem; max-width: 1100px; margin: 0 auto; box-sizing: border-box; }
        .panel { background: #ffffff; border-radius: 12px; border: 1px solid #e2e8f0; padding: 1.5rem; box-shadow: 0 18px 40px rgba(15, 23, 42, 0.08); margin-bottom: 2rem; }
        .panel h2 { margin-top: 0; }
        label { display: block; margin-bottom: 0.5rem; font-weight: 600; }
        textarea, input[type="text"] { width: 100%; padding: 0.75rem; border-radius: 8px; border: 1px solid #cbd5f5; background: #f8fafc; color: #0f172a; box-sizing: border-box; font-family: Menlo, Consolas, monospace; }
        textarea { min-height: 420px; }
        button { padding: 0.85rem 1.2rem; border: none; border-radius: 8px; background: #2563eb; color: #ffffff; font-weight: 600; cursor: pointer; transition: background 0.15s ease; }
        button:hover { background: #1d4ed8; }
        button:disabled { opacity: 0.6; cursor: not-allowed; }
        button.secondary { background: #e2e8f0; color: #0f172a; }
        button.danger { background: #dc2626; }
        .actions { display: flex; flex-wrap: wrap; gap: 0.75rem; margin-top: 1rem; }
        table { width: 100%; border-collapse: collapse; background: #ffffff; }
        th, td { padding: 0.75rem 1rem; border-bottom: 1px solid #e2e8f0; text-align: left; }
        th { background: #f1f5f9; font-weight: 600; }
        td a { color: #2563eb; font-weight: 600; text-decoration: none; }
        .status-box { margin-top: 1rem; padding: 1rem; border-radius: 12px; background: #f1f5f9; min-height: 1.5rem; white-space: pre-wrap; }
        .status-box.error { color: #b91c1c; }
        .status-box.success { color: #166534; }
        .note { color: #475569; font-size: 0.95rem; line-height: 1.6; }
        .preview { width: 100%; min-height: 520px; border: 1px solid #e2e8f0; border-radius: 12px; background: #ffffff; }
        .app-footer { margin-top: 3rem; text-align: center; font-size: 0.85rem; color: #94a3b8; }
"#;

const DASHBOARD_SCRIPT: &str = r#"
<script>
(function () {
    const button = document.getElementById('generate-button');
    const status = document.getElementById('generate-status');
    button.addEventListener('click', async () => {
        button.disabled = true;
        status.className = 'status-box';
        status.textContent = 'Generating newsletter. This can take several minutes...';
        try {
            const response = await fetch('/api/generate-newsletter', { method: 'POST' });
            const data = await response.json();
            if (response.ok && data.success) {
                status.className = 'status-box success';
                status.textContent = data.message;
                if (data.newsletter_id) {
                    window.location.href = '/editor/' + encodeURIComponent(data.newsletter_id);
                }
            } else {
                status.className = 'status-box error';
                status.textContent = data.error || 'Generation failed.';
            }
        } catch (err) {
            status.className = 'status-box error';
            status.textContent = 'Generation failed: ' + err;
        } finally {
            button.disabled = false;
        }
    });
})();
</script>
"#;

const EDITOR_SCRIPT: &str = r#"
<script>
(function () {
    const root = document.getElementById('editor');
    const id = root.dataset.newsletterId;
    const base = '/api/newsletter/' + encodeURIComponent(id);
    const content = document.getElementById('html-content');
    const notes = document.getElementById('editor-notes');
    const preview = document.getElementById('preview');
    const status = document.getElementById('editor-status');
    const review = document.getElementById('review-output');

    const refreshPreview = () => { preview.srcdoc = content.value; };
    content.addEventListener('input', refreshPreview);
    refreshPreview();

    const report = (ok, text) => {
        status.className = 'status-box ' + (ok ? 'success' : 'error');
        status.textContent = text;
    };

    const post = async (url, body) => {
        const response = await fetch(url, {
            method: 'POST',
            headers: { 'Content-Type': 'application/json' },
            body: JSON.stringify(body || {}),
        });
        const data = await response.json().catch(() => ({ error: 'Unexpected response' }));
        return { ok: response.ok, data };
    };

    document.getElementById('save-button').addEventListener('click', async () => {
        const { ok, data } = await post(base, { html_content: content.value, editor_notes: notes.value });
        report(ok, ok ? data.message : data.error);
    });

    document.getElementById('review-button').addEventListener('click', async () => {
        review.textContent = 'Requesting review...';
        const { ok, data } = await post(base + '/review');
        review.textContent = ok ? data.review : data.error;
    });

    const send = async (testMode) => {
        if (!testMode && !window.confirm('Send this newsletter to the full list?')) {
            return;
        }
        const { ok, data } = await post(base + '/send', { test_mode: testMode });
        report(ok, ok ? data.message : data.error);
    };
    document.getElementById('test-button').addEventListener('click', () => send(true));
    document.getElementById('send-button').addEventListener('click', () => send(false));
})();
</script>
"#;

pub fn render_login_page(form_action: &str, error: Option<&str>) -> String {
    let footer = render_footer();
    let error_html = error
        .map(|message| format!(r#"<p class="error">{}</p>"#, escape_html(message)))
        .unwrap_or_default();

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>Newsletter Editor | Sign in</title>
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <meta name="robots" content="noindex,nofollow">
    <style>
        :root {{ color-scheme: light; }}
        body {{ font-family: "Helvetica Neue", Arial, sans-serif; display: flex; flex-direction: column; align-items: center; justify-content: center; min-height: 100vh; margin: 0; background: #f1f5f9; color: #0f172a; padding: 1.5rem; box-sizing: border-box; gap: 1.5rem; }}
        main {{ width: 100%; max-width: 420px; display: flex; flex-direction: column; align-items: center; gap: 1.5rem; }}
        .panel {{ background: #ffffff; padding: 2.5rem 2.25rem; border-radius: 18px; box-shadow: 0 20px 60px rgba(15, 23, 42, 0.08); width: 100%; border: 1px solid #e2e8f0; box-sizing: border-box; }}
        h1 {{ margin: 0 0 1rem; font-size: 1.6rem; text-align: center; }}
        label {{ display: block; margin-top: 1.2rem; font-weight: 600; }}
        input {{ width: 100%; padding: 0.85rem; margin-top: 0.65rem; border-radius: 10px; border: 1px solid #cbd5f5; background: #f8fafc; font-size: 1rem; box-sizing: border-box; }}
        input:focus {{ outline: none; border-color: #2563eb; box-shadow: 0 0 0 3px rgba(37, 99, 235, 0.15); }}
        button {{ margin-top: 2rem; width: 100%; padding: 0.95rem; border: none; border-radius: 10px; background: #2563eb; color: #ffffff; font-weight: 600; font-size: 1.05rem; cursor: pointer; }}
        button:hover {{ background: #1d4ed8; }}
        .error {{ color: #b91c1c; font-weight: 600; text-align: center; }}
        .app-footer {{ margin-top: 2.5rem; text-align: center; font-size: 0.85rem; color: #64748b; }}
    </style>
</head>
<body>
    <main>
        <section class="panel">
            <h1>Newsletter Editor</h1>
            {error_html}
            <form method="post" action="{form_action}">
                <label for="password">Editor password</label>
                <input id="password" type="password" name="password" required autofocus>
                <button type="submit">Sign in</button>
            </form>
        </section>
        {footer}
    </main>
</body>
</html>"#,
        error_html = error_html,
        form_action = escape_html(form_action),
        footer = footer,
    )
}

pub fn render_dashboard(newsletters: &[NewsletterSummary], show_logout: bool) -> String {
    let rows = if newsletters.is_empty() {
        r#"<tr><td colspan="3" class="note">No newsletters available from the backend.</td></tr>"#
            .to_string()
    } else {
        newsletters
            .iter()
            .map(|newsletter| {
                format!(
                    r#"<tr><td><a href="/editor/{href}">{id}</a></td><td>{created}</td><td>{size}</td></tr>"#,
                    href = escape_html(&encode_path_segment(&newsletter.id)),
                    id = escape_html(&newsletter.id),
                    created = escape_html(newsletter.created.as_deref().unwrap_or("-")),
                    size = newsletter
                        .size
                        .map(format_size)
                        .unwrap_or_else(|| "-".to_string()),
                )
            })
            .collect::<String>()
    };

    let logout = if show_logout {
        r#"<a class="logout-link" href="/logout">Log out</a>"#
    } else {
        ""
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>Newsletter Editor</title>
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <meta name="robots" content="noindex,nofollow">
    <style>{styles}</style>
</head>
<body>
    <header>
        <div class="header-bar">
            <h1>Newsletter Editor</h1>
            {logout}
        </div>
        <p class="note">Review, edit and send the generated newsletters.</p>
    </header>
    <main>
        <section class="panel">
            <h2>Generate</h2>
            <p class="note">Ask the backend for a fresh issue. Generation blocks until the backend answers.</p>
            <button type="button" id="generate-button">Generate newsletter</button>
            <div id="generate-status" class="status-box"></div>
        </section>
        <section class="panel">
            <h2>Newsletters</h2>
            <table>
                <thead><tr><th>Newsletter</th><th>Created</th><th>Size</th></tr></thead>
                <tbody>{rows}</tbody>
            </table>
        </section>
        {footer}
    </main>
{script}
</body>
</html>"#,
        styles = PAGE_BASE_STYLES,
        logout = logout,
        rows = rows,
        footer = render_footer(),
        script = DASHBOARD_SCRIPT,
    )
}

pub fn render_editor(newsletter_id: &str, html_content: &str) -> String {
    let id = escape_html(newsletter_id);

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>Editing {id}</title>
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <meta name="robots" content="noindex,nofollow">
    <style>{styles}</style>
</head>
<body>
    <header>
        <div class="header-bar">
            <h1>{id}</h1>
            <a class="back-link" href="/">&larr; All newsletters</a>
        </div>
    </header>
    <main id="editor" data-newsletter-id="{id}">
        <section class="panel">
            <h2>Content</h2>
            <label for="html-content">HTML</label>
            <textarea id="html-content" spellcheck="false">{content}</textarea>
            <label for="editor-notes" style="margin-top:1rem;">Editor notes</label>
            <input type="text" id="editor-notes" placeholder="What changed?">
            <div class="actions">
                <button type="button" id="save-button">Save</button>
                <button type="button" id="review-button" class="secondary">AI review</button>
                <button type="button" id="test-button" class="secondary">Send test</button>
                <button type="button" id="send-button" class="danger">Send to list</button>
            </div>
            <div id="editor-status" class="status-box"></div>
        </section>
        <section class="panel">
            <h2>Review</h2>
            <div id="review-output" class="status-box"></div>
        </section>
        <section class="panel">
            <h2>Preview</h2>
            <iframe id="preview" class="preview" sandbox=""></iframe>
        </section>
        {footer}
    </main>
{script}
</body>
</html>"#,
        id = id,
        styles = PAGE_BASE_STYLES,
        content = escape_html(html_content),
        footer = render_footer(),
        script = EDITOR_SCRIPT,
    )
}

pub fn render_footer() -> String {
    let current_year = Local::now().year();
    format!(
        r#"<footer class="app-footer">© {year} Alphaminr editorial tools. Internal use only.</footer>"#,
        year = current_year
    )
}

pub fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Percent-encode `input` as a single URL path segment.
fn encode_path_segment(input: &str) -> String {
    let Ok(mut url) = Url::parse("http://portal.invalid/") else {
        return input.to_string();
    };
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.clear().push(input);
    }
    url.path().trim_start_matches('/').to_string()
}

fn format_size(bytes: u64) -> String {
    if bytes >= 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{bytes} B")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn editor_escapes_content() {
        let page = render_editor("abc.html", "<p>Hi & bye</p>");
        assert!(page.contains("&lt;p&gt;Hi &amp; bye&lt;/p&gt;"));
        assert!(page.contains(r#"data-newsletter-id="abc.html""#));
    }

    #[test]
    fn dashboard_links_each_newsletter() {
        let newsletters = vec![NewsletterSummary {
            id: "alphaminr 2024.html".to_string(),
            created: Some("2024-05-01T08:00:00".to_string()),
            size: Some(2048),
        }];
        let page = render_dashboard(&newsletters, true);
        assert!(page.contains(r#"href="/editor/alphaminr%202024.html""#));
        assert!(page.contains("2.0 KB"));
        assert!(page.contains("/logout"));
    }

    #[test]
    fn editor_links_encode_slashes_and_spaces() {
        assert_eq!(encode_path_segment("a/b c.html"), "a%2Fb%20c.html");
        assert_eq!(encode_path_segment("plain_2024-05-01.html"), "plain_2024-05-01.html");
    }

    #[test]
    fn login_error_is_rendered() {
        let page = render_login_page("/login?next=%2F", Some("Invalid password. Please try again."));
        assert!(page.contains("Invalid password. Please try again."));
        assert!(page.contains(r#"action="/login?next=%2F""#));
    }
}
