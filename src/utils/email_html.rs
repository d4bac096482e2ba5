use std::path::Path;

use anyhow::{Context, Result, anyhow};
use css_inline::CSSInliner;
use regex::RegexBuilder;
use tracing::{debug, warn};

/// Rewrites `<style>` rules into per-element `style` attributes.
pub trait StyleInliner: Send + Sync {
    fn inline(&self, html: &str) -> Result<String>;
}

/// `css-inline` backed inliner. Never touches the network and drops the
/// `<style>` blocks once their rules are applied.
#[derive(Clone, Copy, Default)]
pub struct CssInlineEngine;

impl StyleInliner for CssInlineEngine {
    fn inline(&self, html: &str) -> Result<String> {
        let inliner = CSSInliner::options()
            .load_remote_stylesheets(false)
            .keep_style_tags(false)
            .keep_link_tags(false)
            .build();
        inliner
            .inline(html)
            .map_err(|err| anyhow!("css inlining failed: {err}"))
    }
}

/// Read the newsletter stylesheet. A missing or unreadable file yields `None`.
pub async fn load_stylesheet(path: &Path) -> Option<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(css) if !css.trim().is_empty() => {
            debug!(path = %path.display(), "loaded newsletter stylesheet");
            Some(css)
        }
        Ok(_) => {
            warn!(path = %path.display(), "newsletter stylesheet is empty");
            None
        }
        Err(err) => {
            warn!(?err, path = %path.display(), "newsletter stylesheet not available");
            None
        }
    }
}

/// Remove `<link>` tags whose href ends in `stylesheet_name`, case-insensitively.
pub fn strip_stylesheet_link(html: &str, stylesheet_name: &str) -> Result<String> {
    let pattern = format!(
        r#"<link[^>]*href=["'][^"']*{}["'][^>]*>"#,
        regex::escape(stylesheet_name)
    );
    let link = RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .build()
        .context("invalid stylesheet link pattern")?;
    Ok(link.replace_all(html, "").into_owned())
}

/// Place `css` in a `<style>` block right before `</head>`. Documents without a
/// head are returned unchanged.
pub fn inject_style_block(html: &str, css: &str) -> String {
    html.replacen(
        "</head>",
        &format!(r#"<style type="text/css">{css}</style></head>"#),
        1,
    )
}

/// Produce email-ready HTML. Without a stylesheet, or on any failure along the
/// way, the original document is returned untouched.
pub fn prepare_email_html(
    original: &str,
    css: Option<&str>,
    stylesheet_name: &str,
    inliner: &dyn StyleInliner,
) -> String {
    let Some(css) = css else {
        return original.to_string();
    };

    match inline_stylesheet(original, css, stylesheet_name, inliner) {
        Ok(inlined) => {
            let style_attributes = inlined.matches("style=").count();
            if style_attributes == 0 {
                warn!("no inline styles present after inlining");
            } else {
                debug!(style_attributes, "inlined newsletter stylesheet");
            }
            inlined
        }
        Err(err) => {
            warn!(?err, "css inlining failed; sending original content");
            original.to_string()
        }
    }
}

fn inline_stylesheet(
    original: &str,
    css: &str,
    stylesheet_name: &str,
    inliner: &dyn StyleInliner,
) -> Result<String> {
    let without_link = strip_stylesheet_link(original, stylesheet_name)?;
    let with_style = inject_style_block(&without_link, css);
    inliner.inline(&with_style)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const NEWSLETTER: &str = r#"<!DOCTYPE html>
<html>
<head>
<title>Alphaminr</title>
<LINK rel="stylesheet" HREF="/static/css/newsletter.css">
</head>
<body><h1 class="headline">Markets</h1><p class="lead">Stocks rallied.</p></body>
</html>"#;

    const CSS: &str = ".headline { color: #0f172a; } .lead { font-size: 16px; }";

    struct FailingInliner;

    impl StyleInliner for FailingInliner {
        fn inline(&self, _html: &str) -> Result<String> {
            Err(anyhow!("parser exploded"))
        }
    }

    #[test]
    fn link_removal_is_case_insensitive() {
        let stripped = strip_stylesheet_link(NEWSLETTER, "newsletter.css").unwrap();
        assert!(!stripped.to_lowercase().contains("newsletter.css"));
        assert!(stripped.contains("<title>Alphaminr</title>"));
    }

    #[test]
    fn other_links_survive() {
        let html = r#"<head><link rel="icon" href="/favicon.ico"><link href='newsletter.css' rel="stylesheet"></head>"#;
        let stripped = strip_stylesheet_link(html, "newsletter.css").unwrap();
        assert_eq!(stripped, r#"<head><link rel="icon" href="/favicon.ico"></head>"#);
    }

    #[test]
    fn style_block_lands_before_head_close() {
        let html = inject_style_block("<html><head></head><body></body></html>", "p{}");
        assert_eq!(
            html,
            r#"<html><head><style type="text/css">p{}</style></head><body></body></html>"#
        );
    }

    #[test]
    fn inlines_styles_and_drops_link() {
        let output = prepare_email_html(NEWSLETTER, Some(CSS), "newsletter.css", &CssInlineEngine);
        assert!(!output.to_lowercase().contains("newsletter.css"));
        assert!(output.contains("style="));
        assert!(output.contains("Stocks rallied."));
    }

    #[test]
    fn inliner_failure_returns_original_bytes() {
        let output = prepare_email_html(NEWSLETTER, Some(CSS), "newsletter.css", &FailingInliner);
        assert_eq!(output, NEWSLETTER);
    }

    #[test]
    fn missing_stylesheet_returns_original_bytes() {
        let output = prepare_email_html(NEWSLETTER, None, "newsletter.css", &CssInlineEngine);
        assert_eq!(output, NEWSLETTER);
    }

    #[tokio::test]
    async fn stylesheet_loading_is_best_effort() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.css");
        assert!(load_stylesheet(&missing).await.is_none());

        let present = dir.path().join("newsletter.css");
        let mut file = std::fs::File::create(&present).unwrap();
        write!(file, "{CSS}").unwrap();
        assert_eq!(load_stylesheet(&present).await.as_deref(), Some(CSS));
    }
}
