//! Display formatting for message bodies.
//!
//! Bodies are stored as plain text with a small inline markup:
//! `**bold**`, `%%italic%%`, `__underline__` and `##monospace##`. Bare
//! `http(s)://` URLs become links and newlines become `<br>`. Everything else
//! is HTML-escaped.

const WRAPPER_OPEN: &str = "<div class=\"formatted-content\">";
const WRAPPER_CLOSE: &str = "</div>";
const LINK_ATTRS: &str = "\" class=\"link-extern\" target=\"_blank\" rel=\"noopener\">";

const INLINE: [(&str, &str); 4] = [("**", "b"), ("%%", "i"), ("__", "u"), ("##", "tt")];

const SAFE_TAGS: [&str; 10] = [
    "<b>", "</b>", "<i>", "</i>", "<u>", "</u>", "<tt>", "</tt>", "<br>", "</a>",
];

/// Render a stored body for display. Output of this function is returned
/// unchanged when passed in again.
pub fn format_ready(raw: &str) -> String {
    if is_formatted(raw) {
        return raw.to_string();
    }

    let text = escape(&raw.replace("\r\n", "\n"));
    let mut out = String::with_capacity(text.len() + WRAPPER_OPEN.len() + WRAPPER_CLOSE.len());
    out.push_str(WRAPPER_OPEN);
    render_inline(&text, &mut out);
    out.push_str(WRAPPER_CLOSE);
    out
}

/// True for text that already is formatter output: wrapped, and containing
/// nothing but escaped text, the inline tags and external links.
pub fn is_formatted(text: &str) -> bool {
    text.strip_prefix(WRAPPER_OPEN)
        .and_then(|rest| rest.strip_suffix(WRAPPER_CLOSE))
        .is_some_and(only_safe_markup)
}

fn only_safe_markup(mut html: &str) -> bool {
    while let Some(c) = html.chars().next() {
        match c {
            '<' => {
                if let Some(tag) = SAFE_TAGS.iter().find(|t| html.starts_with(**t)) {
                    html = &html[tag.len()..];
                } else if let Some(len) = safe_anchor_len(html) {
                    html = &html[len..];
                } else {
                    return false;
                }
            }
            '>' | '"' | '\'' => return false,
            _ => html = &html[c.len_utf8()..],
        }
    }
    true
}

fn safe_anchor_len(html: &str) -> Option<usize> {
    let href = html.strip_prefix("<a href=\"")?;
    let end = href.find('"')?;
    let url = &href[..end];
    if url_len(url) != Some(url.len()) || url.contains(['<', '>', '\'']) {
        return None;
    }
    href[end..].starts_with(LINK_ATTRS).then(|| "<a href=\"".len() + end + LINK_ATTRS.len())
}

fn render_inline(text: &str, out: &mut String) {
    let mut rest = text;
    while let Some(c) = rest.chars().next() {
        if let Some(len) = url_len(rest) {
            let url = &rest[..len];
            out.push_str("<a href=\"");
            out.push_str(url);
            out.push_str(LINK_ATTRS);
            out.push_str(url);
            out.push_str("</a>");
            rest = &rest[len..];
            continue;
        }

        if let Some((delim, tag)) = INLINE.iter().find(|(d, _)| rest.starts_with(d)) {
            let inner = &rest[delim.len()..];
            // Markup must hug its content: "5 ** 2" stays literal.
            if let Some(end) = inner
                .find(delim)
                .filter(|&end| end > 0)
                .filter(|&end| !inner.starts_with(char::is_whitespace) && !inner[..end].ends_with(char::is_whitespace))
            {
                out.push_str(&format!("<{}>", tag));
                render_inline(&inner[..end], out);
                out.push_str(&format!("</{}>", tag));
                rest = &inner[end + delim.len()..];
                continue;
            }
        }

        if c == '\n' {
            out.push_str("<br>");
        } else {
            out.push(c);
        }
        rest = &rest[c.len_utf8()..];
    }
}

/// Length of the URL at the start of already escaped text, if any.
fn url_len(text: &str) -> Option<usize> {
    let scheme = ["https://", "http://"].into_iter().find(|s| text.starts_with(s))?;

    let mut len = text
        .find(|c: char| c.is_whitespace() || c == '<')
        .unwrap_or(text.len());

    loop {
        let candidate = &text[..len];
        if let Some(stripped) = candidate
            .strip_suffix("&quot;")
            .or_else(|| candidate.strip_suffix("&#39;"))
        {
            len = stripped.len();
        } else if candidate.ends_with(['.', ',', ';', ':', '!', '?', ')']) {
            len -= 1;
        } else {
            break;
        }
    }

    (len > scheme.len()).then_some(len)
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
