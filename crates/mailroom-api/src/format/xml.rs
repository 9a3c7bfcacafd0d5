//! XML rendering of response values.
//!
//! The document root is named after the first top-level key and holds that
//! key's value; everything after the first key is dropped. Keys that are not
//! valid element names become `<item key="...">`, list entries `<item>`.

use serde_json::Value;

const DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"windows-1252\"?>\n";
const FALLBACK_ROOT: &str = "response";

pub fn document(value: &Value) -> String {
    let (root, content) = match value {
        Value::Object(map) => match map.iter().next() {
            Some((key, first)) => (key.as_str(), first),
            None => (FALLBACK_ROOT, &Value::Null),
        },
        other => (FALLBACK_ROOT, other),
    };

    let mut out = String::from(DECLARATION);
    write_element(&mut out, root, content);
    out
}

fn write_element(out: &mut String, name: &str, value: &Value) {
    let open = if is_element_name(name) {
        name.to_string()
    } else {
        format!("item key=\"{}\"", escape(name))
    };
    let close = if is_element_name(name) { name } else { "item" };

    let text = match value {
        Value::Null | Value::Bool(false) => {
            out.push_str(&format!("<{}/>", open));
            return;
        }
        Value::Bool(true) => "1".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => escape(s),
        Value::Array(items) => {
            out.push_str(&format!("<{}>", open));
            for item in items {
                write_element(out, "item", item);
            }
            out.push_str(&format!("</{}>", close));
            return;
        }
        Value::Object(map) => {
            out.push_str(&format!("<{}>", open));
            for (key, item) in map {
                write_element(out, key, item);
            }
            out.push_str(&format!("</{}>", close));
            return;
        }
    };

    out.push_str(&format!("<{}>{}</{}>", open, text, close));
}

fn is_element_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        && !name.to_ascii_lowercase().starts_with("xml")
}

/// Escape markup characters and drop controls XML 1.0 cannot carry.
fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '\t' | '\n' | '\r' => out.push(c),
            c if c < ' ' => {}
            c => out.push(c),
        }
    }
    out
}
