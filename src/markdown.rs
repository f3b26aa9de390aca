//! Markdown to HTML rendering for bot replies.
//!
//! Replies are rendered with GitHub-flavoured extensions (tables,
//! strikethrough, task lists, footnotes) and `:shortcode:` emoji. Raw HTML in
//! the source is shown as text, never passed through to the page.

use std::borrow::Cow;

use pulldown_cmark::{CowStr, Event, Options, Parser, Tag, TagEnd, TextMergeStream, html};

/// Render Markdown to an HTML fragment.
///
/// # Example
///
/// ```rust
/// use prebot::markdown::render_markdown;
///
/// let html = render_markdown("**NIT Trichy**");
/// assert_eq!(html, "<p><strong>NIT Trichy</strong></p>\n");
/// ```
pub fn render_markdown(text: &str) -> String {
    let options = Options::ENABLE_TABLES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
        | Options::ENABLE_FOOTNOTES;

    let mut in_code_block = false;
    let parser = TextMergeStream::new(Parser::new_ext(text, options)).map(|event| match event {
        Event::Start(Tag::CodeBlock(kind)) => {
            in_code_block = true;
            Event::Start(Tag::CodeBlock(kind))
        }
        Event::End(TagEnd::CodeBlock) => {
            in_code_block = false;
            Event::End(TagEnd::CodeBlock)
        }
        Event::Text(chunk) if !in_code_block => {
            let replaced = match replace_shortcodes(&chunk) {
                Cow::Owned(replaced) => Some(replaced),
                Cow::Borrowed(_) => None,
            };
            replaced.map_or(Event::Text(chunk), |r| Event::Text(CowStr::from(r)))
        }
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        other => other,
    });

    let mut out = String::with_capacity(text.len() + text.len() / 2);
    html::push_html(&mut out, parser);
    out
}

/// Replace GitHub emoji shortcodes such as `:tada:` with the emoji.
///
/// Unknown shortcodes are left as written.
pub fn replace_shortcodes(text: &str) -> Cow<'_, str> {
    if !text.contains(':') {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    let mut replaced = false;

    while let Some(open) = rest.find(':') {
        let after = &rest[open + 1..];
        let Some(close) = after.find(':') else {
            break;
        };

        let name = &after[..close];
        let emoji = is_shortcode_name(name)
            .then(|| emojis::get_by_shortcode(name))
            .flatten();

        match emoji {
            Some(emoji) => {
                out.push_str(&rest[..open]);
                out.push_str(emoji.as_str());
                rest = &after[close + 1..];
                replaced = true;
            }
            None => {
                // The closing colon may open the next shortcode.
                out.push_str(&rest[..=open + close]);
                rest = &after[close..];
            }
        }
    }

    if !replaced {
        return Cow::Borrowed(text);
    }
    out.push_str(rest);
    Cow::Owned(out)
}

fn is_shortcode_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || matches!(b, b'_' | b'+' | b'-'))
}

/// Escape text for use in HTML content and attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}
