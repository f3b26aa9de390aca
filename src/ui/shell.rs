//! Page frame, navigation bar and footer.

use std::fmt::Write as _;

use crate::markdown::escape_html;

/// Navigation bar links as `(label, active)`.
pub const NAV_LINKS: [(&str, bool); 4] = [
    ("Home", false),
    ("College Predictor", false),
    ("AI counselor", true),
    ("Contacts", false),
];

/// A titled column of footer links.
#[derive(Debug, Clone, Copy)]
pub struct FooterSection {
    /// Column heading.
    pub title: &'static str,
    /// Link labels.
    pub links: &'static [&'static str],
}

/// Footer columns.
pub const FOOTER_SECTIONS: [FooterSection; 3] = [
    FooterSection {
        title: "About",
        links: &["Who are we?", "Business Relation", "Contact Us"],
    },
    FooterSection {
        title: "Socials",
        links: &["Instagram", "Reddit", "Facebook", "Quora"],
    },
    FooterSection {
        title: "Policies",
        links: &["Privacy Policy", "Terms & Conditions", "Cancellation & Refund"],
    },
];

const STYLES: &str = r"
* { box-sizing: border-box; }
body { margin: 0; font-family: Inter, Helvetica, Arial, sans-serif; color: #1f2937;
  background: linear-gradient(135deg, #FFFCF7, #FFF4DE 50%, #E8FAF8); min-height: 100vh;
  display: flex; flex-direction: column; }
a { color: inherit; text-decoration: none; }
button { font: inherit; cursor: pointer; }
button:disabled { opacity: .5; cursor: not-allowed; }
.navbar { background: #fff; border-bottom: 1px solid #e5e7eb; padding: 1rem 1.5rem; }
.navbar-inner, .footer-inner { max-width: 80rem; margin: 0 auto; display: flex;
  align-items: center; justify-content: space-between; gap: 2rem; }
.brand { font-weight: 700; font-size: 1.25rem; }
.nav-links { display: flex; gap: 2rem; font-weight: 500; color: #374151; }
.nav-links .active { color: #f97316; }
.nav-right { display: flex; align-items: center; gap: 1rem; }
.search-mentor { background: #1f2937; color: #fff; border: 0; border-radius: .5rem; padding: .5rem 1rem; }
.avatar { width: 2.5rem; height: 2.5rem; border-radius: 9999px; background: #d1d5db;
  display: flex; align-items: center; justify-content: center; font-size: .875rem; color: #4b5563; }
main { flex: 1; }
.footer { background: #020b13; color: #a0a9be; padding: 4rem 1.5rem; }
.footer-inner { align-items: flex-start; flex-wrap: wrap; }
.footer-cta p { font-size: .875rem; line-height: 1.35; }
.book-call { background: none; border: 0; padding: 0; color: #eab308; font-weight: 600; }
.footer-sections { display: flex; gap: 3rem; flex-wrap: wrap; }
.footer-section h3 { color: #fff; font-size: 1.125rem; margin: 0 0 1rem; }
.footer-section a { display: block; margin-bottom: 1rem; }
.footer-section a:hover { color: #fff; }
.chat-layout { max-width: 80rem; margin: 0 auto; padding: 2rem 1.5rem;
  display: grid; grid-template-columns: 1fr 3fr; gap: 2rem; }
@media (max-width: 1024px) { .chat-layout { grid-template-columns: 1fr; } .nav-links { display: none; } }
.sidebar { background: linear-gradient(#fef9c3, #fed7aa); border-radius: 1rem; padding: 1.5rem; }
.sidebar h2 { font-size: 1.875rem; margin: 0 0 1.5rem; }
.sidebar p { font-size: .875rem; color: #4b5563; }
.quick-action { width: 100%; text-align: left; margin-top: .75rem; padding: .75rem 1rem;
  border: 0; border-radius: .5rem; background: #FFFCF7; font-weight: 500; display: flex; justify-content: space-between; }
.quick-action:hover { background: #fef08a; }
.chat-panel { height: 85vh; display: flex; flex-direction: column; }
.transcript { flex: 1; overflow-y: auto; padding: 1.5rem; scrollbar-width: none; }
.empty-state { height: 100%; display: flex; flex-direction: column; justify-content: center;
  align-items: center; text-align: center; color: #4b5563; }
.empty-state .accent { color: #f97316; font-weight: 500; }
.suggestions { display: flex; flex-wrap: wrap; justify-content: center; gap: .75rem; margin-bottom: 1rem; }
.suggestion { background: #fff; border: 1px solid #fed7aa; border-radius: .5rem; padding: .5rem 1rem; font-weight: 500; }
.hint { font-style: italic; font-size: .875rem; color: #6b7280; }
.message { display: flex; margin-bottom: 1rem; }
.message.user { justify-content: flex-end; }
.message-row { display: flex; align-items: flex-start; gap: .75rem; max-width: 80%; }
.message.user .message-row { flex-direction: row-reverse; }
.message-avatar { width: 2rem; height: 2rem; border-radius: 9999px; flex-shrink: 0; color: #fff;
  display: flex; align-items: center; justify-content: center; font-size: .75rem; }
.message.user .message-avatar { background: #3b82f6; }
.message.bot .message-avatar { background: #fb923c; }
.bubble { border-radius: 1rem; padding: 1rem; font-size: .875rem; line-height: 1.6; }
.message.user .bubble { background: #fff; }
.bubble table { border-collapse: collapse; }
.bubble th, .bubble td { border: 1px solid #e5e7eb; padding: .25rem .5rem; }
.bubble blockquote { border-left: 3px solid #fb923c; margin: 0; padding-left: .75rem; }
.time { font-size: .75rem; margin-top: .5rem; text-align: right; color: #6b7280; }
.typing-indicator { padding: 0 1.5rem; font-size: .875rem; color: #6b7280; }
.composer { padding: 1rem; border-top: 1px solid #e5e7eb; }
.composer form { display: flex; align-items: center; padding: .5rem 1rem; border: 1px solid #d1d5db;
  border-radius: 9999px; background: #fff; }
.composer input { flex: 1; border: 0; outline: none; background: transparent; font-size: 1rem; }
.composer button { border: 0; background: none; color: #f97316; padding: .5rem; }
";

/// Wrap `content` in the full document with navbar and footer.
#[must_use]
pub fn page(title: &str, content: &str) -> String {
    let title = escape_html(title);
    let navbar = navbar();
    let footer = footer();
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <meta name="description" content="PreBot, an AI counselor for engineering college admissions">
    <title>{title}</title>
    <style>{STYLES}</style>
</head>
<body>
{navbar}
<main id="app">
{content}
</main>
{footer}
</body>
</html>"#
    )
}

/// Top navigation bar.
#[must_use]
pub fn navbar() -> String {
    let links = NAV_LINKS
        .iter()
        .fold(String::new(), |mut out, (label, active)| {
            let class = if *active { r#" class="active""# } else { "" };
            let _ = write!(out, r##"<a href="#"{class}>{}</a>"##, escape_html(label));
            out
        });

    format!(
        r#"<nav class="navbar">
    <div class="navbar-inner">
        <a href="/" class="brand">Precollege</a>
        <div class="nav-links">{links}</div>
        <div class="nav-right">
            <button type="button" class="search-mentor">Search mentor</button>
            <div class="avatar"><span>NH</span></div>
        </div>
    </div>
</nav>"#
    )
}

/// Site footer.
#[must_use]
pub fn footer() -> String {
    let sections = FOOTER_SECTIONS.iter().fold(String::new(), |mut out, section| {
        let links: String = section
            .links
            .iter()
            .map(|label| format!(r##"<a href="#">{}</a>"##, escape_html(label)))
            .collect();
        let _ = write!(
            out,
            r#"<div class="footer-section"><h3>{}</h3>{links}</div>"#,
            escape_html(section.title)
        );
        out
    });

    format!(
        r#"<footer class="footer">
    <div class="footer-inner">
        <div class="footer-cta">
            <div class="brand">Precollege</div>
            <p>Get started by booking a call<br>with our mentors</p>
            <button type="button" class="book-call">BOOK A CALL</button>
        </div>
        <div class="footer-sections">{sections}</div>
    </div>
</footer>"#
    )
}
