//! Markdown to HTML conversion for chat answers.

use pulldown_cmark::{html, Event, Options, Parser};

/// Render a Markdown answer as an HTML fragment.
///
/// Raw HTML in the answer is emitted as escaped text; answers can echo user
/// input and CRM cells, and the page inserts the fragment as markup.
pub fn markdown_to_html(markdown: &str) -> String {
    let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH;
    let parser = Parser::new_ext(markdown, options).map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        other => other,
    });
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}
