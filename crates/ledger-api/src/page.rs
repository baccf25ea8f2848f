//! Embedded chat page.
//!
//! A single self-contained HTML file (inline CSS and JavaScript) compiled
//! into the binary with `include_str!`. It posts to `/chat` and `/clear`
//! and renders the returned HTML fragments.

pub const CHAT_HTML: &str = include_str!("../assets/chat.html");
