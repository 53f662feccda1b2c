use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::history::types::{Message, Role};

/// `**already bold**` is left alone; `*text*` becomes Discord bold.
static EMPHASIS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*[^*\n]+\*\*|\*([^*\n]+)\*").unwrap());

const BULLET: char = '•';

/// Convert the chat's lightweight markup to Discord markdown.
pub fn format_markup(text: &str) -> String {
    text.lines()
        .map(|line| {
            let line = EMPHASIS_RE.replace_all(line, |caps: &Captures| match caps.get(1) {
                Some(inner) => format!("**{}**", inner.as_str()),
                None => caps[0].to_string(),
            });
            if line.starts_with(BULLET) {
                format!("\u{2003}{}", line)
            } else {
                line.into_owned()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn wikipedia_url(title: &str) -> String {
    format!("https://en.wikipedia.org/wiki/{}", title.replace(' ', "_"))
}

/// Full rendering of a message for a channel reply.
pub fn render_message(message: &Message, show_reasoning: bool) -> String {
    let mut out = match message.role {
        Role::User => format!("**Q:** {}", message.content),
        Role::Assistant => format_markup(&message.content),
    };

    if show_reasoning {
        if let Some(reasoning) = message.reasoning.as_deref().filter(|r| !r.is_empty()) {
            out.push_str("\n\n**Reasoning:**\n");
            let quoted: Vec<String> = format_markup(reasoning)
                .lines()
                .map(|line| format!("> {}", line))
                .collect();
            out.push_str(&quoted.join("\n"));
        }
    }

    let references = message.wiki_references();
    if !references.is_empty() {
        out.push_str("\n\n*Source: Wikipedia*");
        for title in references {
            out.push_str(&format!("\n- {} <{}>", title, wikipedia_url(title)));
        }
    }

    if let Some(error) = message.error() {
        out.push_str(&format!("\n\n*Error: {}*", error));
    }

    out
}

/// One-line summary used by the history listing.
pub fn render_history_line(message: &Message) -> String {
    let speaker = match message.role {
        Role::User => "You",
        Role::Assistant => "Assistant",
    };
    let first_line = message.content.lines().next().unwrap_or("");
    let snippet: String = first_line.chars().take(160).collect();
    let ellipsis = if snippet.len() < message.content.trim_end().len() {
        "…"
    } else {
        ""
    };
    let mut line = format!("**{}:** {}{}", speaker, snippet, ellipsis);
    if !message.wiki_references().is_empty() {
        line.push_str(&format!(" _(Wikipedia: {})_", message.wiki_references().join(", ")));
    }
    if message.error().is_some() {
        line.push_str(" _(failed)_");
    }
    line
}
