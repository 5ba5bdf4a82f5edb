//! Inline rewrite passes.
//!
//! Block text is turned into a token stream and rewritten by an ordered list
//! of passes. Passes only ever look inside [`Inline::Text`] tokens, so code
//! spans and markup produced by an earlier pass are never re-matched.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use url::Url;

use super::escape_html;

/// One piece of inline content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inline {
    /// Literal reader text, escaped on output.
    Text(String),
    /// An inline code span; never rewritten.
    Code(String),
    /// Markup produced by a rewrite pass, emitted verbatim.
    Markup(String),
}

type InlinePass = fn(Vec<Inline>) -> Vec<Inline>;

/// Inline passes in application order.
pub(super) const INLINE_PASSES: &[(&str, InlinePass)] = &[
    ("code_spans", code_spans),
    ("strong", strong),
    ("emphasis", emphasis),
    ("links", links),
    ("images", images),
];

static CODE_SPAN: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`\n]+)`").expect("code span regex"));
static STRONG_STAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*\*(\S(?:.*?\S)?)\*\*").expect("strong star regex"));
static STRONG_UNDERSCORE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"__(\S(?:.*?\S)?)__").expect("strong underscore regex"));
static EM_STAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*([^*\s](?:[^*\n]*[^*\s])?)\*").expect("emphasis star regex"));
static EM_UNDERSCORE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"_([^_\s](?:[^_\n]*[^_\s])?)_").expect("emphasis underscore regex")
});
static LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(!?)\[([^\]\n]*)\]\(([^)\s]+)\)").expect("link regex"));
static IMAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"!\[([^\]\n]*)\]\(([^)\s]+)\)").expect("image regex"));

pub(super) fn parse(text: &str) -> Vec<Inline> {
    let tokens = INLINE_PASSES
        .iter()
        .fold(vec![Inline::Text(text.to_string())], |tokens, (_, pass)| {
            pass(tokens)
        });
    merge_text(tokens)
}

pub(super) fn render(tokens: &[Inline]) -> String {
    let mut html = String::new();
    for token in tokens {
        match token {
            Inline::Text(text) => html.push_str(&escape_html(text).replace('\n', "<br>\n")),
            Inline::Code(code) => {
                html.push_str("<code>");
                html.push_str(&escape_html(code));
                html.push_str("</code>");
            }
            Inline::Markup(markup) => html.push_str(markup),
        }
    }
    html
}

/// Reader-visible text with markup dropped.
pub(super) fn plain_text(tokens: &[Inline]) -> String {
    tokens
        .iter()
        .filter_map(|token| match token {
            Inline::Text(text) | Inline::Code(text) => Some(text.as_str()),
            Inline::Markup(_) => None,
        })
        .collect()
}

/// Rewrite every match of `pattern` inside text tokens. A `None` from
/// `rewrite` leaves that match untouched.
fn rewrite_text<F>(tokens: Vec<Inline>, pattern: &Regex, mut rewrite: F) -> Vec<Inline>
where
    F: FnMut(&str, &Captures<'_>) -> Option<Vec<Inline>>,
{
    let mut output = Vec::with_capacity(tokens.len());
    for token in tokens {
        let Inline::Text(text) = token else {
            output.push(token);
            continue;
        };

        let mut cursor = 0;
        for caps in pattern.captures_iter(&text) {
            let Some(whole) = caps.get(0) else { continue };
            let Some(replacement) = rewrite(&text, &caps) else {
                continue;
            };
            if whole.start() > cursor {
                output.push(Inline::Text(text[cursor..whole.start()].to_string()));
            }
            output.extend(replacement);
            cursor = whole.end();
        }
        if cursor < text.len() {
            output.push(Inline::Text(text[cursor..].to_string()));
        }
    }
    output
}

fn wrap(tag: &str, inner: &str) -> Vec<Inline> {
    vec![
        Inline::Markup(format!("<{tag}>")),
        Inline::Text(inner.to_string()),
        Inline::Markup(format!("</{tag}>")),
    ]
}

fn is_word_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

/// Underscore emphasis only counts when it is not inside a word, so
/// identifiers such as `snake_case_name` survive.
fn at_word_boundary(text: &str, caps: &Captures<'_>) -> bool {
    let Some(whole) = caps.get(0) else {
        return false;
    };
    let before = text[..whole.start()].chars().next_back();
    let after = text[whole.end()..].chars().next();
    !before.is_some_and(is_word_char) && !after.is_some_and(is_word_char)
}

fn code_spans(tokens: Vec<Inline>) -> Vec<Inline> {
    rewrite_text(tokens, &CODE_SPAN, |_, caps| {
        Some(vec![Inline::Code(caps[1].to_string())])
    })
}

fn strong(tokens: Vec<Inline>) -> Vec<Inline> {
    let tokens = rewrite_text(tokens, &STRONG_STAR, |_, caps| Some(wrap("strong", &caps[1])));
    rewrite_text(tokens, &STRONG_UNDERSCORE, |text, caps| {
        at_word_boundary(text, caps).then(|| wrap("strong", &caps[1]))
    })
}

fn emphasis(tokens: Vec<Inline>) -> Vec<Inline> {
    let tokens = rewrite_text(tokens, &EM_STAR, |_, caps| Some(wrap("em", &caps[1])));
    rewrite_text(tokens, &EM_UNDERSCORE, |text, caps| {
        at_word_boundary(text, caps).then(|| wrap("em", &caps[1]))
    })
}

fn links(tokens: Vec<Inline>) -> Vec<Inline> {
    rewrite_text(tokens, &LINK, |_, caps| {
        if !caps[1].is_empty() {
            return None;
        }
        let target = &caps[3];
        let label = if caps[2].trim().is_empty() {
            target
        } else {
            &caps[2]
        };
        let Some(href) = safe_target(target) else {
            return Some(vec![Inline::Text(label.to_string())]);
        };
        Some(vec![
            Inline::Markup(format!("<a href=\"{}\">", escape_html(href))),
            Inline::Text(label.to_string()),
            Inline::Markup("</a>".to_string()),
        ])
    })
}

fn images(tokens: Vec<Inline>) -> Vec<Inline> {
    rewrite_text(tokens, &IMAGE, |_, caps| {
        let alt = &caps[1];
        let Some(src) = safe_target(&caps[2]) else {
            return Some(vec![Inline::Text(alt.to_string())]);
        };
        Some(vec![Inline::Markup(format!(
            "<img class=\"inline-image\" src=\"{}\" alt=\"{}\">",
            escape_html(src),
            escape_html(alt)
        ))])
    })
}

/// Keep `http`, `https`, `mailto` and relative targets.
fn safe_target(target: &str) -> Option<&str> {
    match Url::parse(target) {
        Ok(url) => matches!(url.scheme(), "http" | "https" | "mailto").then_some(target),
        Err(url::ParseError::RelativeUrlWithoutBase) => Some(target),
        Err(_) => None,
    }
}

fn merge_text(tokens: Vec<Inline>) -> Vec<Inline> {
    let mut merged: Vec<Inline> = Vec::with_capacity(tokens.len());
    for token in tokens {
        match (merged.last_mut(), token) {
            (_, Inline::Text(text)) if text.is_empty() => {}
            (Some(Inline::Text(previous)), Inline::Text(text)) => previous.push_str(&text),
            (_, token) => merged.push(token),
        }
    }
    merged
}
