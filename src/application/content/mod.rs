//! Rich-text to print markup.
//!
//! [`transform`] is pure and total: every input, however malformed, yields a
//! [`FragmentSequence`]. The pipeline runs in fixed stages:
//!
//! 1. diagram fences are lifted out and validated, then every other fence;
//! 2. the remaining lines go through the block passes in [`blocks`];
//! 3. block text goes through the inline passes in [`inline`];
//! 4. placeholders are swapped back for their recorded fragments;
//! 5. stray breaks at block edges are collapsed.

mod blocks;
pub mod diagram;
mod fences;
mod inline;

use std::borrow::Cow;

use self::blocks::Block;
use self::fences::{Extracted, PLACEHOLDER_CLOSE, PLACEHOLDER_OPEN};

pub use self::diagram::{DiagramIssue, DiagramValidation, check_diagram, validate_diagram};
pub use self::inline::Inline;

/// Fixed text shown in place of a diagram that failed validation.
pub const DIAGRAM_ERROR_TITLE: &str = "Diagram could not be rendered";

/// One typed piece of transformed content, in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    Paragraph { content: Vec<Inline> },
    Heading { level: u8, content: Vec<Inline> },
    List { ordered: bool, items: Vec<Vec<Inline>> },
    Blockquote { content: Vec<Inline> },
    Rule,
    FencedCode { language: Option<String>, code: String },
    Diagram { source: String },
    DiagramError { reason: String, source: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FragmentSequence(Vec<Fragment>);

impl FragmentSequence {
    pub fn fragments(&self) -> &[Fragment] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn diagram_count(&self) -> usize {
        self.0
            .iter()
            .filter(|fragment| matches!(fragment, Fragment::Diagram { .. }))
            .count()
    }

    pub fn diagram_error_count(&self) -> usize {
        self.0
            .iter()
            .filter(|fragment| matches!(fragment, Fragment::DiagramError { .. }))
            .count()
    }

    /// Paragraph text joined by blank lines; other fragments are skipped.
    pub fn plain_text(&self) -> String {
        self.0
            .iter()
            .filter_map(|fragment| match fragment {
                Fragment::Paragraph { content } => Some(inline::plain_text(content)),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Render to HTML. Content headings are shifted down by `heading_offset`
    /// levels so they nest under the surrounding section headings.
    pub fn to_html(&self, heading_offset: u8) -> String {
        let mut html = String::new();
        for fragment in &self.0 {
            render_fragment(fragment, heading_offset, &mut html);
            html.push('\n');
        }
        html
    }
}

impl From<Vec<Fragment>> for FragmentSequence {
    fn from(fragments: Vec<Fragment>) -> Self {
        Self(fragments)
    }
}

pub fn transform(raw: &str) -> FragmentSequence {
    let cleaned = sanitize_input(raw);
    let extracted = fences::extract(&cleaned);
    let blocks = blocks::parse(&extracted.text);
    let fragments = restore(blocks, &extracted);
    FragmentSequence(collapse_breaks(fragments))
}

/// Diagram fields may hold bare diagram source or markdown; bare source is
/// wrapped in a diagram fence.
pub fn diagram_markdown(field: &str) -> Cow<'_, str> {
    let has_fence = field
        .lines()
        .any(|line| line.trim_start().starts_with("```") || line.trim_start().starts_with("~~~"));
    if has_fence {
        Cow::Borrowed(field)
    } else {
        Cow::Owned(format!("```mermaid\n{}\n```", field.trim()))
    }
}

pub fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

fn sanitize_input(raw: &str) -> String {
    raw.replace("\r\n", "\n")
        .chars()
        .filter(|ch| *ch != PLACEHOLDER_OPEN && *ch != PLACEHOLDER_CLOSE)
        .collect()
}

fn restore(blocks: Vec<Block>, extracted: &Extracted) -> Vec<Fragment> {
    blocks
        .into_iter()
        .filter_map(|block| match block {
            Block::Placeholder(key) => extracted.lookup(key).cloned(),
            Block::Heading { level, text } => Some(Fragment::Heading {
                level,
                content: inline::parse(&text),
            }),
            Block::List { ordered, items } => Some(Fragment::List {
                ordered,
                items: items.iter().map(|item| inline::parse(item)).collect(),
            }),
            Block::Quote(lines) => Some(Fragment::Blockquote {
                content: inline::parse(&lines.join("\n")),
            }),
            Block::Rule => Some(Fragment::Rule),
            Block::Paragraph(text) | Block::Line(text) => Some(Fragment::Paragraph {
                content: inline::parse(&text),
            }),
            Block::Blank => None,
        })
        .collect()
}

fn collapse_breaks(fragments: Vec<Fragment>) -> Vec<Fragment> {
    fragments
        .into_iter()
        .filter_map(|fragment| match fragment {
            Fragment::Paragraph { content } => {
                let content = trim_edges(content);
                (!content.is_empty()).then_some(Fragment::Paragraph { content })
            }
            Fragment::Blockquote { content } => {
                let content = trim_edges(content);
                (!content.is_empty()).then_some(Fragment::Blockquote { content })
            }
            Fragment::Heading { level, content } => Some(Fragment::Heading {
                level,
                content: trim_edges(content),
            }),
            Fragment::List { ordered, items } => Some(Fragment::List {
                ordered,
                items: items.into_iter().map(trim_edges).collect(),
            }),
            other => Some(other),
        })
        .collect()
}

/// Drop line breaks and spaces touching either end of a block.
fn trim_edges(mut content: Vec<Inline>) -> Vec<Inline> {
    if let Some(Inline::Text(text)) = content.first_mut() {
        *text = text.trim_start().to_string();
    }
    if let Some(Inline::Text(text)) = content.last_mut() {
        *text = text.trim_end().to_string();
    }
    content.retain(|token| !matches!(token, Inline::Text(text) if text.is_empty()));
    content
}

fn render_fragment(fragment: &Fragment, heading_offset: u8, html: &mut String) {
    match fragment {
        Fragment::Paragraph { content } => {
            html.push_str("<p>");
            html.push_str(&inline::render(content));
            html.push_str("</p>");
        }
        Fragment::Heading { level, content } => {
            let level = level.saturating_add(heading_offset).clamp(1, 6);
            html.push_str(&format!(
                "<h{level} class=\"content-heading\">{}</h{level}>",
                inline::render(content)
            ));
        }
        Fragment::List { ordered, items } => {
            let tag = if *ordered { "ol" } else { "ul" };
            html.push_str(&format!("<{tag}>"));
            for item in items {
                html.push_str("<li>");
                html.push_str(&inline::render(item));
                html.push_str("</li>");
            }
            html.push_str(&format!("</{tag}>"));
        }
        Fragment::Blockquote { content } => {
            html.push_str("<blockquote><p>");
            html.push_str(&inline::render(content));
            html.push_str("</p></blockquote>");
        }
        Fragment::Rule => html.push_str("<hr>"),
        Fragment::FencedCode { language, code } => {
            match language {
                Some(language) => html.push_str(&format!(
                    "<pre class=\"code-block\" data-language=\"{0}\"><code class=\"language-{0}\">",
                    escape_html(language)
                )),
                None => html.push_str("<pre class=\"code-block\"><code>"),
            }
            html.push_str(&escape_html(code));
            html.push_str("</code></pre>");
        }
        Fragment::Diagram { source } => {
            html.push_str("<figure class=\"diagram-container\"><pre class=\"mermaid\" data-role=\"diagram\">");
            html.push_str(&escape_html(source));
            html.push_str("</pre></figure>");
        }
        Fragment::DiagramError { reason, source } => {
            html.push_str("<figure class=\"diagram-container diagram-error\" data-role=\"diagram-error\">");
            html.push_str(&format!(
                "<p class=\"diagram-error__title\">{DIAGRAM_ERROR_TITLE}</p><p class=\"diagram-error__reason\">{}</p>",
                escape_html(reason)
            ));
            html.push_str("<pre class=\"diagram-error__source\">");
            html.push_str(&escape_html(source));
            html.push_str("</pre></figure>");
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn paragraph(text: &str) -> Fragment {
        Fragment::Paragraph {
            content: vec![Inline::Text(text.to_string())],
        }
    }

    #[test]
    fn mixed_document_keeps_source_order() {
        let raw = "# Overview\n\nIntro with **bold**.\n\n```mermaid\ngraph TD\nA-->B\n```\n\n- one\n- two\n\n```sql\nselect 1;\n```";
        let fragments = transform(raw);
        let kinds: Vec<&str> = fragments
            .fragments()
            .iter()
            .map(|fragment| match fragment {
                Fragment::Heading { .. } => "heading",
                Fragment::Paragraph { .. } => "paragraph",
                Fragment::Diagram { .. } => "diagram",
                Fragment::List { .. } => "list",
                Fragment::FencedCode { .. } => "code",
                _ => "other",
            })
            .collect();
        assert_eq!(kinds, ["heading", "paragraph", "diagram", "list", "code"]);
    }

    #[test]
    fn fenced_payloads_are_not_rewritten() {
        let fragments = transform("```\n**keep** _as_ [is](x)\n# not a heading\n```");
        assert_eq!(
            fragments.fragments(),
            [Fragment::FencedCode {
                language: None,
                code: "**keep** _as_ [is](x)\n# not a heading".to_string()
            }]
        );
    }

    #[test]
    fn one_valid_and_one_invalid_diagram() {
        let raw = "```mermaid\ngraph TD\nA-->B\n```\n\n```mermaid\ngraph TD\nA[broken-->B\n```";
        let fragments = transform(raw);
        assert_eq!(fragments.diagram_count(), 1);
        assert_eq!(fragments.diagram_error_count(), 1);

        let html = fragments.to_html(2);
        assert_eq!(html.matches("data-role=\"diagram\"").count(), 1);
        assert_eq!(html.matches(DIAGRAM_ERROR_TITLE).count(), 1);
    }

    #[test]
    fn forged_placeholders_are_stripped_from_input() {
        let fragments = transform("\u{E000}D0\u{E001}");
        assert_eq!(fragments.fragments(), [paragraph("D0")]);
    }

    #[test]
    fn quote_edges_do_not_leave_stray_breaks() {
        let fragments = transform(">\n> quoted\n>");
        assert_eq!(
            fragments.fragments(),
            [Fragment::Blockquote {
                content: vec![Inline::Text("quoted".to_string())]
            }]
        );
    }

    #[test]
    fn bare_diagram_source_is_wrapped_in_a_fence() {
        let fragments = transform(&diagram_markdown("graph LR\nA-->B"));
        assert_eq!(fragments.diagram_count(), 1);

        let markdown = "Context\n\n```mermaid\ngraph LR\nA-->B\n```";
        assert_eq!(diagram_markdown(markdown), markdown);
    }

    #[test]
    fn headings_are_offset_when_rendered() {
        let html = transform("## Detail").to_html(2);
        assert_eq!(html.trim(), "<h4 class=\"content-heading\">Detail</h4>");
    }

    proptest! {
        #[test]
        fn transform_is_total(raw in any::<String>()) {
            let _ = transform(&raw).to_html(2);
        }

        #[test]
        fn transform_survives_fence_soup(
            parts in prop::collection::vec(
                prop_oneof![
                    Just("```".to_string()),
                    Just("````mermaid".to_string()),
                    Just("```mermaid".to_string()),
                    Just("~~~".to_string()),
                    Just("graph TD".to_string()),
                    Just("A[x-->B".to_string()),
                    Just("> q".to_string()),
                    Just("- item".to_string()),
                    "[a-z *_`#\\[\\]()!]{0,12}",
                ],
                0..24,
            )
        ) {
            let raw = parts.join("\n");
            let fragments = transform(&raw);
            let _ = fragments.to_html(0);
        }

        #[test]
        fn single_plain_paragraph_round_trips(
            lines in prop::collection::vec("[a-z][a-z ,]{0,30}", 1..5),
            pad in "[ \n]{0,3}",
        ) {
            let raw = format!("{pad}{}{pad}", lines.join("\n"));
            let fragments = transform(&raw);
            prop_assert_eq!(fragments.fragments(), &[paragraph(raw.trim())][..]);
        }

        #[test]
        fn plain_text_transform_is_idempotent(
            paragraphs in prop::collection::vec("[a-z][a-z ]{0,30}", 1..4),
        ) {
            let first = transform(&paragraphs.join("\n\n"));
            let second = transform(&first.plain_text());
            prop_assert_eq!(first, second);
        }
    }
}
