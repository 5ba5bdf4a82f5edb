//! Fenced block extraction.
//!
//! Fences are lifted out of the text before any other rewrite so the block
//! and inline passes never see code or diagram payloads. Each fence is
//! replaced by a placeholder line built from private-use code points, which
//! cannot occur in the input because [`super::transform`] strips them first.

use super::{Fragment, diagram::check_diagram};

pub(super) const PLACEHOLDER_OPEN: char = '\u{E000}';
pub(super) const PLACEHOLDER_CLOSE: char = '\u{E001}';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(super) enum PlaceholderKind {
    Diagram,
    Code,
}

impl PlaceholderKind {
    fn tag(self) -> char {
        match self {
            PlaceholderKind::Diagram => 'D',
            PlaceholderKind::Code => 'C',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(super) struct PlaceholderKey {
    pub kind: PlaceholderKind,
    pub index: usize,
}

impl PlaceholderKey {
    pub fn token(self) -> String {
        format!(
            "{PLACEHOLDER_OPEN}{}{}{PLACEHOLDER_CLOSE}",
            self.kind.tag(),
            self.index
        )
    }

    /// Parse a line that consists of nothing but a placeholder token.
    pub fn parse_line(line: &str) -> Option<Self> {
        let inner = line
            .trim()
            .strip_prefix(PLACEHOLDER_OPEN)?
            .strip_suffix(PLACEHOLDER_CLOSE)?;
        let mut chars = inner.chars();
        let kind = match chars.next()? {
            'D' => PlaceholderKind::Diagram,
            'C' => PlaceholderKind::Code,
            _ => return None,
        };
        let index = chars.as_str().parse().ok()?;
        Some(Self { kind, index })
    }
}

/// Text with fences lifted out, plus the fragments they turned into.
#[derive(Debug, Default)]
pub(super) struct Extracted {
    pub text: String,
    pub diagrams: Vec<Fragment>,
    pub code: Vec<Fragment>,
}

impl Extracted {
    pub fn lookup(&self, key: PlaceholderKey) -> Option<&Fragment> {
        let table = match key.kind {
            PlaceholderKind::Diagram => &self.diagrams,
            PlaceholderKind::Code => &self.code,
        };
        table.get(key.index)
    }
}

#[derive(Debug, Clone, Copy)]
struct FenceOpen<'a> {
    marker: char,
    width: usize,
    info: &'a str,
}

fn parse_open(line: &str) -> Option<FenceOpen<'_>> {
    let indent = line.len() - line.trim_start_matches(' ').len();
    if indent > 3 {
        return None;
    }
    let rest = &line[indent..];
    let marker = rest.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let width = rest.chars().take_while(|c| *c == marker).count();
    if width < 3 {
        return None;
    }
    let info = rest[width..].trim();
    if marker == '`' && info.contains('`') {
        return None;
    }
    Some(FenceOpen {
        marker,
        width,
        info,
    })
}

fn closes(line: &str, open: &FenceOpen<'_>) -> bool {
    let trimmed = line.trim();
    let width = trimmed.chars().take_while(|c| *c == open.marker).count();
    width >= open.width && width * open.marker.len_utf8() == trimmed.len()
}

fn language_of(info: &str) -> Option<&str> {
    info.split_whitespace().next().filter(|lang| !lang.is_empty())
}

fn is_diagram_language(info: &str) -> bool {
    language_of(info).is_some_and(|lang| lang.eq_ignore_ascii_case("mermaid"))
}

/// Walk `text` line by line, replacing every fence for which `select`
/// returns a fragment. Fences that are not selected are copied through
/// verbatim, including their nested content, so a later pass sees them
/// intact. An unterminated fence runs to the end of the text.
fn lift_fences<F>(
    text: &str,
    kind: PlaceholderKind,
    table: &mut Vec<Fragment>,
    mut select: F,
) -> String
where
    F: FnMut(&str, &str) -> Option<Fragment>,
{
    let lines: Vec<&str> = text.split('\n').collect();
    let mut output: Vec<String> = Vec::with_capacity(lines.len());
    let mut index = 0;

    while index < lines.len() {
        let line = lines[index];
        let Some(open) = parse_open(line) else {
            output.push(line.to_string());
            index += 1;
            continue;
        };

        let body_start = index + 1;
        let mut body_end = body_start;
        while body_end < lines.len() && !closes(lines[body_end], &open) {
            body_end += 1;
        }
        let block_end = (body_end + 1).min(lines.len());
        let body = lines[body_start..body_end].join("\n");

        match select(open.info, &body) {
            Some(fragment) => {
                let key = PlaceholderKey {
                    kind,
                    index: table.len(),
                };
                table.push(fragment);
                output.push(key.token());
            }
            None => output.extend(lines[index..block_end].iter().map(|l| l.to_string())),
        }
        index = block_end;
    }

    output.join("\n")
}

/// Lift diagram fences first, then every remaining fence.
pub(super) fn extract(text: &str) -> Extracted {
    let mut extracted = Extracted::default();

    let without_diagrams = lift_fences(
        text,
        PlaceholderKind::Diagram,
        &mut extracted.diagrams,
        |info, body| is_diagram_language(info).then(|| diagram_fragment(body)),
    );

    extracted.text = lift_fences(
        &without_diagrams,
        PlaceholderKind::Code,
        &mut extracted.code,
        |info, body| {
            Some(Fragment::FencedCode {
                language: language_of(info).map(str::to_string),
                code: body.to_string(),
            })
        },
    );

    extracted
}

fn diagram_fragment(body: &str) -> Fragment {
    let source = body.trim().to_string();
    match check_diagram(&source) {
        Ok(()) => Fragment::Diagram { source },
        Err(issue) => Fragment::DiagramError {
            reason: issue.to_string(),
            source,
        },
    }
}
