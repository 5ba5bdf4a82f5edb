//! Cheap structural checks run before a diagram is handed to the renderer.
//!
//! This is a pre-filter, not a grammar: it rejects the failure modes that
//! dominate in practice (missing type declaration, truncated body, unclosed
//! label brackets). Balanced-but-wrong sources still reach the renderer and
//! fail there.

use std::fmt;

use thiserror::Error;

/// Diagram type keywords accepted on the first non-blank line, lower-cased.
const DIAGRAM_KEYWORDS: &[&str] = &[
    "graph",
    "flowchart",
    "sequencediagram",
    "classdiagram",
    "statediagram",
    "erdiagram",
    "journey",
    "gantt",
    "pie",
    "gitgraph",
    "mindmap",
    "timeline",
    "sankey",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BracketKind {
    Square,
    Curly,
    Round,
}

impl fmt::Display for BracketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BracketKind::Square => "square brackets",
            BracketKind::Curly => "curly braces",
            BracketKind::Round => "parentheses",
        };
        f.write_str(label)
    }
}

/// Why a diagram source was rejected. Messages are safe to show to readers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiagramIssue {
    #[error("diagram is empty")]
    Empty,
    #[error("unrecognised diagram type `{keyword}`")]
    UnknownType { keyword: String },
    #[error("diagram needs a type declaration and at least one statement")]
    MissingStatements,
    #[error("unbalanced {kind} in diagram")]
    Unbalanced { kind: BracketKind },
}

/// Outcome of validating one diagram source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagramValidation {
    pub is_valid: bool,
    pub reason: Option<String>,
}

impl From<Result<(), DiagramIssue>> for DiagramValidation {
    fn from(result: Result<(), DiagramIssue>) -> Self {
        match result {
            Ok(()) => Self {
                is_valid: true,
                reason: None,
            },
            Err(issue) => Self {
                is_valid: false,
                reason: Some(issue.to_string()),
            },
        }
    }
}

pub fn validate_diagram(source: &str) -> DiagramValidation {
    check_diagram(source).into()
}

pub fn check_diagram(source: &str) -> Result<(), DiagramIssue> {
    if source.trim().is_empty() {
        return Err(DiagramIssue::Empty);
    }

    let mut statements = source.lines().filter(|line| !line.trim().is_empty());
    let declaration = statements.next().unwrap_or_default().trim().to_lowercase();
    if !DIAGRAM_KEYWORDS
        .iter()
        .any(|keyword| declaration.starts_with(keyword))
    {
        let keyword = declaration
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_string();
        return Err(DiagramIssue::UnknownType { keyword });
    }

    if statements.next().is_none() {
        return Err(DiagramIssue::MissingStatements);
    }

    let (mut square, mut curly, mut round) = (0i64, 0i64, 0i64);
    for ch in source.chars() {
        match ch {
            '[' => square += 1,
            ']' => square -= 1,
            '{' => curly += 1,
            '}' => curly -= 1,
            '(' => round += 1,
            ')' => round -= 1,
            _ => {}
        }
    }

    for (depth, kind) in [
        (square, BracketKind::Square),
        (curly, BracketKind::Curly),
        (round, BracketKind::Round),
    ] {
        if depth != 0 {
            return Err(DiagramIssue::Unbalanced { kind });
        }
    }

    Ok(())
}
