//! Line-oriented block passes.
//!
//! The fence-free text is split into lines, each pass claims the lines it
//! recognises, and whatever is still unclaimed at the end becomes paragraphs.

use once_cell::sync::Lazy;
use regex::Regex;

use super::fences::PlaceholderKey;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum Block {
    Line(String),
    Blank,
    Placeholder(PlaceholderKey),
    Heading { level: u8, text: String },
    List { ordered: bool, items: Vec<String> },
    Quote(Vec<String>),
    Rule,
    Paragraph(String),
}

type BlockPass = fn(Vec<Block>) -> Vec<Block>;

/// Block passes in application order. Earlier passes win: a line claimed
/// by one pass is no longer a [`Block::Line`] for the ones after it.
pub(super) const BLOCK_PASSES: &[(&str, BlockPass)] = &[
    ("headings", headings),
    ("unordered_lists", unordered_lists),
    ("ordered_lists", ordered_lists),
    ("blockquotes", blockquotes),
    ("rules", rules),
    ("paragraphs", paragraphs),
];

static HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s{0,3}(#{1,3})\s+(.*?)(?:\s+#+)?\s*$").expect("heading regex"));
static UNORDERED_ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*[-*+]\s+(.*)$").expect("unordered item regex"));
static ORDERED_ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\d{1,9}[.)]\s+(.*)$").expect("ordered item regex"));
static QUOTE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s{0,3}>\s?(.*)$").expect("quote regex"));
static RULE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s{0,3}(?:-{3,}|\*{3,}|_{3,})\s*$").expect("rule regex"));

pub(super) fn parse(text: &str) -> Vec<Block> {
    let lines = text
        .split('\n')
        .map(|line| {
            if line.trim().is_empty() {
                Block::Blank
            } else if let Some(key) = PlaceholderKey::parse_line(line) {
                Block::Placeholder(key)
            } else {
                Block::Line(line.to_string())
            }
        })
        .collect();

    BLOCK_PASSES
        .iter()
        .fold(lines, |blocks, (_, pass)| pass(blocks))
}

fn headings(blocks: Vec<Block>) -> Vec<Block> {
    blocks
        .into_iter()
        .map(|block| match block {
            Block::Line(line) => match HEADING.captures(&line) {
                Some(caps) => Block::Heading {
                    level: caps[1].len() as u8,
                    text: caps[2].to_string(),
                },
                None => Block::Line(line),
            },
            other => other,
        })
        .collect()
}

fn list_pass(blocks: Vec<Block>, pattern: &Regex, ordered: bool) -> Vec<Block> {
    let mut output: Vec<Block> = Vec::with_capacity(blocks.len());
    for block in blocks {
        let item = match &block {
            Block::Line(line) => pattern.captures(line).map(|caps| caps[1].to_string()),
            _ => None,
        };
        let Some(item) = item else {
            output.push(block);
            continue;
        };
        match output.last_mut() {
            Some(Block::List {
                ordered: previous,
                items,
            }) if *previous == ordered => items.push(item),
            _ => output.push(Block::List {
                ordered,
                items: vec![item],
            }),
        }
    }
    output
}

fn unordered_lists(blocks: Vec<Block>) -> Vec<Block> {
    list_pass(blocks, &UNORDERED_ITEM, false)
}

fn ordered_lists(blocks: Vec<Block>) -> Vec<Block> {
    list_pass(blocks, &ORDERED_ITEM, true)
}

fn blockquotes(blocks: Vec<Block>) -> Vec<Block> {
    let mut output: Vec<Block> = Vec::with_capacity(blocks.len());
    for block in blocks {
        let quoted = match &block {
            Block::Line(line) => QUOTE_LINE.captures(line).map(|caps| caps[1].to_string()),
            _ => None,
        };
        match (quoted, output.last_mut()) {
            (Some(line), Some(Block::Quote(lines))) => lines.push(line),
            (Some(line), _) => output.push(Block::Quote(vec![line])),
            (None, _) => output.push(block),
        }
    }
    output
}

fn rules(blocks: Vec<Block>) -> Vec<Block> {
    blocks
        .into_iter()
        .map(|block| match block {
            Block::Line(line) if RULE.is_match(&line) => Block::Rule,
            other => other,
        })
        .collect()
}

fn paragraphs(blocks: Vec<Block>) -> Vec<Block> {
    let mut output: Vec<Block> = Vec::with_capacity(blocks.len());
    let mut pending: Vec<String> = Vec::new();

    fn flush(pending: &mut Vec<String>, output: &mut Vec<Block>) {
        if !pending.is_empty() {
            output.push(Block::Paragraph(pending.join("\n").trim().to_string()));
            pending.clear();
        }
    }

    for block in blocks {
        match block {
            Block::Line(line) => pending.push(line),
            Block::Blank => flush(&mut pending, &mut output),
            other => {
                flush(&mut pending, &mut output);
                output.push(other);
            }
        }
    }
    flush(&mut pending, &mut output);
    output
}
