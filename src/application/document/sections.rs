//! Rich-text sections of a project record, transformed field by field.

use std::collections::BTreeMap;

use crate::application::content::{FragmentSequence, diagram_markdown, transform};
use crate::domain::project::ProjectExportRecord;
use crate::domain::types::SectionName;

/// A labelled, transformed rich-text field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentPart {
    pub label: Option<String>,
    pub body: FragmentSequence,
}

/// One entry inside a section: a requirement, a story, a workflow, ...
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentItem {
    pub title: String,
    pub badges: Vec<String>,
    pub parts: Vec<ContentPart>,
}

impl ContentItem {
    fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            badges: Vec::new(),
            parts: Vec::new(),
        }
    }

    fn part(mut self, label: Option<&str>, raw: &str) -> Self {
        if !raw.trim().is_empty() {
            self.parts.push(ContentPart {
                label: label.map(str::to_string),
                body: transform(raw),
            });
        }
        self
    }

    fn diagram(mut self, label: &str, raw: &str) -> Self {
        if !raw.trim().is_empty() {
            self.parts.push(ContentPart {
                label: Some(label.to_string()),
                body: transform(&diagram_markdown(raw)),
            });
        }
        self
    }

    pub fn diagram_count(&self) -> usize {
        self.parts.iter().map(|part| part.body.diagram_count()).sum()
    }

    pub fn diagram_error_count(&self) -> usize {
        self.parts
            .iter()
            .map(|part| part.body.diagram_error_count())
            .sum()
    }
}

/// Transformed rich-text sections keyed by section. Only populated
/// sections have an entry.
pub type SectionMap = BTreeMap<SectionName, Vec<ContentItem>>;

/// Run the content transformer over every rich-text field of the record.
///
/// The technology stack and mockups carry no rich text and are read from
/// the record directly by the assembler.
pub fn transform_sections(record: &ProjectExportRecord) -> SectionMap {
    let mut sections = SectionMap::new();

    if !record.requirements.is_empty() {
        let items = record
            .requirements
            .iter()
            .map(|requirement| {
                let mut item =
                    ContentItem::new(&requirement.title).part(None, &requirement.description);
                item.badges = [&requirement.priority, &requirement.category]
                    .into_iter()
                    .flatten()
                    .filter(|badge| !badge.trim().is_empty())
                    .cloned()
                    .collect();
                item
            })
            .collect();
        sections.insert(SectionName::Requirements, items);
    }

    if let Some(architecture) = &record.architecture {
        let mut item = ContentItem::new("Architecture Overview")
            .part(None, architecture.overview.as_deref().unwrap_or_default());
        for (label, source) in architecture.labelled_diagrams() {
            item = item.diagram(label, source);
        }
        for sequence in &architecture.sequence_diagrams {
            item = item.diagram(&sequence.name, &sequence.diagram);
        }
        sections.insert(SectionName::Architecture, vec![item]);
    }

    if !record.user_stories.is_empty() {
        let items = record
            .user_stories
            .iter()
            .map(|story| {
                ContentItem::new(&story.title).part(None, &story.story).part(
                    Some("Acceptance Criteria"),
                    story.acceptance_criteria.as_deref().unwrap_or_default(),
                )
            })
            .collect();
        sections.insert(SectionName::UserStories, items);
    }

    if !record.workflows.is_empty() {
        let items = record
            .workflows
            .iter()
            .map(|workflow| {
                ContentItem::new(&workflow.name)
                    .part(None, &workflow.description)
                    .diagram("Diagram", workflow.diagram.as_deref().unwrap_or_default())
            })
            .collect();
        sections.insert(SectionName::Workflows, items);
    }

    sections
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::project::{
        ArchitectureDocument, NamedDiagram, Project, Requirement, Workflow,
    };

    fn record() -> ProjectExportRecord {
        ProjectExportRecord::bare(Project {
            id: "p1".to_string(),
            name: "Atlas".to_string(),
            description: None,
            owner_id: "u1".to_string(),
        })
    }

    #[test]
    fn absent_sections_have_no_entry() {
        assert!(transform_sections(&record()).is_empty());
    }

    #[test]
    fn architecture_diagrams_are_counted_per_outcome() {
        let mut record = record();
        record.architecture = Some(ArchitectureDocument {
            overview: Some("The **core** idea.".to_string()),
            system_diagram: Some("graph TD\nA-->B".to_string()),
            sequence_diagrams: vec![NamedDiagram {
                name: "Login".to_string(),
                diagram: "sequenceDiagram\nA->>B: hi (".to_string(),
            }],
            ..ArchitectureDocument::default()
        });

        let sections = transform_sections(&record);
        let items = &sections[&SectionName::Architecture];
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].parts.len(), 3);
        assert_eq!(items[0].diagram_count(), 1);
        assert_eq!(items[0].diagram_error_count(), 1);
    }

    #[test]
    fn requirement_badges_skip_blank_values() {
        let mut record = record();
        record.requirements.push(Requirement {
            title: "Sign in".to_string(),
            description: "Users sign in with email.".to_string(),
            priority: Some("high".to_string()),
            category: Some(" ".to_string()),
        });
        record.workflows.push(Workflow {
            name: "Onboarding".to_string(),
            description: String::new(),
            diagram: None,
        });

        let sections = transform_sections(&record);
        assert_eq!(sections[&SectionName::Requirements][0].badges, ["high"]);
        assert!(sections[&SectionName::Workflows][0].parts.is_empty());
    }
}
