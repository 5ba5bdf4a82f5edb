//! The project export record consumed by the export pipeline.
//!
//! Records are produced by the project management layer and are read-only
//! here. Every collection is optional in the sense that an empty list or a
//! missing document simply drops the corresponding section from the export.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub owner_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedDiagram {
    pub name: String,
    pub diagram: String,
}

/// Architecture notes plus the diagrams attached to them.
///
/// Diagram fields hold either bare diagram source or markdown containing
/// diagram fences.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchitectureDocument {
    pub overview: Option<String>,
    pub system_diagram: Option<String>,
    pub data_flow_diagram: Option<String>,
    pub deployment_diagram: Option<String>,
    pub component_diagram: Option<String>,
    pub sequence_diagrams: Vec<NamedDiagram>,
}

impl ArchitectureDocument {
    /// Labelled diagram fields in layout order, skipping blank ones.
    pub fn labelled_diagrams(&self) -> Vec<(&'static str, &str)> {
        [
            ("System Diagram", self.system_diagram.as_deref()),
            ("Data Flow", self.data_flow_diagram.as_deref()),
            ("Deployment", self.deployment_diagram.as_deref()),
            ("Components", self.component_diagram.as_deref()),
        ]
        .into_iter()
        .filter_map(|(label, value)| {
            value
                .filter(|source| !source.trim().is_empty())
                .map(|source| (label, source))
        })
        .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workflow {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub diagram: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStory {
    pub title: String,
    #[serde(default)]
    pub story: String,
    #[serde(default)]
    pub acceptance_criteria: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TechChoice {
    pub name: String,
    #[serde(default)]
    pub rationale: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TechStack {
    pub frontend: Vec<TechChoice>,
    pub backend: Vec<TechChoice>,
    pub database: Vec<TechChoice>,
    pub infrastructure: Vec<TechChoice>,
    pub tooling: Vec<TechChoice>,
}

impl TechStack {
    pub fn categories(&self) -> [(&'static str, &[TechChoice]); 5] {
        [
            ("Frontend", &self.frontend),
            ("Backend", &self.backend),
            ("Database", &self.database),
            ("Infrastructure", &self.infrastructure),
            ("Tooling", &self.tooling),
        ]
    }

    pub fn choice_count(&self) -> usize {
        self.categories()
            .iter()
            .map(|(_, choices)| choices.len())
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mockup {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Self-contained markup, scripts included.
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// How a mockup ends up in the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockupContent<'a> {
    Inline(&'a str),
    Image(&'a str),
    Missing,
}

impl Mockup {
    /// Inline markup wins over an image reference.
    pub fn content(&self) -> MockupContent<'_> {
        if let Some(html) = self.html.as_deref().filter(|html| !html.trim().is_empty()) {
            return MockupContent::Inline(html);
        }
        if let Some(url) = self.image_url.as_deref().filter(|url| !url.trim().is_empty()) {
            return MockupContent::Image(url);
        }
        MockupContent::Missing
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectExportRecord {
    pub project: Project,
    #[serde(default)]
    pub requirements: Vec<Requirement>,
    #[serde(default)]
    pub architecture: Option<ArchitectureDocument>,
    #[serde(default)]
    pub workflows: Vec<Workflow>,
    #[serde(default)]
    pub user_stories: Vec<UserStory>,
    #[serde(default)]
    pub tech_stack: Option<TechStack>,
    #[serde(default)]
    pub mockups: Vec<Mockup>,
}

impl ProjectExportRecord {
    /// A record with no optional sections.
    pub fn bare(project: Project) -> Self {
        Self {
            project,
            requirements: Vec::new(),
            architecture: None,
            workflows: Vec::new(),
            user_stories: Vec::new(),
            tech_stack: None,
            mockups: Vec::new(),
        }
    }
}
