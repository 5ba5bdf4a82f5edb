//! Document assembly: cover, table of contents and one page-broken section
//! per populated collection, rendered through an askama template.

mod sections;
mod views;

use askama::Template;
use thiserror::Error;
use time::{OffsetDateTime, UtcOffset, format_description::FormatItem, macros::format_description};
use url::Url;

use crate::application::content::transform;
use crate::domain::error::DomainError;
use crate::domain::project::{MockupContent, ProjectExportRecord};
use crate::domain::types::SectionName;

pub use self::sections::{ContentItem, ContentPart, SectionMap, transform_sections};
use self::views::{
    CONTENT_HEADING_OFFSET, DocumentTemplate, ItemView, MockupView, PartView, SectionView,
    TechCategoryView, TechChoiceView, TocEntryView,
};

/// Fixed height given to inline mockup frames. Frame content cannot be
/// measured from the host document, so this is also the height assumed when
/// fitting them to a page.
pub const MOCKUP_FRAME_HEIGHT_PX: u32 = 1200;

const GENERATED_AT_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute] UTC");

#[derive(Debug, Error)]
pub enum AssembleError {
    #[error("project record is structurally invalid: {0}")]
    InvalidRecord(#[from] DomainError),
    #[error("document template failed to render: {0}")]
    Template(#[from] askama::Error),
}

#[derive(Debug, Clone)]
pub struct AssemblyOptions {
    /// Script URL of the client-side diagram library.
    pub diagram_script_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocEntry {
    pub section: SectionName,
    pub count: usize,
    pub label: String,
}

impl TocEntry {
    fn new(section: SectionName, count: usize) -> Self {
        let noun = if count == 1 { "item" } else { "items" };
        Self {
            section,
            count,
            label: format!("{} ({count} {noun})", section.title()),
        }
    }
}

/// A self-contained renderable document.
#[derive(Debug, Clone)]
pub struct Document {
    pub title: String,
    pub html: String,
    pub toc: Vec<TocEntry>,
    pub diagram_count: usize,
    pub diagram_error_count: usize,
    pub mockup_frame_count: usize,
}

impl Document {
    pub fn has_diagrams(&self) -> bool {
        self.diagram_count > 0
    }
}

pub fn assemble(
    record: &ProjectExportRecord,
    sections: &SectionMap,
    options: &AssemblyOptions,
    generated_at: OffsetDateTime,
) -> Result<Document, AssembleError> {
    if record.project.id.trim().is_empty() {
        return Err(DomainError::validation("project id is blank").into());
    }

    let title = match record.project.name.trim() {
        "" => "Untitled project",
        name => name,
    };

    let mut toc = Vec::new();
    let mut section_views = Vec::new();
    let mut diagram_count = 0;
    let mut diagram_error_count = 0;
    let mut mockup_frame_count = 0;

    for section in SectionName::ALL {
        let mut view = SectionView {
            anchor: section.anchor(),
            title: section.title(),
            items: Vec::new(),
            tech: Vec::new(),
            mockups: Vec::new(),
        };

        let count = match section {
            SectionName::TechStack => {
                view.tech = tech_views(record, &mut diagram_count, &mut diagram_error_count);
                view.tech.iter().map(|category| category.choices.len()).sum()
            }
            SectionName::Mockups => {
                view.mockups = mockup_views(record);
                mockup_frame_count = view
                    .mockups
                    .iter()
                    .filter(|mockup| mockup.frame_srcdoc.is_some())
                    .count();
                view.mockups.len()
            }
            _ => {
                let items = sections.get(&section).map(Vec::as_slice).unwrap_or_default();
                diagram_count += items.iter().map(ContentItem::diagram_count).sum::<usize>();
                diagram_error_count += items
                    .iter()
                    .map(ContentItem::diagram_error_count)
                    .sum::<usize>();
                view.items = items.iter().map(item_view).collect();
                view.items.len()
            }
        };

        if count == 0 {
            continue;
        }
        toc.push(TocEntry::new(section, count));
        section_views.push(view);
    }

    let template = DocumentTemplate {
        title,
        description: record
            .project
            .description
            .as_deref()
            .filter(|description| !description.trim().is_empty()),
        generated_at: generated_at
            .to_offset(UtcOffset::UTC)
            .format(GENERATED_AT_FORMAT)
            .unwrap_or_else(|_| generated_at.to_string()),
        toc: toc
            .iter()
            .map(|entry| TocEntryView {
                anchor: entry.section.anchor(),
                label: entry.label.clone(),
            })
            .collect(),
        sections: section_views,
        has_diagrams: diagram_count > 0,
        diagram_script_url: &options.diagram_script_url,
    };

    Ok(Document {
        title: title.to_string(),
        html: template.render()?,
        toc,
        diagram_count,
        diagram_error_count,
        mockup_frame_count,
    })
}

fn item_view(item: &ContentItem) -> ItemView {
    ItemView {
        title: item.title.clone(),
        badges: item.badges.clone(),
        parts: item
            .parts
            .iter()
            .map(|part| PartView {
                label: part.label.clone(),
                html: part.body.to_html(CONTENT_HEADING_OFFSET),
            })
            .collect(),
    }
}

/// Rationale diagrams are added to the document-wide tallies so the
/// diagram library is requested for them too.
fn tech_views(
    record: &ProjectExportRecord,
    diagram_count: &mut usize,
    diagram_error_count: &mut usize,
) -> Vec<TechCategoryView> {
    let Some(stack) = &record.tech_stack else {
        return Vec::new();
    };
    stack
        .categories()
        .into_iter()
        .filter(|(_, choices)| !choices.is_empty())
        .map(|(label, choices)| TechCategoryView {
            label,
            choices: choices
                .iter()
                .map(|choice| {
                    let rationale = transform(&choice.rationale);
                    *diagram_count += rationale.diagram_count();
                    *diagram_error_count += rationale.diagram_error_count();
                    TechChoiceView {
                        name: choice.name.clone(),
                        rationale_html: rationale.to_html(CONTENT_HEADING_OFFSET),
                    }
                })
                .collect(),
        })
        .collect()
}

fn mockup_views(record: &ProjectExportRecord) -> Vec<MockupView> {
    record
        .mockups
        .iter()
        .map(|mockup| {
            let (frame_srcdoc, image_src) = match mockup.content() {
                MockupContent::Inline(html) => (Some(html.to_string()), None),
                MockupContent::Image(src) => (None, safe_image_src(src).map(str::to_string)),
                MockupContent::Missing => (None, None),
            };
            MockupView {
                name: mockup.name.clone(),
                description: mockup
                    .description
                    .clone()
                    .filter(|description| !description.trim().is_empty()),
                frame_srcdoc,
                image_src,
                frame_height: MOCKUP_FRAME_HEIGHT_PX,
            }
        })
        .collect()
}

/// Image references may be remote, relative, or inline `data:image/` URLs.
fn safe_image_src(src: &str) -> Option<&str> {
    let src = src.trim();
    match Url::parse(src) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Some(src),
            "data" if url.path().starts_with("image/") => Some(src),
            _ => None,
        },
        Err(url::ParseError::RelativeUrlWithoutBase) => Some(src),
        Err(_) => None,
    }
}
