//! Shared domain enumerations.

pub use folio_api_types::ExportStage;

/// Progress checkpoints published by the export pipeline.
///
/// Values only ever grow along the happy path; the error stage keeps whatever
/// percentage the job had reached.
pub mod checkpoints {
    pub const STARTING: u8 = 0;
    pub const FETCHING: u8 = 10;
    pub const TRANSFORMING: u8 = 25;
    pub const ASSEMBLING: u8 = 45;
    pub const LAUNCHING: u8 = 60;
    pub const LOADING: u8 = 70;
    pub const DIAGRAMS: u8 = 75;
    pub const RASTERIZING: u8 = 80;
    pub const FINALIZING: u8 = 90;
    pub const COMPLETED: u8 = 100;
}

/// Top-level document sections, in the order they are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SectionName {
    Requirements,
    Architecture,
    UserStories,
    Workflows,
    TechStack,
    Mockups,
}

impl SectionName {
    pub const ALL: [SectionName; 6] = [
        SectionName::Requirements,
        SectionName::Architecture,
        SectionName::UserStories,
        SectionName::Workflows,
        SectionName::TechStack,
        SectionName::Mockups,
    ];

    pub fn title(self) -> &'static str {
        match self {
            SectionName::Requirements => "Requirements",
            SectionName::Architecture => "Architecture",
            SectionName::UserStories => "User Stories",
            SectionName::Workflows => "Workflows",
            SectionName::TechStack => "Technology Stack",
            SectionName::Mockups => "Mockups",
        }
    }

    /// Anchor id used by the table of contents.
    pub fn anchor(self) -> &'static str {
        match self {
            SectionName::Requirements => "requirements",
            SectionName::Architecture => "architecture",
            SectionName::UserStories => "user-stories",
            SectionName::Workflows => "workflows",
            SectionName::TechStack => "tech-stack",
            SectionName::Mockups => "mockups",
        }
    }
}
