use askama::Template;

/// Content headings sit below section (h2), item (h3) and label (h4) levels.
pub(super) const CONTENT_HEADING_OFFSET: u8 = 3;

#[derive(Debug, Clone)]
pub(super) struct PartView {
    pub label: Option<String>,
    pub html: String,
}

#[derive(Debug, Clone)]
pub(super) struct ItemView {
    pub title: String,
    pub badges: Vec<String>,
    pub parts: Vec<PartView>,
}

#[derive(Debug, Clone)]
pub(super) struct TechChoiceView {
    pub name: String,
    pub rationale_html: String,
}

#[derive(Debug, Clone)]
pub(super) struct TechCategoryView {
    pub label: &'static str,
    pub choices: Vec<TechChoiceView>,
}

#[derive(Debug, Clone)]
pub(super) struct MockupView {
    pub name: String,
    pub description: Option<String>,
    pub frame_srcdoc: Option<String>,
    pub image_src: Option<String>,
    pub frame_height: u32,
}

#[derive(Debug, Clone)]
pub(super) struct SectionView {
    pub anchor: &'static str,
    pub title: &'static str,
    pub items: Vec<ItemView>,
    pub tech: Vec<TechCategoryView>,
    pub mockups: Vec<MockupView>,
}

#[derive(Debug, Clone)]
pub(super) struct TocEntryView {
    pub anchor: &'static str,
    pub label: String,
}

#[derive(Template)]
#[template(path = "document.html")]
pub(super) struct DocumentTemplate<'a> {
    pub title: &'a str,
    pub description: Option<&'a str>,
    pub generated_at: String,
    pub toc: Vec<TocEntryView>,
    pub sections: Vec<SectionView>,
    pub has_diagrams: bool,
    pub diagram_script_url: &'a str,
}
