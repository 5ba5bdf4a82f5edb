//! Download filenames for exported documents.
//!
//! The project name is slugified with the `slug` crate (runs of
//! non-alphanumeric characters collapse to `-`, everything lower-cased) and
//! suffixed with the export date, e.g. `atlas-crm-2026-10-19.pdf`.

use slug::slugify;
use time::{Date, format_description::FormatItem, macros::format_description};

const DATE_FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");
const FALLBACK_STEM: &str = "project";

/// Build the attachment filename for a project exported on `date`.
pub fn export_filename(project_name: &str, date: Date) -> String {
    let stem = slugify(project_name);
    let stem = if stem.is_empty() {
        FALLBACK_STEM
    } else {
        stem.as_str()
    };
    // Formatting a calendar date with a static description cannot fail.
    let date = date
        .format(DATE_FORMAT)
        .unwrap_or_else(|_| date.to_string());
    format!("{stem}-{date}.pdf")
}
