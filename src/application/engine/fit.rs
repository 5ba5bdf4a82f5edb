//! Content-fit scaling: oversized visuals shrink instead of clipping across
//! a page boundary.

use super::target::PageFormat;

const CSS_PX_PER_MM: f64 = 96.0 / 25.4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitPolicy {
    /// Printable page height in CSS pixels.
    pub page_budget_px: f64,
    pub min_scale: f64,
    /// Share of the page budget a shrunk element is scaled to.
    pub fill_ratio: f64,
    /// Height assumed for elements that cannot be measured.
    pub fallback_height_px: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitDecision {
    pub scale: f64,
    pub original_height_px: f64,
}

impl FitDecision {
    pub fn scaled_height_px(&self) -> f64 {
        self.original_height_px * self.scale
    }

    /// Space given back to following content.
    pub fn reclaimed_px(&self) -> f64 {
        self.original_height_px - self.scaled_height_px()
    }

    /// Inline styles anchoring the scale at the top edge and pulling the
    /// following content up over the reclaimed space.
    pub fn styles(&self) -> Vec<(String, String)> {
        vec![
            ("transform".to_string(), format!("scale({:.4})", self.scale)),
            ("transform-origin".to_string(), "top center".to_string()),
            (
                "margin-bottom".to_string(),
                format!("-{:.1}px", self.reclaimed_px()),
            ),
        ]
    }
}

impl FitPolicy {
    pub const DEFAULT_FILL_RATIO: f64 = 0.8;

    pub fn for_page(
        format: PageFormat,
        margin_mm: f64,
        min_scale: f64,
        fallback_height_px: f64,
    ) -> Self {
        let (_, height_mm) = format.size_mm();
        let printable_mm = (height_mm - 2.0 * margin_mm).max(1.0);
        Self {
            page_budget_px: printable_mm * CSS_PX_PER_MM,
            min_scale,
            fill_ratio: Self::DEFAULT_FILL_RATIO,
            fallback_height_px,
        }
    }

    /// `None` when the element already fits or its height is unusable.
    /// A measured height of zero fits; only `None` takes the fallback.
    pub fn decide(&self, measured_height_px: Option<f64>) -> Option<FitDecision> {
        let height = measured_height_px.unwrap_or(self.fallback_height_px);
        if !height.is_finite() || height <= self.page_budget_px {
            return None;
        }
        let scale = (self.page_budget_px * self.fill_ratio / height).max(self.min_scale);
        Some(FitDecision {
            scale,
            original_height_px: height,
        })
    }
}
