//! Backend-independent document interface.
//!
//! The render worker owns one `Backend` and at most one open `Document`.
//! Everything the main thread needs to know about the document travels as
//! a `DocumentInfo`, so documents never have to cross threads.

use crate::error::{LoadError, RenderError};
use crate::surface::Surface;

/// Intrinsic page geometry in PDF points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

/// Summary of an opened document.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentInfo {
    pub page_sizes: Vec<PageSize>,
}

impl DocumentInfo {
    pub fn from_document(doc: &impl Document) -> Self {
        let page_sizes = (1..=doc.page_count())
            .filter_map(|page| doc.page_size(page))
            .collect();
        Self { page_sizes }
    }

    pub fn page_count(&self) -> u32 {
        self.page_sizes.len() as u32
    }

    /// Size of a 1-based page.
    pub fn page_size(&self, page: u32) -> Option<PageSize> {
        let idx = (page as usize).checked_sub(1)?;
        self.page_sizes.get(idx).copied()
    }
}

/// Parses document bytes into a `Document`.
pub trait Backend {
    type Document: Document;

    fn open(&self, bytes: Vec<u8>) -> Result<Self::Document, LoadError>;
}

/// A parsed multi-page document. Pages are 1-based.
pub trait Document {
    fn page_count(&self) -> u32;

    fn page_size(&self, page: u32) -> Option<PageSize>;

    /// Rasterize `page` at `scale` into `target`.
    ///
    /// Implementations resize `target` to `scaled_viewport(page_size, scale)`
    /// with `Surface::prepare` before drawing.
    fn render_page(&self, page: u32, scale: f32, target: &mut Surface) -> Result<(), RenderError>;
}
