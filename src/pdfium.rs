//! PDFium-backed document implementation.
//!
//! The library binding is created once per process and shared by every
//! document opened afterwards.

use std::path::{Path, PathBuf};

use log::{debug, info};
use once_cell::sync::OnceCell;
use pdfium_render::prelude::*;

use crate::document::{Backend, Document, PageSize};
use crate::error::{LoadError, RenderError};
use crate::surface::{Surface, checked_viewport};

static PDFIUM: OnceCell<Pdfium> = OnceCell::new();

/// Bind the PDFium library, or return the binding made by an earlier call.
///
/// Search order:
/// 1. `library_dir` (config `library_path` / `--pdfium`)
/// 2. Executable's directory
/// 3. Current working directory
/// 4. System library paths
///
/// Only the first successful call's `library_dir` matters.
pub fn init(library_dir: Option<&Path>) -> Result<&'static Pdfium, LoadError> {
    PDFIUM.get_or_try_init(|| {
        let bindings = bind(library_dir)?;
        info!("pdfium: library bound");
        Ok(Pdfium::new(bindings))
    })
}

fn search_dirs(library_dir: Option<&Path>) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Some(dir) = library_dir {
        dirs.push(dir.to_path_buf());
    }
    if let Some(dir) = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
    {
        dirs.push(dir);
    }
    dirs.push(PathBuf::from("./"));
    dirs
}

fn bind(library_dir: Option<&Path>) -> Result<Box<dyn PdfiumLibraryBindings>, LoadError> {
    for dir in search_dirs(library_dir) {
        let path = Pdfium::pdfium_platform_library_name_at_path(&dir);
        match Pdfium::bind_to_library(&path) {
            Ok(bindings) => {
                debug!("pdfium: bound {}", path.display());
                return Ok(bindings);
            }
            Err(e) => debug!("pdfium: {} not usable: {e}", path.display()),
        }
    }
    Pdfium::bind_to_system_library().map_err(|e| {
        LoadError::Library(format!(
            "{e} (set library_path in config.toml or pass --pdfium <dir>; \
             prebuilt libraries: https://github.com/bblanchon/pdfium-binaries)"
        ))
    })
}

/// Opens documents through the process-wide PDFium binding.
pub struct PdfiumBackend {
    library_dir: Option<PathBuf>,
}

impl PdfiumBackend {
    pub fn new(library_dir: Option<PathBuf>) -> Self {
        Self { library_dir }
    }
}

impl Backend for PdfiumBackend {
    type Document = PdfiumDocument;

    fn open(&self, bytes: Vec<u8>) -> Result<PdfiumDocument, LoadError> {
        let pdfium = init(self.library_dir.as_deref())?;
        let len = bytes.len();
        let inner = pdfium
            .load_pdf_from_byte_vec(bytes, None)
            .map_err(|e| LoadError::Parse(e.to_string()))?;
        let sizes = inner
            .pages()
            .iter()
            .map(|page| PageSize {
                width: page.width().value,
                height: page.height().value,
            })
            .collect::<Vec<_>>();
        debug!("pdfium: opened {len} bytes, {} pages", sizes.len());
        Ok(PdfiumDocument { inner, sizes })
    }
}

/// A document held open by PDFium.
pub struct PdfiumDocument {
    inner: PdfDocument<'static>,
    sizes: Vec<PageSize>,
}

impl Document for PdfiumDocument {
    fn page_count(&self) -> u32 {
        self.sizes.len() as u32
    }

    fn page_size(&self, page: u32) -> Option<PageSize> {
        let idx = (page as usize).checked_sub(1)?;
        self.sizes.get(idx).copied()
    }

    fn render_page(&self, page: u32, scale: f32, target: &mut Surface) -> Result<(), RenderError> {
        let size = self.page_size(page).ok_or(RenderError::PageOutOfRange {
            page,
            total: self.page_count(),
        })?;
        let index = u16::try_from(page - 1).map_err(|_| RenderError::PageOutOfRange {
            page,
            total: self.page_count(),
        })?;
        let (width, height) = checked_viewport(size, scale, page)?;
        let backend_err = |reason: String| RenderError::Backend { page, reason };

        let pdf_page = self
            .inner
            .pages()
            .get(index)
            .map_err(|e| backend_err(e.to_string()))?;

        let config = PdfRenderConfig::new()
            .set_target_width(width as i32)
            .set_target_height(height as i32);
        let bitmap = pdf_page
            .render_with_config(&config)
            .map_err(|e| backend_err(e.to_string()))?;

        target.prepare(width, height);
        let rgba = bitmap.as_rgba_bytes();
        target.blit_rgba(&rgba, bitmap.width() as u32, bitmap.height() as u32);
        Ok(())
    }
}
