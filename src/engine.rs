//! Render worker: owns the backend, the open document, and the surface.
//!
//! Requests arrive over an `mpsc` channel. Before doing any work the worker
//! drains everything queued and drops requests that a later one makes
//! pointless (latest-wins), so a burst of page flips renders once.
//! Replies go to the session's event channel; the controller still checks
//! tokens, since a reply can already be in flight when a newer request is
//! issued.

use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use log::{debug, error};

use crate::document::{Backend, Document, DocumentInfo};
use crate::error::RenderError;
use crate::session::Event;
use crate::surface::{Surface, checked_viewport};

#[derive(Debug)]
pub(crate) enum Request {
    Open { generation: u64, bytes: Vec<u8> },
    Render { token: u64, page: u32, scale: f32 },
    Unload,
    Shutdown,
}

/// Handle to the render worker thread. Dropping it shuts the worker down.
pub struct Engine {
    tx: mpsc::Sender<Request>,
    handle: Option<JoinHandle<()>>,
}

impl Engine {
    pub fn spawn<B>(backend: B, events: mpsc::Sender<Event>) -> Self
    where
        B: Backend + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let handle = thread::spawn(move || worker(backend, rx, events));
        Self {
            tx,
            handle: Some(handle),
        }
    }

    pub fn open(&self, generation: u64, bytes: Vec<u8>) {
        self.send(Request::Open { generation, bytes });
    }

    pub fn render(&self, token: u64, page: u32, scale: f32) {
        self.send(Request::Render { token, page, scale });
    }

    pub fn unload(&self) {
        self.send(Request::Unload);
    }

    fn send(&self, request: Request) {
        if self.tx.send(request).is_err() {
            error!("engine: worker is gone, request dropped");
        }
    }

    /// Stop the worker and wait for it. A render in progress finishes first;
    /// its reply goes nowhere if the session is already gone.
    pub fn shutdown(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let _ = self.tx.send(Request::Shutdown);
        if handle.join().is_err() {
            error!("engine: worker panicked");
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker<B: Backend>(backend: B, rx: mpsc::Receiver<Request>, events: mpsc::Sender<Event>) {
    debug!("engine: worker started");
    let mut document: Option<B::Document> = None;
    let mut surface = Surface::new();

    while let Ok(first) = rx.recv() {
        let mut batch = vec![first];
        batch.extend(rx.try_iter());
        let received = batch.len();
        let Some(batch) = coalesce(batch) else {
            break;
        };
        if batch.len() < received {
            debug!("engine: coalesced {received} requests into {}", batch.len());
        }

        for request in batch {
            match request {
                Request::Open { generation, bytes } => {
                    document = None;
                    let start = Instant::now();
                    let result = backend.open(bytes).map(|doc| {
                        let info = DocumentInfo::from_document(&doc);
                        document = Some(doc);
                        info
                    });
                    debug!(
                        "engine: open generation {generation} {} in {:.1}ms",
                        if result.is_ok() { "ok" } else { "failed" },
                        start.elapsed().as_secs_f64() * 1000.0
                    );
                    if events.send(Event::Opened { generation, result }).is_err() {
                        return;
                    }
                }
                Request::Render { token, page, scale } => {
                    let start = Instant::now();
                    let result = match &document {
                        Some(doc) => render(doc, page, scale, &mut surface)
                            .map(|()| surface.snapshot(token, page, scale)),
                        None => Err(RenderError::NoDocument),
                    };
                    debug!(
                        "engine: render token {token} page {page} at {scale} {} in {:.1}ms",
                        if result.is_ok() { "ok" } else { "failed" },
                        start.elapsed().as_secs_f64() * 1000.0
                    );
                    if events.send(Event::Rendered { token, result }).is_err() {
                        return;
                    }
                }
                Request::Unload => {
                    if document.take().is_some() {
                        debug!("engine: document unloaded");
                    }
                }
                // coalesce() ends the loop before a batch with Shutdown gets here
                Request::Shutdown => {}
            }
        }
    }
    debug!("engine: worker exiting");
}

fn render<D: Document>(doc: &D, page: u32, scale: f32, surface: &mut Surface) -> Result<(), RenderError> {
    let total = doc.page_count();
    if page == 0 || page > total {
        return Err(RenderError::PageOutOfRange { page, total });
    }
    if let Some(size) = doc.page_size(page) {
        checked_viewport(size, scale, page)?;
    }
    doc.render_page(page, scale, surface)
}

/// Drop requests made pointless by later ones in the same batch.
///
/// - a `Render` followed by another `Render`, `Open`, or `Unload` is dropped
/// - an `Open` followed by another `Open` or `Unload` is dropped
/// - `Unload` is always kept
///
/// Returns `None` if the batch contains `Shutdown`.
fn coalesce(batch: Vec<Request>) -> Option<Vec<Request>> {
    if batch.iter().any(|r| matches!(r, Request::Shutdown)) {
        return None;
    }
    let mut seen_render = false;
    let mut seen_doc_change = false;
    let mut kept: Vec<Request> = Vec::with_capacity(batch.len());
    for request in batch.into_iter().rev() {
        let keep = match &request {
            Request::Render { .. } => !seen_render && !seen_doc_change,
            Request::Open { .. } => !seen_doc_change,
            Request::Unload | Request::Shutdown => true,
        };
        match &request {
            Request::Render { .. } => seen_render = true,
            Request::Open { .. } | Request::Unload => seen_doc_change = true,
            Request::Shutdown => {}
        }
        if keep {
            kept.push(request);
        }
    }
    kept.reverse();
    Some(kept)
}
