//! Viewer state machine: page, zoom, load/render lifecycle.
//!
//! Pure logic, no I/O. Every operation returns the `Command`s the runtime
//! must execute; completions come back through `on_loaded` / `on_rendered`.
//!
//! ```text
//! Idle ──open──▶ Loading ──loaded──▶ Rendering ◀──go_to_page/set_scale── Ready
//!                   │                   │  └──────────rendered──────────────▲
//!                   ▼                   ▼
//!              Error(Load)        Error(Render) ──go_to_page/retry──▶ Rendering
//! ```
//!
//! Loads carry a generation and renders carry a token. Both counters only
//! grow, and a completion is committed only if it carries the latest value,
//! so a slow stale result can never replace a newer one on screen.

use log::debug;

use crate::config::ZoomLimits;
use crate::document::DocumentInfo;
use crate::error::{LoadError, RenderError};
use crate::source::{DocumentSource, ViewRequest};
use crate::surface::Frame;

/// Two scales closer than this are the same zoom level.
const SCALE_EPSILON: f32 = 1e-4;

#[derive(Debug, Clone, PartialEq)]
pub enum ViewerError {
    Load(LoadError),
    Render { page: u32, error: RenderError },
}

impl ViewerError {
    pub fn message(&self) -> String {
        match self {
            ViewerError::Load(e) => e.to_string(),
            ViewerError::Render { error, .. } => error.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Phase {
    Idle,
    Loading,
    Ready,
    Rendering,
    Error(ViewerError),
    Closed,
}

/// Work for the runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Fetch and open `source`; report back with `generation`.
    Fetch { generation: u64, source: DocumentSource },
    /// Render `page` at `scale`; report back with `token`.
    Render { token: u64, page: u32, scale: f32 },
    /// Show this frame. It matches the latest render request.
    Present(Frame),
    /// Drop the open document and cancel in-flight loads.
    Unload,
}

/// Snapshot for status display.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewerState {
    pub current_page: u32,
    pub total_pages: u32,
    pub scale: f32,
    pub is_loading: bool,
    pub is_rendering: bool,
    pub error: Option<String>,
}

/// Page and scale of the frame currently on screen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Displayed {
    pub page: u32,
    pub scale: f32,
}

pub struct Controller {
    phase: Phase,
    zoom: ZoomLimits,
    request: Option<ViewRequest>,
    document: Option<DocumentInfo>,
    current_page: u32,
    scale: f32,
    load_generation: u64,
    render_token: u64,
    displayed: Option<Displayed>,
}

impl Controller {
    pub fn new(zoom: ZoomLimits) -> Self {
        Self {
            phase: Phase::Idle,
            zoom,
            request: None,
            document: None,
            current_page: 1,
            scale: zoom.default,
            load_generation: 0,
            render_token: 0,
            displayed: None,
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn request(&self) -> Option<&ViewRequest> {
        self.request.as_ref()
    }

    pub fn document(&self) -> Option<&DocumentInfo> {
        self.document.as_ref()
    }

    pub fn load_generation(&self) -> u64 {
        self.load_generation
    }

    pub fn render_token(&self) -> u64 {
        self.render_token
    }

    pub fn displayed(&self) -> Option<Displayed> {
        self.displayed
    }

    pub fn is_closed(&self) -> bool {
        self.phase == Phase::Closed
    }

    pub fn total_pages(&self) -> u32 {
        self.document.as_ref().map_or(0, DocumentInfo::page_count)
    }

    pub fn state(&self) -> ViewerState {
        ViewerState {
            current_page: self.current_page,
            total_pages: self.total_pages(),
            scale: self.scale,
            is_loading: self.phase == Phase::Loading,
            is_rendering: self.phase == Phase::Rendering,
            error: match &self.phase {
                Phase::Error(e) => Some(e.message()),
                _ => None,
            },
        }
    }

    /// Navigation and zoom are live once a document with pages is open,
    /// including after a failed render.
    fn accepts_navigation(&self) -> bool {
        self.total_pages() > 0
            && matches!(
                self.phase,
                Phase::Ready | Phase::Rendering | Phase::Error(ViewerError::Render { .. })
            )
    }

    // -----------------------------------------------------------------------
    // Loading
    // -----------------------------------------------------------------------

    /// Start loading `request`, abandoning any document or load in progress.
    pub fn open(&mut self, request: ViewRequest) -> Vec<Command> {
        if self.is_closed() {
            return vec![];
        }
        let mut cmds = Vec::new();
        if self.document.is_some() || self.phase == Phase::Loading {
            cmds.push(Command::Unload);
        }
        self.load_generation += 1;
        // Invalidate renders issued against the previous document.
        self.render_token += 1;
        self.document = None;
        self.displayed = None;
        self.current_page = 1;
        self.phase = Phase::Loading;
        debug!(
            "controller: loading {} (generation {})",
            request.source, self.load_generation
        );
        cmds.push(Command::Fetch {
            generation: self.load_generation,
            source: request.source.clone(),
        });
        self.request = Some(request);
        cmds
    }

    pub fn on_loaded(
        &mut self,
        generation: u64,
        result: Result<DocumentInfo, LoadError>,
    ) -> Vec<Command> {
        if generation != self.load_generation || self.phase != Phase::Loading {
            debug!(
                "controller: discarding load result for generation {generation} \
                 (current {}, phase {:?})",
                self.load_generation, self.phase
            );
            return vec![];
        }
        match result {
            Ok(info) => {
                debug!("controller: loaded {} pages", info.page_count());
                let empty = info.page_count() == 0;
                self.document = Some(info);
                self.current_page = 1;
                if empty {
                    self.phase = Phase::Ready;
                    vec![]
                } else {
                    self.issue_render()
                }
            }
            Err(e) => {
                debug!("controller: load failed: {e}");
                self.phase = Phase::Error(ViewerError::Load(e));
                vec![]
            }
        }
    }

    // -----------------------------------------------------------------------
    // Navigation / zoom
    // -----------------------------------------------------------------------

    pub fn go_to_page(&mut self, page: u32) -> Vec<Command> {
        if !self.accepts_navigation() {
            return vec![];
        }
        let total = self.total_pages();
        let clamped = page.clamp(1, total.max(1));
        if clamped != page {
            debug!("controller: page {page} clamped to {clamped} (total {total})");
        }
        if clamped == self.current_page && !self.render_failed() {
            return vec![];
        }
        self.current_page = clamped;
        self.issue_render()
    }

    pub fn next_page(&mut self) -> Vec<Command> {
        self.go_to_page(self.current_page.saturating_add(1))
    }

    pub fn prev_page(&mut self) -> Vec<Command> {
        self.go_to_page(self.current_page.saturating_sub(1))
    }

    pub fn first_page(&mut self) -> Vec<Command> {
        self.go_to_page(1)
    }

    pub fn last_page(&mut self) -> Vec<Command> {
        self.go_to_page(self.total_pages())
    }

    pub fn set_scale(&mut self, scale: f32) -> Vec<Command> {
        if !self.accepts_navigation() {
            return vec![];
        }
        let Some(clamped) = self.zoom.clamp(scale) else {
            debug!("controller: ignoring non-numeric scale");
            return vec![];
        };
        if (clamped - self.scale).abs() < SCALE_EPSILON {
            return vec![];
        }
        debug!("controller: scale {} → {clamped} (requested {scale})", self.scale);
        self.scale = clamped;
        self.issue_render()
    }

    pub fn zoom_in(&mut self) -> Vec<Command> {
        self.set_scale(self.scale + self.zoom.step)
    }

    pub fn zoom_out(&mut self) -> Vec<Command> {
        self.set_scale(self.scale - self.zoom.step)
    }

    pub fn reset_zoom(&mut self) -> Vec<Command> {
        self.set_scale(self.zoom.default)
    }

    fn render_failed(&self) -> bool {
        matches!(self.phase, Phase::Error(ViewerError::Render { .. }))
    }

    fn issue_render(&mut self) -> Vec<Command> {
        self.render_token += 1;
        self.phase = Phase::Rendering;
        debug!(
            "controller: render page {} at {} (token {})",
            self.current_page, self.scale, self.render_token
        );
        vec![Command::Render {
            token: self.render_token,
            page: self.current_page,
            scale: self.scale,
        }]
    }

    pub fn on_rendered(&mut self, token: u64, result: Result<Frame, RenderError>) -> Vec<Command> {
        if token != self.render_token || self.phase != Phase::Rendering {
            debug!(
                "controller: discarding stale render (token {token}, latest {}, phase {:?})",
                self.render_token, self.phase
            );
            return vec![];
        }
        match result {
            Ok(frame) => {
                self.phase = Phase::Ready;
                self.displayed = Some(Displayed {
                    page: frame.page,
                    scale: frame.scale,
                });
                vec![Command::Present(frame)]
            }
            Err(error) => {
                debug!("controller: render failed: {error}");
                self.phase = Phase::Error(ViewerError::Render {
                    page: self.current_page,
                    error,
                });
                vec![]
            }
        }
    }

    // -----------------------------------------------------------------------
    // Recovery / teardown
    // -----------------------------------------------------------------------

    /// Retry whatever failed: the load, or the current page's render.
    pub fn retry(&mut self) -> Vec<Command> {
        match &self.phase {
            Phase::Error(ViewerError::Load(_)) => match self.request.clone() {
                Some(request) => self.open(request),
                None => vec![],
            },
            Phase::Error(ViewerError::Render { .. }) => self.issue_render(),
            _ => vec![],
        }
    }

    /// Re-issue loading for the current request (e.g. the file changed).
    pub fn reload(&mut self) -> Vec<Command> {
        match self.request.clone() {
            Some(request) if !self.is_closed() => self.open(request),
            _ => vec![],
        }
    }

    /// Tear down. Every later call, and every late completion, is a no-op.
    pub fn close(&mut self) -> Vec<Command> {
        if self.is_closed() {
            return vec![];
        }
        debug!("controller: closed");
        self.phase = Phase::Closed;
        self.load_generation += 1;
        self.render_token += 1;
        self.document = None;
        self.displayed = None;
        vec![Command::Unload]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::PageSize;

    const A4: PageSize = PageSize { width: 595.0, height: 842.0 };

    fn request() -> ViewRequest {
        ViewRequest::new(DocumentSource::parse("https://example.invalid/cert.pdf"), None)
    }

    fn info(pages: usize) -> DocumentInfo {
        DocumentInfo {
            page_sizes: vec![A4; pages],
        }
    }

    fn frame(token: u64, page: u32, scale: f32) -> Frame {
        Frame {
            token,
            page,
            scale,
            width: 1,
            height: 1,
            rgba: vec![0xFF; 4],
        }
    }

    fn render_of(cmds: &[Command]) -> (u64, u32, f32) {
        match cmds {
            [Command::Render { token, page, scale }] => (*token, *page, *scale),
            other => panic!("expected a single Render, got {other:?}"),
        }
    }

    /// Controller with an `pages`-page document loaded and page 1 displayed.
    fn ready(pages: usize) -> Controller {
        let mut c = Controller::new(ZoomLimits::default());
        let cmds = c.open(request());
        let generation = match cmds.last() {
            Some(Command::Fetch { generation, .. }) => *generation,
            other => panic!("expected Fetch, got {other:?}"),
        };
        let (token, page, scale) = render_of(&c.on_loaded(generation, Ok(info(pages))));
        let cmds = c.on_rendered(token, Ok(frame(token, page, scale)));
        assert!(matches!(cmds.as_slice(), [Command::Present(_)]));
        assert_eq!(c.phase(), &Phase::Ready);
        c
    }

    #[test]
    fn starts_idle() {
        let c = Controller::new(ZoomLimits::default());
        assert_eq!(c.phase(), &Phase::Idle);
        let s = c.state();
        assert_eq!((s.current_page, s.total_pages, s.scale), (1, 0, 1.0));
    }

    #[test]
    fn navigation_ignored_while_idle_or_loading() {
        let mut c = Controller::new(ZoomLimits::default());
        assert!(c.go_to_page(2).is_empty());
        assert!(c.zoom_in().is_empty());
        c.open(request());
        assert!(c.state().is_loading);
        assert!(c.next_page().is_empty());
        assert!(c.set_scale(2.0).is_empty());
    }

    #[test]
    fn successful_view_of_three_pages() {
        let mut c = Controller::new(ZoomLimits::default());
        let cmds = c.open(request());
        assert!(matches!(cmds.as_slice(), [Command::Fetch { generation: 1, .. }]));
        let (token, page, scale) = render_of(&c.on_loaded(1, Ok(info(3))));
        assert_eq!((page, scale), (1, 1.0));
        assert!(c.state().is_rendering);
        let cmds = c.on_rendered(token, Ok(frame(token, 1, 1.0)));
        assert!(matches!(cmds.as_slice(), [Command::Present(f)] if f.page == 1));
        let s = c.state();
        assert_eq!((s.current_page, s.total_pages), (1, 3));
        assert!(!s.is_loading && !s.is_rendering && s.error.is_none());
        assert_eq!(c.displayed(), Some(Displayed { page: 1, scale: 1.0 }));
    }

    #[test]
    fn load_failure_enters_error() {
        let mut c = Controller::new(ZoomLimits::default());
        c.open(request());
        let err = LoadError::Network {
            url: "https://example.invalid/cert.pdf".into(),
            reason: "connection refused".into(),
        };
        assert!(c.on_loaded(1, Err(err.clone())).is_empty());
        assert_eq!(c.phase(), &Phase::Error(ViewerError::Load(err)));
        assert!(c.state().error.unwrap().contains("connection refused"));
        assert!(c.next_page().is_empty());
    }

    #[test]
    fn retry_after_load_failure_reopens_same_source() {
        let mut c = Controller::new(ZoomLimits::default());
        c.open(request());
        c.on_loaded(1, Err(LoadError::Parse("bad xref".into())));
        let cmds = c.retry();
        match cmds.as_slice() {
            [Command::Fetch { generation: 2, source }] => {
                assert_eq!(source, &request().source);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(c.state().is_loading);
    }

    #[test]
    fn stale_load_result_is_discarded() {
        let mut c = Controller::new(ZoomLimits::default());
        c.open(request());
        c.open(ViewRequest::new(DocumentSource::parse("b.pdf"), None));
        assert!(c.on_loaded(1, Ok(info(9))).is_empty());
        assert!(c.state().is_loading);
        assert_eq!(c.total_pages(), 0);
        render_of(&c.on_loaded(2, Ok(info(2))));
        assert_eq!(c.total_pages(), 2);
    }

    #[test]
    fn new_open_unloads_previous_document_and_resets_page() {
        let mut c = ready(5);
        c.last_page();
        let cmds = c.open(ViewRequest::new(DocumentSource::parse("b.pdf"), None));
        assert!(matches!(cmds.as_slice(), [Command::Unload, Command::Fetch { .. }]));
        assert_eq!(c.state().current_page, 1);
        assert!(c.displayed().is_none());
    }

    #[test]
    fn go_to_page_clamps_into_range() {
        let mut c = ready(4);
        let (_, page, _) = render_of(&c.go_to_page(99));
        assert_eq!(page, 4);
        let (_, page, _) = render_of(&c.go_to_page(0));
        assert_eq!(page, 1);
        for n in [0, 1, 2, 3, 4, 5, 1000, u32::MAX] {
            c.go_to_page(n);
            let s = c.state();
            assert!((1..=s.total_pages).contains(&s.current_page));
        }
    }

    #[test]
    fn go_to_current_page_is_noop() {
        let mut c = ready(3);
        assert!(c.go_to_page(1).is_empty());
        assert!(c.prev_page().is_empty());
        assert_eq!(c.phase(), &Phase::Ready);
    }

    #[test]
    fn set_scale_clamps_into_range() {
        let mut c = ready(1);
        let (_, _, scale) = render_of(&c.set_scale(10.0));
        assert_eq!(scale, 3.0);
        let (_, _, scale) = render_of(&c.set_scale(0.01));
        assert_eq!(scale, 0.5);
        assert!(c.set_scale(f32::NAN).is_empty());
        assert!(c.set_scale(-4.0).is_empty()); // clamps to 0.5, already there
    }

    #[test]
    fn zoom_stops_at_maximum() {
        let mut c = ready(1);
        let mut renders = 0;
        for _ in 0..20 {
            let cmds = c.zoom_in();
            if let [Command::Render { token, page, scale }] = cmds.as_slice() {
                renders += 1;
                c.on_rendered(*token, Ok(frame(*token, *page, *scale)));
            }
        }
        // 1.0 → 3.0 in 0.25 steps
        assert_eq!(renders, 8);
        assert_eq!(c.state().scale, 3.0);
        assert!(c.zoom_in().is_empty());
        assert_eq!(c.displayed(), Some(Displayed { page: 1, scale: 3.0 }));
    }

    #[test]
    fn last_request_wins_regardless_of_completion_order() {
        let mut c = ready(6);
        let (t2, p2, s2) = render_of(&c.go_to_page(2));
        let (t5, p5, s5) = render_of(&c.go_to_page(5));
        // Page 5 finishes first, page 2 (stale) finishes later.
        let cmds = c.on_rendered(t5, Ok(frame(t5, p5, s5)));
        assert!(matches!(cmds.as_slice(), [Command::Present(f)] if f.page == 5));
        assert!(c.on_rendered(t2, Ok(frame(t2, p2, s2))).is_empty());
        assert_eq!(c.displayed().map(|d| d.page), Some(5));
        assert_eq!(c.state().current_page, 5);
    }

    #[test]
    fn stale_render_completing_first_is_not_presented() {
        let mut c = ready(6);
        let (t2, p2, s2) = render_of(&c.go_to_page(2));
        let (t5, p5, s5) = render_of(&c.go_to_page(5));
        assert!(c.on_rendered(t2, Ok(frame(t2, p2, s2))).is_empty());
        assert!(c.state().is_rendering);
        assert_eq!(c.displayed().map(|d| d.page), Some(1));
        let cmds = c.on_rendered(t5, Ok(frame(t5, p5, s5)));
        assert!(matches!(cmds.as_slice(), [Command::Present(f)] if f.page == 5));
    }

    #[test]
    fn rapid_navigation_presents_exactly_one_final_frame() {
        let mut c = ready(3);
        let mut issued = Vec::new();
        for page in [1, 2, 3, 2] {
            if let [Command::Render { token, page, scale }] = c.go_to_page(page).as_slice() {
                issued.push((*token, *page, *scale));
            }
        }
        // Page 1 is already current: only 2, 3, 2 are issued.
        assert_eq!(issued.len(), 3);
        let mut presented = Vec::new();
        for (token, page, scale) in issued.into_iter().rev() {
            for cmd in c.on_rendered(token, Ok(frame(token, page, scale))) {
                if let Command::Present(f) = cmd {
                    presented.push(f.page);
                }
            }
        }
        assert_eq!(presented, vec![2]);
        assert_eq!(c.state().current_page, 2);
    }

    #[test]
    fn render_error_keeps_navigation() {
        let mut c = ready(3);
        let (token, page, _) = render_of(&c.go_to_page(2));
        let err = RenderError::Backend {
            page,
            reason: "corrupt page object".into(),
        };
        assert!(c.on_rendered(token, Err(err)).is_empty());
        assert!(matches!(c.phase(), Phase::Error(ViewerError::Render { page: 2, .. })));
        assert!(c.state().error.is_some());
        assert_eq!(c.displayed().map(|d| d.page), Some(1));
        // Other pages remain reachable.
        let (_, page, _) = render_of(&c.go_to_page(3));
        assert_eq!(page, 3);
    }

    #[test]
    fn retry_after_render_error_rerenders_same_page() {
        let mut c = ready(3);
        let (token, _, _) = render_of(&c.go_to_page(2));
        c.on_rendered(
            token,
            Err(RenderError::Backend {
                page: 2,
                reason: "x".into(),
            }),
        );
        let (retry_token, page, _) = render_of(&c.retry());
        assert_eq!(page, 2);
        assert!(retry_token > token);
        // Going to the failed page again also retries.
        c.on_rendered(retry_token, Err(RenderError::NoDocument));
        let (_, page, _) = render_of(&c.go_to_page(2));
        assert_eq!(page, 2);
    }

    #[test]
    fn close_ignores_late_completions() {
        let mut c = ready(3);
        let (token, page, scale) = render_of(&c.go_to_page(2));
        assert_eq!(c.close(), vec![Command::Unload]);
        assert!(c.on_rendered(token, Ok(frame(token, page, scale))).is_empty());
        assert!(c.on_loaded(1, Ok(info(3))).is_empty());
        assert!(c.go_to_page(3).is_empty());
        assert!(c.open(request()).is_empty());
        assert!(c.retry().is_empty());
        assert!(c.close().is_empty());
        assert_eq!(c.phase(), &Phase::Closed);
    }

    #[test]
    fn close_during_loading() {
        let mut c = Controller::new(ZoomLimits::default());
        c.open(request());
        c.close();
        assert!(c.on_loaded(1, Ok(info(2))).is_empty());
        assert!(c.document().is_none());
    }

    #[test]
    fn empty_document_is_ready_without_render() {
        let mut c = Controller::new(ZoomLimits::default());
        c.open(request());
        assert!(c.on_loaded(1, Ok(info(0))).is_empty());
        assert_eq!(c.phase(), &Phase::Ready);
        let s = c.state();
        assert_eq!((s.current_page, s.total_pages), (1, 0));
        assert!(c.next_page().is_empty());
        assert!(c.zoom_in().is_empty());
    }

    #[test]
    fn scale_survives_reload() {
        let mut c = ready(2);
        c.set_scale(2.0);
        let cmds = c.reload();
        assert!(matches!(cmds.as_slice(), [Command::Unload, Command::Fetch { .. }]));
        let generation = c.load_generation();
        let (_, page, scale) = render_of(&c.on_loaded(generation, Ok(info(2))));
        assert_eq!((page, scale), (1, 2.0));
    }
}
