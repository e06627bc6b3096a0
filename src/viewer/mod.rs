//! Terminal PDF viewer with Kitty Graphics Protocol
//!
//! Layout:
//!   rows 0..term_rows-1 : page area (one rendered page, panned and centered)
//!   row term_rows-1     : status bar
//!
//! Frames arrive from the render worker through `Session::pump`. Each frame
//! is uploaded under the image ID not currently on screen; the previous image
//! is deleted only after the new one is placed, so navigation never shows a
//! blank page area.
//!
//! Kitty response suppression:
//!   All Kitty Graphics Protocol commands use `q=2` (suppress all responses).
//!   Without this, error responses are delivered as APC sequences that
//!   crossterm misparses as key events. The viewer never reads Kitty
//!   responses, so this is always safe.

mod input;
mod state;
mod terminal;

use crossterm::{
    event::{self, Event, KeyEventKind},
    terminal as crossterm_terminal,
};
use log::{debug, info, warn};
use std::time::Duration;

use crate::config::Config;
use crate::controller::{Controller, Phase, ViewerError, ViewerState};
use crate::pdfium::PdfiumBackend;
use crate::session::Session;
use crate::source::ViewRequest;
use crate::surface::Frame;
use crate::watch::DocumentWatcher;

use input::{Action, InputAccumulator, map_key_event};
use state::{Layout, Screen};
use terminal::StatusLine;

/// Poll interval while nothing is in flight.
const IDLE_POLL: Duration = Duration::from_millis(200);

/// Run the terminal viewer until the user quits.
///
/// `watch` reloads the document when a local source changes on disk.
pub fn run(request: ViewRequest, config: Config, watch: bool) -> anyhow::Result<()> {
    terminal::check_tty()?;

    let title = request.title();
    let external = request.source.external_target().to_string();

    let winsize = crossterm_terminal::window_size()
        .map_err(|e| anyhow::anyhow!("failed to get terminal size: {e}"))?;
    if winsize.width == 0 || winsize.height == 0 {
        anyhow::bail!(
            "terminal pixel size {}x{} is zero; Kitty graphics requires non-zero pixel dimensions",
            winsize.width,
            winsize.height
        );
    }
    let mut layout = state::compute_layout(winsize.columns, winsize.rows, winsize.width, winsize.height);

    let mut watcher = match request.source.local_path() {
        Some(path) if watch => match DocumentWatcher::new(path) {
            Ok(w) => Some(w),
            Err(e) => {
                warn!("watch disabled: {e:#}");
                None
            }
        },
        _ => None,
    };

    let mut session = Session::new(
        PdfiumBackend::new(config.library_path.clone()),
        config.viewer.zoom,
        config.fetch.clone(),
    );

    let mut guard = terminal::RawGuard::enter()?;
    let mut screen = Screen::new();
    let mut acc = InputAccumulator::new();
    // Flash message (e.g. "Saved to ..."), cleared on next keypress
    let mut flash: Option<String> = None;
    let mut last_state: Option<ViewerState> = None;
    let mut dirty = true;

    info!("viewer: opening {}", request.source);
    let frames = session.open(request);
    dirty |= upload_frames(frames, &mut screen)?;

    loop {
        dirty |= upload_frames(session.pump(Duration::ZERO), &mut screen)?;

        if let Some(w) = watcher.as_mut()
            && w.poll_changed()
        {
            info!("viewer: source changed on disk, reloading");
            flash = Some("reloaded".into());
            dirty = true;
            dirty |= upload_frames(session.apply(Controller::reload), &mut screen)?;
        }

        let snapshot = session.controller().state();
        if dirty || last_state.as_ref() != Some(&snapshot) {
            redraw(&session, &mut screen, &layout, &title, acc.peek(), flash.as_deref())?;
            last_state = Some(snapshot);
            dirty = false;
        }

        let pending_watch = watcher.as_ref().is_some_and(DocumentWatcher::is_pending);
        let timeout = if session.is_busy() || pending_watch {
            config.viewer.frame_budget
        } else {
            IDLE_POLL
        };
        if !event::poll(timeout)? {
            continue;
        }

        match event::read()? {
            Event::Key(key_event) if key_event.kind != KeyEventKind::Release => {
                debug!("event: {key_event:?}");
                let had_flash = flash.take().is_some();
                dirty |= had_flash;
                let current = session.controller().state().current_page;
                let (scroll_x, scroll_y) = state::scroll_px(&layout, config.viewer.scroll_step);

                let frames = match map_key_event(key_event, &mut acc) {
                    Some(Action::Quit) => break,
                    Some(Action::NextPage(n)) => {
                        session.apply(|c| c.go_to_page(current.saturating_add(n)))
                    }
                    Some(Action::PrevPage(n)) => {
                        session.apply(|c| c.go_to_page(current.saturating_sub(n).max(1)))
                    }
                    Some(Action::FirstPage) => session.apply(Controller::first_page),
                    Some(Action::LastPage) => session.apply(Controller::last_page),
                    Some(Action::GoToPage(n)) => session.apply(|c| c.go_to_page(n)),
                    Some(Action::ZoomIn) => session.apply(Controller::zoom_in),
                    Some(Action::ZoomOut) => session.apply(Controller::zoom_out),
                    Some(Action::ResetZoom) => session.apply(Controller::reset_zoom),
                    Some(Action::ScrollDown(n)) => {
                        screen.scroll(&layout, 0, scroll_y.saturating_mul(n as i64));
                        dirty = true;
                        vec![]
                    }
                    Some(Action::ScrollUp(n)) => {
                        screen.scroll(&layout, 0, -scroll_y.saturating_mul(n as i64));
                        dirty = true;
                        vec![]
                    }
                    Some(Action::ScrollLeft(n)) => {
                        screen.scroll(&layout, -scroll_x.saturating_mul(n as i64), 0);
                        dirty = true;
                        vec![]
                    }
                    Some(Action::ScrollRight(n)) => {
                        screen.scroll(&layout, scroll_x.saturating_mul(n as i64), 0);
                        dirty = true;
                        vec![]
                    }
                    Some(Action::Retry) => {
                        if matches!(session.controller().phase(), Phase::Error(_)) {
                            session.apply(Controller::retry)
                        } else {
                            session.apply(Controller::reload)
                        }
                    }
                    Some(Action::Download) => {
                        flash = Some(match session.save_original(&config.download_dir) {
                            Ok(path) => format!("saved to {}", path.display()),
                            Err(e) => {
                                warn!("download failed: {e:#}");
                                format!("save failed: {e}")
                            }
                        });
                        dirty = true;
                        vec![]
                    }
                    Some(Action::OpenExternal) => {
                        flash = Some(match open::that_detached(&external) {
                            Ok(()) => format!("opened {external}"),
                            Err(e) => {
                                warn!("open {external} failed: {e}");
                                format!("open failed: {e}")
                            }
                        });
                        dirty = true;
                        vec![]
                    }
                    Some(Action::Digit) | Some(Action::CancelInput) => {
                        dirty = true;
                        vec![]
                    }
                    None => {
                        // Unknown key: reset accumulator
                        if acc.is_active() {
                            acc.reset();
                            dirty = true;
                        }
                        vec![]
                    }
                };
                dirty |= upload_frames(frames, &mut screen)?;
            }

            Event::Resize(new_cols, new_rows) => {
                let new_winsize = crossterm_terminal::window_size()?;
                layout = state::compute_layout(new_cols, new_rows, new_winsize.width, new_winsize.height);
                debug!("resize: {new_cols}x{new_rows} cells, {layout:?}");
                terminal::clear_screen()?;
                dirty = true;
            }

            _ => {}
        }
    }

    info!("viewer: closing");
    session.close();
    guard.cleanup();
    Ok(())
}

/// Upload the newest frame (earlier ones in the batch are already stale).
/// Returns true if the screen needs a redraw.
fn upload_frames(frames: Vec<Frame>, screen: &mut Screen) -> anyhow::Result<bool> {
    let Some(frame) = frames.into_iter().last() else {
        return Ok(false);
    };
    let png = match frame.encode_png() {
        Ok(png) => png,
        Err(e) => {
            warn!("page {}: {e:#}", frame.page);
            return Ok(false);
        }
    };
    let image_id = screen.next_image_id();
    terminal::send_image(&png, image_id)?;
    debug!(
        "viewer: uploaded page {} at {:.2} as image {image_id} ({} bytes PNG)",
        frame.page,
        frame.scale,
        png.len()
    );
    screen.commit(&frame, image_id);
    Ok(true)
}

fn redraw(
    session: &Session,
    screen: &mut Screen,
    layout: &Layout,
    title: &str,
    acc_peek: Option<u32>,
    flash: Option<&str>,
) -> anyhow::Result<()> {
    let controller = session.controller();
    terminal::clear_screen()?;

    match controller.phase() {
        Phase::Error(ViewerError::Load(e)) => {
            for id in screen.clear() {
                terminal::delete_image(id)?;
            }
            terminal::draw_error_screen(layout, title, &e.to_string())?;
        }
        Phase::Idle | Phase::Closed => {
            for id in screen.clear() {
                terminal::delete_image(id)?;
            }
        }
        _ => match screen.shown.as_ref().copied() {
            Some(shown) => {
                let p = state::placement(layout, shown.width, shown.height, screen.pan);
                terminal::delete_placements()?;
                terminal::place_image(shown.image_id, layout, &p)?;
                if let Some(old) = screen.take_retired() {
                    terminal::delete_image(old)?;
                }
            }
            None if controller.phase() == &Phase::Loading => {
                terminal::draw_message(layout, &format!("Loading {title}…"))?;
            }
            None if controller.total_pages() == 0 && controller.document().is_some() => {
                terminal::draw_message(layout, "(document has no pages)")?;
            }
            None => {}
        },
    }

    let line = StatusLine {
        title,
        acc_peek,
        flash,
    };
    terminal::draw_status_bar(layout, &controller.state(), &line)?;
    Ok(())
}
