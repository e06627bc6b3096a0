//! Terminal I/O layer: raw mode, Kitty Graphics Protocol, status bar.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use crossterm::{
    ExecutableCommand, QueueableCommand, cursor,
    style::{self, Stylize},
    terminal,
};
use std::io::{self, Write, stdout};

use super::state::{Layout, Placement};
use crate::controller::ViewerState;

const CHUNK_SIZE: usize = 4096;

// ---------------------------------------------------------------------------
// RawGuard: restores raw mode, alternate screen and images on Drop
// ---------------------------------------------------------------------------

pub(super) struct RawGuard {
    cleaned: bool,
}

impl RawGuard {
    pub(super) fn enter() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        stdout().execute(terminal::EnterAlternateScreen)?;
        stdout().execute(cursor::Hide)?;
        Ok(Self { cleaned: false })
    }

    pub(super) fn cleanup(&mut self) {
        if self.cleaned {
            return;
        }
        self.cleaned = true;
        let mut out = stdout();
        let _ = write!(out, "\x1b_Ga=d,d=A,q=2\x1b\\");
        let _ = out.execute(cursor::Show);
        let _ = out.execute(terminal::LeaveAlternateScreen);
        let _ = terminal::disable_raw_mode();
    }
}

impl Drop for RawGuard {
    fn drop(&mut self) {
        self.cleanup();
    }
}

// ---------------------------------------------------------------------------
// Kitty protocol helpers
// ---------------------------------------------------------------------------

/// Upload PNG data in chunks (a=t: transfer only, nothing is displayed).
pub(super) fn send_image(png_data: &[u8], image_id: u32) -> io::Result<()> {
    // base64 output is ASCII, so byte chunks are valid str slices
    let encoded = BASE64.encode(png_data);
    let chunks: Vec<&[u8]> = encoded.as_bytes().chunks(CHUNK_SIZE).collect();

    let mut out = stdout();
    for (i, chunk) in chunks.iter().enumerate() {
        let m = if i + 1 == chunks.len() { 0 } else { 1 };
        if i == 0 {
            write!(out, "\x1b_Ga=t,f=100,i={image_id},t=d,q=2,m={m};")?;
        } else {
            write!(out, "\x1b_Gm={m},q=2;")?;
        }
        out.write_all(chunk)?;
        write!(out, "\x1b\\")?;
    }
    out.flush()
}

/// Delete an image together with its placements.
pub(super) fn delete_image(image_id: u32) -> io::Result<()> {
    let mut out = stdout();
    write!(out, "\x1b_Ga=d,d=I,i={image_id},q=2\x1b\\")?;
    out.flush()
}

/// Remove all placements but keep uploaded image data.
pub(super) fn delete_placements() -> io::Result<()> {
    let mut out = stdout();
    write!(out, "\x1b_Ga=d,d=a,q=2\x1b\\")?;
    out.flush()
}

/// Clear the text layer.
pub(super) fn clear_screen() -> io::Result<()> {
    let mut out = stdout();
    out.queue(terminal::Clear(terminal::ClearType::All))?;
    out.flush()
}

/// Place the visible part of `image_id` at the top of the page area.
pub(super) fn place_image(image_id: u32, layout: &Layout, p: &Placement) -> io::Result<()> {
    if p.src_w == 0 || p.src_h == 0 {
        return Ok(());
    }
    let cols = p.src_w.div_ceil(layout.cell_w as u32).min(layout.image_cols as u32);
    let rows = p.src_h.div_ceil(layout.cell_h as u32).min(layout.image_rows as u32);
    let mut out = stdout();
    out.queue(cursor::MoveTo(p.col, p.row))?;
    write!(
        out,
        "\x1b_Ga=p,i={image_id},x={x},y={y},w={w},h={h},c={cols},r={rows},C=1,q=2\x1b\\",
        x = p.src_x,
        y = p.src_y,
        w = p.src_w,
        h = p.src_h,
    )?;
    out.flush()
}

// ---------------------------------------------------------------------------
// Text
// ---------------------------------------------------------------------------

/// Everything the status bar shows besides the controller state.
pub(super) struct StatusLine<'a> {
    pub title: &'a str,
    pub acc_peek: Option<u32>,
    pub flash: Option<&'a str>,
}

/// Compose the status bar text (without padding).
pub(super) fn status_text(state: &ViewerState, line: &StatusLine<'_>) -> String {
    let mut parts = vec![format!(" {}", line.title)];
    if state.total_pages > 0 {
        parts.push(format!("page {}/{}", state.current_page, state.total_pages));
    }
    parts.push(format!("{:.0}%", state.scale * 100.0));
    if state.is_loading {
        parts.push("loading…".into());
    } else if state.is_rendering {
        parts.push("rendering…".into());
    }
    if let Some(err) = &state.error {
        parts.push(format!("error: {err}"));
    }
    if let Some(msg) = line.flash {
        parts.push(msg.to_string());
    } else if let Some(n) = line.acc_peek {
        parts.push(format!(":{n}_"));
    } else {
        parts.push("[n/p:page Ng:goto +/-:zoom j/k:scroll s:save o:open q:quit]".into());
    }
    parts.join(" | ")
}

/// Draw the status bar on the last terminal row.
pub(super) fn draw_status_bar(layout: &Layout, state: &ViewerState, line: &StatusLine<'_>) -> io::Result<()> {
    let mut out = stdout();
    out.queue(cursor::MoveTo(0, layout.status_row))?;
    let width = layout.image_cols as usize;
    let text: String = status_text(state, line).chars().take(width).collect();
    let padded = format!("{text:<width$}");
    write!(out, "{}", padded.on_dark_grey().white())?;
    out.queue(style::ResetColor)?;
    out.flush()
}

/// Centered one-line message in the page area (e.g. while loading).
pub(super) fn draw_message(layout: &Layout, msg: &str) -> io::Result<()> {
    let mut out = stdout();
    let row = layout.image_rows / 2;
    let len = msg.chars().count() as u16;
    let col = layout.image_cols.saturating_sub(len) / 2;
    out.queue(cursor::MoveTo(col, row))?;
    write!(out, "{msg}")?;
    out.flush()
}

fn error_screen_lines(title: &str, message: &str) -> [String; 4] {
    [
        format!("Could not open {title}"),
        message.to_string(),
        String::new(),
        "r: retry   s: save   o: open externally   q: quit".to_string(),
    ]
}

/// Full-screen load failure with recovery hints.
pub(super) fn draw_error_screen(layout: &Layout, title: &str, message: &str) -> io::Result<()> {
    let mut out = stdout();
    let lines = error_screen_lines(title, message);
    let top = (layout.image_rows / 2).saturating_sub(lines.len() as u16 / 2);
    for (i, line) in lines.iter().enumerate() {
        let text: String = line.chars().take(layout.image_cols as usize).collect();
        let col = layout.image_cols.saturating_sub(text.chars().count() as u16) / 2;
        out.queue(cursor::MoveTo(col, top + i as u16))?;
        if i == 0 {
            write!(out, "{}", text.red().bold())?;
        } else {
            write!(out, "{text}")?;
        }
    }
    out.queue(style::ResetColor)?;
    out.flush()
}

pub(super) fn check_tty() -> anyhow::Result<()> {
    use std::io::IsTerminal;
    // Only stdout matters. crossterm's `use-dev-tty` reads keyboard from /dev/tty
    // (Unix) or Console API (Windows), so stdin being a pipe is always fine.
    if !io::stdout().is_terminal() {
        anyhow::bail!(
            "folio viewer requires an interactive terminal.\n\
             \n\
             Supported terminals: Kitty, Ghostty, WezTerm\n\
             To render to a file, use: folio render <input.pdf> -o output.png"
        );
    }
    Ok(())
}
