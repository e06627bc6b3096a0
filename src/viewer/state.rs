//! Screen state: layout, pan offsets, placement geometry, image slots.

use crate::surface::Frame;

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub(super) struct Layout {
    pub image_cols: u16, // page area width (= term_cols)
    pub image_rows: u16, // page area height (= term_rows - 1)
    pub status_row: u16, // status bar row (= term_rows - 1)
    pub cell_w: u16,     // px per cell
    pub cell_h: u16,
}

pub(super) fn compute_layout(term_cols: u16, term_rows: u16, pixel_w: u16, pixel_h: u16) -> Layout {
    let cell_w = if term_cols > 0 { (pixel_w / term_cols).max(1) } else { 1 };
    let cell_h = if term_rows > 0 { (pixel_h / term_rows).max(1) } else { 1 };
    Layout {
        image_cols: term_cols,
        image_rows: term_rows.saturating_sub(1),
        status_row: term_rows.saturating_sub(1),
        cell_w,
        cell_h,
    }
}

impl Layout {
    /// Viewport size in pixels.
    pub(super) fn viewport_px(&self) -> (u32, u32) {
        (
            self.image_cols as u32 * self.cell_w as u32,
            self.image_rows as u32 * self.cell_h as u32,
        )
    }
}

/// Pixels moved by one scroll step of `cells` cells, horizontally and vertically.
pub(super) fn scroll_px(layout: &Layout, cells: u32) -> (i64, i64) {
    (
        cells as i64 * layout.cell_w as i64,
        cells as i64 * layout.cell_h as i64,
    )
}

// ---------------------------------------------------------------------------
// Pan / placement
// ---------------------------------------------------------------------------

/// Scroll offset into the displayed frame, in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(super) struct Pan {
    pub x: u32,
    pub y: u32,
}

pub(super) fn max_pan(layout: &Layout, frame_w: u32, frame_h: u32) -> Pan {
    let (vp_w, vp_h) = layout.viewport_px();
    Pan {
        x: frame_w.saturating_sub(vp_w),
        y: frame_h.saturating_sub(vp_h),
    }
}

impl Pan {
    pub(super) fn clamped(self, max: Pan) -> Pan {
        Pan {
            x: self.x.min(max.x),
            y: self.y.min(max.y),
        }
    }
}

/// Source rectangle and screen position for one Kitty placement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(super) struct Placement {
    pub src_x: u32,
    pub src_y: u32,
    pub src_w: u32,
    pub src_h: u32,
    pub col: u16,
    pub row: u16,
}

/// Visible part of a `frame_w × frame_h` image, centered when it is
/// narrower than the viewport.
pub(super) fn placement(layout: &Layout, frame_w: u32, frame_h: u32, pan: Pan) -> Placement {
    let (vp_w, vp_h) = layout.viewport_px();
    let pan = pan.clamped(max_pan(layout, frame_w, frame_h));
    let src_w = frame_w.saturating_sub(pan.x).min(vp_w);
    let src_h = frame_h.saturating_sub(pan.y).min(vp_h);
    let used_cols = src_w.div_ceil(layout.cell_w as u32) as u16;
    let col = layout.image_cols.saturating_sub(used_cols) / 2;
    Placement {
        src_x: pan.x,
        src_y: pan.y,
        src_w,
        src_h,
        col,
        row: 0,
    }
}

// ---------------------------------------------------------------------------
// Displayed frame bookkeeping
// ---------------------------------------------------------------------------

/// What is on screen: the frame's geometry plus the Kitty image holding it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(super) struct Shown {
    pub page: u32,
    pub scale: f32,
    pub width: u32,
    pub height: u32,
    pub image_id: u32,
}

/// Two alternating Kitty image IDs: the new frame is uploaded under the
/// idle ID while the old one stays placed, then the old one is deleted.
pub(super) struct Screen {
    pub shown: Option<Shown>,
    pub pan: Pan,
    /// Previous image, still on screen until the new one is placed.
    retired: Option<u32>,
}

const IMAGE_IDS: [u32; 2] = [101, 102];

impl Screen {
    pub(super) fn new() -> Self {
        Self {
            shown: None,
            pan: Pan::default(),
            retired: None,
        }
    }

    /// Image ID to upload the next frame under.
    pub(super) fn next_image_id(&self) -> u32 {
        match self.shown {
            Some(s) if s.image_id == IMAGE_IDS[0] => IMAGE_IDS[1],
            _ => IMAGE_IDS[0],
        }
    }

    /// Record that `frame` was uploaded as `image_id`. Pan is kept
    /// proportional on zoom and reset on page change.
    pub(super) fn commit(&mut self, frame: &Frame, image_id: u32) {
        self.pan = match self.shown {
            Some(prev) if prev.page == frame.page && prev.scale > 0.0 => {
                let ratio = frame.scale / prev.scale;
                Pan {
                    x: (self.pan.x as f32 * ratio).round() as u32,
                    y: (self.pan.y as f32 * ratio).round() as u32,
                }
            }
            _ => Pan::default(),
        };
        self.retired = self.shown.map(|s| s.image_id);
        self.shown = Some(Shown {
            page: frame.page,
            scale: frame.scale,
            width: frame.width,
            height: frame.height,
            image_id,
        });
    }

    /// ID of the image replaced by the last commit, once it may be deleted.
    pub(super) fn take_retired(&mut self) -> Option<u32> {
        self.retired.take()
    }

    /// Forget everything (document unloaded or reloaded).
    pub(super) fn clear(&mut self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.shown.take().map(|s| s.image_id).into_iter().collect();
        ids.extend(self.retired.take());
        self.pan = Pan::default();
        ids
    }

    pub(super) fn scroll(&mut self, layout: &Layout, dx: i64, dy: i64) {
        let Some(shown) = self.shown else {
            return;
        };
        let max = max_pan(layout, shown.width, shown.height);
        let apply = |v: u32, d: i64, max: u32| (v as i64).saturating_add(d).clamp(0, max as i64) as u32;
        self.pan = Pan {
            x: apply(self.pan.x, dx, max.x),
            y: apply(self.pan.y, dy, max.y),
        };
    }
}
