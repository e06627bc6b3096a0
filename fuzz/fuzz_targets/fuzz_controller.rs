#![no_main]

//! Drive the controller with arbitrary operation and completion orderings
//! and check that page, scale, and presentation stay consistent.

use libfuzzer_sys::fuzz_target;

use folio::config::ZoomLimits;
use folio::controller::{Command, Controller};
use folio::document::{DocumentInfo, PageSize};
use folio::error::{LoadError, RenderError};
use folio::source::{DocumentSource, ViewRequest};
use folio::surface::Frame;

fn frame(token: u64, page: u32, scale: f32) -> Frame {
    Frame {
        token,
        page,
        scale,
        width: 1,
        height: 1,
        rgba: vec![0; 4],
    }
}

fuzz_target!(|data: &[u8]| {
    let zoom = ZoomLimits::default();
    let mut c = Controller::new(zoom);
    let mut fetches: Vec<u64> = Vec::new();
    let mut renders: Vec<(u64, u32, f32)> = Vec::new();
    let mut closed = false;

    for pair in data.chunks(2) {
        let op = pair[0] % 12;
        let arg = pair.get(1).copied().unwrap_or(0);

        let cmds = match op {
            0 => c.open(ViewRequest::new(DocumentSource::parse("doc.pdf"), None)),
            1 | 2 if !fetches.is_empty() => {
                let generation = fetches.remove(arg as usize % fetches.len());
                let result = if op == 1 {
                    Ok(DocumentInfo {
                        page_sizes: vec![PageSize { width: 10.0, height: 10.0 }; arg as usize % 6],
                    })
                } else {
                    Err(LoadError::Parse("fuzz".into()))
                };
                c.on_loaded(generation, result)
            }
            3 => c.go_to_page(arg as u32),
            4 => c.set_scale(arg as f32 / 32.0),
            5 => c.zoom_in(),
            6 => c.zoom_out(),
            7 | 8 if !renders.is_empty() => {
                let (token, page, scale) = renders.remove(arg as usize % renders.len());
                let result = if op == 7 {
                    Ok(frame(token, page, scale))
                } else {
                    Err(RenderError::Backend { page, reason: "fuzz".into() })
                };
                c.on_rendered(token, result)
            }
            9 => c.retry(),
            10 => c.reload(),
            11 => {
                closed = true;
                c.close()
            }
            _ => vec![],
        };

        if closed && op != 11 {
            assert!(cmds.is_empty(), "command after close: {cmds:?}");
        }

        let state = c.state();
        for cmd in cmds {
            match cmd {
                Command::Fetch { generation, .. } => fetches.push(generation),
                Command::Render { token, page, scale } => {
                    assert!(page >= 1 && page <= state.total_pages, "render of page {page}");
                    renders.push((token, page, scale));
                }
                Command::Present(f) => {
                    assert_eq!(f.token, c.render_token(), "stale frame presented");
                    assert_eq!(f.page, state.current_page);
                }
                Command::Unload => {}
            }
        }

        assert!(state.scale >= zoom.min && state.scale <= zoom.max, "scale {}", state.scale);
        if state.total_pages > 0 {
            assert!(state.current_page >= 1 && state.current_page <= state.total_pages);
        }
    }
});
