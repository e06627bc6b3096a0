//! Runtime glue between the controller and the worker threads.
//!
//! A `Session` executes the controller's commands (spawning fetches,
//! driving the render engine), and feeds completions back into the
//! controller. All completions arrive on one `mpsc` channel that the
//! caller drains from its own event loop with `pump()`.

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

use log::{debug, info};

use crate::cancel::CancelToken;
use crate::config::{FetchOptions, ZoomLimits};
use crate::controller::{Command, Controller};
use crate::document::{Backend, DocumentInfo};
use crate::engine::Engine;
use crate::error::{LoadError, RenderError};
use crate::fetch::spawn_fetch;
use crate::source::ViewRequest;
use crate::surface::Frame;

/// Completion reported by a background thread.
#[derive(Debug)]
pub enum Event {
    Fetched {
        generation: u64,
        result: Result<Vec<u8>, LoadError>,
    },
    Opened {
        generation: u64,
        result: Result<DocumentInfo, LoadError>,
    },
    Rendered {
        token: u64,
        result: Result<Frame, RenderError>,
    },
}

pub struct Session {
    controller: Controller,
    engine: Engine,
    tx: mpsc::Sender<Event>,
    rx: mpsc::Receiver<Event>,
    fetch_options: FetchOptions,
    fetch_cancel: Option<CancelToken>,
    /// Original bytes of the loaded document, kept for download.
    original: Option<Vec<u8>>,
}

impl Session {
    pub fn new<B>(backend: B, zoom: ZoomLimits, fetch_options: FetchOptions) -> Self
    where
        B: Backend + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let engine = Engine::spawn(backend, tx.clone());
        Self {
            controller: Controller::new(zoom),
            engine,
            tx,
            rx,
            fetch_options,
            fetch_cancel: None,
            original: None,
        }
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    /// Original document bytes, once the current load has been fetched.
    pub fn original_bytes(&self) -> Option<&[u8]> {
        self.original.as_deref()
    }

    /// Apply a controller operation and execute the commands it returns.
    ///
    /// Returns the frames to present (at most one in practice).
    pub fn apply(&mut self, op: impl FnOnce(&mut Controller) -> Vec<Command>) -> Vec<Frame> {
        let cmds = op(&mut self.controller);
        self.execute(cmds)
    }

    pub fn open(&mut self, request: ViewRequest) -> Vec<Frame> {
        self.apply(|c| c.open(request))
    }

    fn execute(&mut self, cmds: Vec<Command>) -> Vec<Frame> {
        let mut frames = Vec::new();
        for cmd in cmds {
            match cmd {
                Command::Fetch { generation, source } => {
                    self.cancel_fetch();
                    self.original = None;
                    let cancel = CancelToken::new();
                    self.fetch_cancel = Some(cancel.clone());
                    info!("session: fetching {source} (generation {generation})");
                    spawn_fetch(
                        generation,
                        source,
                        self.fetch_options.clone(),
                        cancel,
                        self.tx.clone(),
                    );
                }
                Command::Render { token, page, scale } => self.engine.render(token, page, scale),
                Command::Present(frame) => frames.push(frame),
                Command::Unload => {
                    self.cancel_fetch();
                    self.original = None;
                    self.engine.unload();
                }
            }
        }
        frames
    }

    fn cancel_fetch(&mut self) {
        if let Some(token) = self.fetch_cancel.take() {
            token.cancel();
        }
    }

    fn handle(&mut self, event: Event) -> Vec<Frame> {
        match event {
            Event::Fetched { generation, result } => {
                if self.controller.is_closed() || generation != self.controller.load_generation() {
                    debug!("session: dropping fetch result for stale generation {generation}");
                    return vec![];
                }
                self.fetch_cancel = None;
                match result {
                    Ok(bytes) => {
                        self.original = Some(bytes.clone());
                        self.engine.open(generation, bytes);
                        vec![]
                    }
                    Err(e) => self.apply(|c| c.on_loaded(generation, Err(e))),
                }
            }
            Event::Opened { generation, result } => {
                self.apply(|c| c.on_loaded(generation, result))
            }
            Event::Rendered { token, result } => self.apply(|c| c.on_rendered(token, result)),
        }
    }

    /// Process completions. Waits up to `timeout` for the first one, then
    /// drains whatever else is queued without blocking.
    pub fn pump(&mut self, timeout: Duration) -> Vec<Frame> {
        let mut frames = Vec::new();
        let first = if timeout.is_zero() {
            self.rx.try_recv().ok()
        } else {
            self.rx.recv_timeout(timeout).ok()
        };
        let Some(first) = first else {
            return frames;
        };
        frames.extend(self.handle(first));
        while let Ok(event) = self.rx.try_recv() {
            frames.extend(self.handle(event));
        }
        frames
    }

    /// True while a load or render is outstanding.
    pub fn is_busy(&self) -> bool {
        let state = self.controller.state();
        state.is_loading || state.is_rendering
    }

    /// Save the original bytes into `dir` under the request's download name.
    pub fn save_original(&self, dir: &Path) -> anyhow::Result<PathBuf> {
        let bytes = self
            .original
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("document has not been fetched"))?;
        let request = self
            .controller
            .request()
            .ok_or_else(|| anyhow::anyhow!("no document requested"))?;
        std::fs::create_dir_all(dir)
            .map_err(|e| anyhow::anyhow!("failed to create {}: {e}", dir.display()))?;
        let path = dir.join(request.download_file_name());
        std::fs::write(&path, bytes)
            .map_err(|e| anyhow::anyhow!("failed to write {}: {e}", path.display()))?;
        info!("session: saved {} bytes to {}", bytes.len(), path.display());
        Ok(path)
    }

    /// Tear down: cancel fetches, unload, and stop the render worker.
    /// Completions that arrive afterwards are ignored.
    pub fn close(&mut self) {
        let cmds = self.controller.close();
        self.execute(cmds);
        self.engine.shutdown();
        while self.rx.try_recv().is_ok() {}
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}
