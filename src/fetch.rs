//! Document fetching: HTTP(S) through ureq, local files through std::fs.
//!
//! `spawn_fetch` runs a fetch on its own thread and reports back over the
//! session's event channel, tagged with the load generation that asked for
//! it. The receiver decides whether the result is still wanted.

use std::io::{self, Read};
use std::path::Path;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use log::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::config::FetchOptions;
use crate::error::LoadError;
use crate::session::Event;
use crate::source::DocumentSource;

const CHUNK_SIZE: usize = 64 * 1024;

/// Fetch the full document body. Blocking.
pub fn fetch_bytes(
    source: &DocumentSource,
    options: &FetchOptions,
    cancel: &CancelToken,
) -> Result<Vec<u8>, LoadError> {
    let start = Instant::now();
    let bytes = match source {
        DocumentSource::Url(url) => fetch_url(url, options, cancel)?,
        DocumentSource::File(path) => read_file(path, options, cancel)?,
    };
    info!(
        "fetch: {} -> {} bytes in {:.1}ms",
        source,
        bytes.len(),
        start.elapsed().as_secs_f64() * 1000.0
    );
    Ok(bytes)
}

fn fetch_url(url: &str, options: &FetchOptions, cancel: &CancelToken) -> Result<Vec<u8>, LoadError> {
    let agent: ureq::Agent = ureq::Agent::config_builder()
        .timeout_global(Some(options.timeout))
        .build()
        .into();

    let response = agent.get(url).call().map_err(|e| map_ureq_error(url, options, e))?;

    if let Some(len) = response
        .headers()
        .get("content-length")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        && len > options.max_bytes
    {
        return Err(LoadError::TooLarge { limit: options.max_bytes });
    }

    let mut reader = response.into_body().into_reader();
    read_chunked(&mut reader, options.max_bytes, cancel).map_err(|e| match e {
        ReadFailure::Load(e) => e,
        ReadFailure::Io(e) => LoadError::Network {
            url: url.to_string(),
            reason: e.to_string(),
        },
    })
}

fn map_ureq_error(url: &str, options: &FetchOptions, e: ureq::Error) -> LoadError {
    match e {
        ureq::Error::Timeout(_) => LoadError::Timeout {
            url: url.to_string(),
            after: options.timeout,
        },
        ureq::Error::StatusCode(code) => LoadError::Network {
            url: url.to_string(),
            reason: format!("HTTP status {code}"),
        },
        other => LoadError::Network {
            url: url.to_string(),
            reason: other.to_string(),
        },
    }
}

fn read_file(path: &Path, options: &FetchOptions, cancel: &CancelToken) -> Result<Vec<u8>, LoadError> {
    let io_err = |e: io::Error| LoadError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    };
    let mut file = std::fs::File::open(path).map_err(io_err)?;
    read_chunked(&mut file, options.max_bytes, cancel).map_err(|e| match e {
        ReadFailure::Load(e) => e,
        ReadFailure::Io(e) => io_err(e),
    })
}

enum ReadFailure {
    Load(LoadError),
    Io(io::Error),
}

/// Read to the end in fixed chunks, checking the cancel token and the size
/// cap between chunks.
fn read_chunked(
    reader: &mut impl Read,
    max_bytes: u64,
    cancel: &CancelToken,
) -> Result<Vec<u8>, ReadFailure> {
    let mut out = Vec::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        if cancel.is_cancelled() {
            return Err(ReadFailure::Load(LoadError::Cancelled));
        }
        let n = match reader.read(&mut buf) {
            Ok(0) => return Ok(out),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(ReadFailure::Io(e)),
        };
        if (out.len() + n) as u64 > max_bytes {
            return Err(ReadFailure::Load(LoadError::TooLarge { limit: max_bytes }));
        }
        out.extend_from_slice(&buf[..n]);
    }
}

/// Fetch on a background thread and send `Event::Fetched` when done.
///
/// Send failures are ignored: a closed channel means the session is gone.
pub fn spawn_fetch(
    generation: u64,
    source: DocumentSource,
    options: FetchOptions,
    cancel: CancelToken,
    tx: mpsc::Sender<Event>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        debug!("fetch worker: generation {generation} started for {source}");
        let result = fetch_bytes(&source, &options, &cancel);
        if let Err(e) = &result {
            match e {
                LoadError::Cancelled => debug!("fetch worker: generation {generation} cancelled"),
                e => warn!("fetch worker: generation {generation} failed: {e}"),
            }
        }
        let _ = tx.send(Event::Fetched { generation, result });
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use std::net::TcpListener;
    use std::time::Duration;

    fn options(max_bytes: u64) -> FetchOptions {
        FetchOptions {
            max_bytes,
            ..FetchOptions::default()
        }
    }

    #[test]
    fn reads_local_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"%PDF-1.7 body").unwrap();
        let source = DocumentSource::File(file.path().to_path_buf());
        let bytes = fetch_bytes(&source, &options(1024), &CancelToken::new()).unwrap();
        assert_eq!(bytes, b"%PDF-1.7 body");
    }

    #[test]
    fn missing_file_is_io_error() {
        let source = DocumentSource::File("/nonexistent/folio/cert.pdf".into());
        let err = fetch_bytes(&source, &options(1024), &CancelToken::new()).unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }), "got {err:?}");
    }

    #[test]
    fn size_cap_is_enforced() {
        let mut reader = Cursor::new(vec![0u8; 300]);
        let err = read_chunked(&mut reader, 200, &CancelToken::new()).err().unwrap();
        assert!(matches!(err, ReadFailure::Load(LoadError::TooLarge { limit: 200 })));
    }

    #[test]
    fn cancelled_before_first_chunk() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut reader = Cursor::new(vec![0u8; 10]);
        let err = read_chunked(&mut reader, 1024, &cancel).err().unwrap();
        assert!(matches!(err, ReadFailure::Load(LoadError::Cancelled)));
    }

    // -----------------------------------------------------------------------
    // HTTP against a local listener
    // -----------------------------------------------------------------------

    fn local_url(listener: &TcpListener) -> String {
        let port = listener.local_addr().unwrap().port();
        format!("http://127.0.0.1:{port}/cert.pdf")
    }

    /// Accept one connection, read the request head, send `response`.
    fn serve_once(response: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = local_url(&listener);
        thread::spawn(move || {
            let Ok((mut stream, _)) = listener.accept() else {
                return;
            };
            let mut head = Vec::new();
            let mut buf = [0u8; 1024];
            while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                match stream.read(&mut buf) {
                    Ok(0) | Err(_) => return,
                    Ok(n) => head.extend_from_slice(&buf[..n]),
                }
            }
            let _ = stream.write_all(response.as_bytes());
            let _ = stream.flush();
            thread::sleep(Duration::from_millis(200));
        });
        url
    }

    fn fetch_url_source(url: &str, options: &FetchOptions) -> Result<Vec<u8>, LoadError> {
        fetch_bytes(&DocumentSource::Url(url.to_string()), options, &CancelToken::new())
    }

    #[test]
    fn http_body_is_returned() {
        let url = serve_once("HTTP/1.1 200 OK\r\nContent-Length: 8\r\nConnection: close\r\n\r\n%PDF-1.7");
        assert_eq!(fetch_url_source(&url, &options(1024)).unwrap(), b"%PDF-1.7");
    }

    #[test]
    fn refused_connection_is_network_error() {
        let url = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            local_url(&listener)
        };
        let err = fetch_url_source(&url, &options(1024)).unwrap_err();
        assert!(matches!(&err, LoadError::Network { url: u, .. } if *u == url), "got {err:?}");
    }

    #[test]
    fn silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = local_url(&listener);
        thread::spawn(move || {
            if let Ok((stream, _)) = listener.accept() {
                thread::sleep(Duration::from_secs(3));
                drop(stream);
            }
        });
        let opts = FetchOptions {
            timeout: Duration::from_millis(300),
            ..options(1024)
        };
        let start = Instant::now();
        let err = fetch_url_source(&url, &opts).unwrap_err();
        assert_eq!(
            err,
            LoadError::Timeout {
                url,
                after: Duration::from_millis(300)
            }
        );
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn http_404_is_network_error_with_status() {
        let url = serve_once("HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
        match fetch_url_source(&url, &options(1024)).unwrap_err() {
            LoadError::Network { reason, .. } => assert_eq!(reason, "HTTP status 404"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn declared_length_over_cap_is_too_large() {
        let url = serve_once("HTTP/1.1 200 OK\r\nContent-Length: 4096\r\nConnection: close\r\n\r\n");
        let err = fetch_url_source(&url, &options(1024)).unwrap_err();
        assert_eq!(err, LoadError::TooLarge { limit: 1024 });
    }

    #[test]
    fn spawn_fetch_reports_generation() {
        let (tx, rx) = mpsc::channel();
        let source = DocumentSource::File("/nonexistent/folio/cert.pdf".into());
        spawn_fetch(7, source, options(1024), CancelToken::new(), tx)
            .join()
            .unwrap();
        match rx.recv().unwrap() {
            Event::Fetched { generation, result } => {
                assert_eq!(generation, 7);
                assert!(result.is_err());
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
