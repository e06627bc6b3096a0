#![no_main]

use libfuzzer_sys::fuzz_target;

use folio::source::{DocumentSource, ViewRequest};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let (arg, title) = match text.split_once('\n') {
        Some((a, t)) => (a, Some(t.to_string())),
        None => (text, None),
    };

    let request = ViewRequest::new(DocumentSource::parse(arg), title);
    let _ = request.title();
    let name = request.download_file_name();
    assert!(name.to_ascii_lowercase().ends_with(".pdf"), "{name:?}");
    assert!(!name.contains(['/', '\\']), "{name:?}");
});
