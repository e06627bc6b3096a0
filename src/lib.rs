pub mod cancel;
pub mod config;
pub mod controller;
pub mod document;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod pdfium;
pub mod session;
pub mod source;
pub mod surface;
pub mod viewer;
pub mod watch;
