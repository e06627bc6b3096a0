use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use folio::cancel::CancelToken;
use folio::config;
use folio::document::{Backend, Document};
use folio::fetch::fetch_bytes;
use folio::pdfium::PdfiumBackend;
use folio::source::{DocumentSource, ViewRequest};
use folio::surface::Surface;

#[derive(Parser)]
#[command(name = "folio", version, about = "PDF viewer for Kitty-graphics terminals")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// PDF to view: a local path or an http(s) URL
    input: Option<String>,

    /// Title shown in the status bar and used for downloads
    #[arg(long)]
    title: Option<String>,

    /// Initial zoom (clamped to the configured range)
    #[arg(long, global = true)]
    scale: Option<f32>,

    /// Directory containing the PDFium shared library
    #[arg(long, global = true)]
    pdfium: Option<PathBuf>,

    /// Disable automatic file watching (viewer reloads on file change by default)
    #[arg(long)]
    no_watch: bool,

    /// Log output file path (enables logging when specified)
    #[arg(long, global = true)]
    log: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Render pages to PNG
    Render {
        /// Local path or http(s) URL
        input: String,

        /// Output PNG file (`stem-NNN.png` per page when --page is omitted)
        #[arg(short, long, default_value = "output.png")]
        output: PathBuf,

        /// 1-based page to render (default: all pages)
        #[arg(long)]
        page: Option<u32>,
    },
    /// Print page count and page sizes
    Info {
        /// Local path or http(s) URL
        input: String,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Some(log_path) = &cli.log {
        match fs::File::create(log_path) {
            Ok(file) => env_logger::Builder::from_default_env()
                .target(env_logger::Target::Pipe(Box::new(file)))
                .init(),
            Err(e) => {
                eprintln!("Error: failed to open log file {}: {e}", log_path.display());
                std::process::exit(1);
            }
        }
    } else if cli.command.is_some() {
        env_logger::init();
    }
    // viewer mode + no --log → logger not initialized (no log output)

    info!(
        "folio {} ({}, {})",
        env!("CARGO_PKG_VERSION"),
        env!("FOLIO_BUILD_GIT_HASH"),
        env!("FOLIO_BUILD_PROFILE")
    );

    // Load config file and merge CLI overrides
    let mut cfg = match config::load_config() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    };
    cfg.merge_cli(cli.scale, cli.pdfium);
    let config = cfg.resolve();

    let result = match cli.command {
        Some(Command::Render {
            input,
            output,
            page,
        }) => cmd_render(&input, &config, &output, page),
        Some(Command::Info { input }) => cmd_info(&input, &config),
        None => match cli.input {
            Some(input) => {
                let request = ViewRequest::new(DocumentSource::parse(&input), cli.title);
                folio::viewer::run(request, config, !cli.no_watch)
            }
            None => {
                eprintln!("Error: input file or URL required");
                std::process::exit(1);
            }
        },
    };

    if let Err(e) = result {
        let msg = format!("{e:#}");
        if msg.contains("[BUG]") {
            eprintln!("\x1b[1;31m{msg}\x1b[0m");
        } else {
            eprintln!("Error: {msg}");
        }
        std::process::exit(1);
    }
}

fn open_document(input: &str, config: &config::Config) -> Result<<PdfiumBackend as Backend>::Document> {
    let source = DocumentSource::parse(input);
    let bytes = fetch_bytes(&source, &config.fetch, &CancelToken::new())
        .with_context(|| format!("failed to load {source}"))?;
    let backend = PdfiumBackend::new(config.library_path.clone());
    let doc = backend
        .open(bytes)
        .with_context(|| format!("failed to open {source}"))?;
    Ok(doc)
}

fn cmd_render(input: &str, config: &config::Config, output: &Path, page: Option<u32>) -> Result<()> {
    let pipeline_start = Instant::now();
    let doc = open_document(input, config)?;
    let total = doc.page_count();
    let scale = config.viewer.zoom.default;

    let pages: Vec<u32> = match page {
        Some(p) if p == 0 || p > total => anyhow::bail!("page {p} out of range (document has {total})"),
        Some(p) => vec![p],
        None => (1..=total).collect(),
    };

    let stem = output
        .file_stem()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string();
    let ext = output
        .extension()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string();
    let parent = output.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).ok();

    let mut surface = Surface::new();
    let mut files = Vec::new();
    for p in pages {
        doc.render_page(p, scale, &mut surface)
            .with_context(|| format!("failed to render page {p}"))?;
        let png_data = surface.snapshot(0, p, scale).encode_png()?;
        let path = if page.is_some() {
            output.to_path_buf()
        } else {
            parent.join(format!("{stem}-{p:03}.{ext}"))
        };
        fs::write(&path, &png_data)
            .with_context(|| format!("failed to write {}", path.display()))?;
        files.push((path, png_data.len()));
    }

    info!(
        "cmd_render: {} page(s) in {:.1}ms",
        files.len(),
        pipeline_start.elapsed().as_secs_f64() * 1000.0
    );

    eprintln!("rendered {input} at {:.0}% -> {} file(s):", scale * 100.0, files.len());
    for (path, size) in &files {
        eprintln!("  {} ({} bytes)", path.display(), size);
    }
    Ok(())
}

fn cmd_info(input: &str, config: &config::Config) -> Result<()> {
    let doc = open_document(input, config)?;
    let total = doc.page_count();
    println!("pages: {total}");
    for p in 1..=total {
        if let Some(size) = doc.page_size(p) {
            println!("  {p:>4}: {:.1} x {:.1} pt", size.width, size.height);
        }
    }
    Ok(())
}
