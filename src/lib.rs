//! Roster Scan — attendance sheet row segmentation and name resolution.
//!
//! Domains:
//!   - segment/  — style classification, binarization, row detection
//!   - names/    — vocabulary and the tiered name resolver
//!   - ocr/      — recognizer and tagger contracts plus their adapters
//!   - table/    — result table and attendance sheet CSVs
//!
//! Wiring:
//!   - config.rs   — layered settings
//!   - pipeline.rs — per-sheet orchestration
//!   - cli.rs      — command-line entry

pub mod cli;
pub mod config;
pub mod error;
pub mod names;
pub mod ocr;
pub mod pipeline;
pub mod segment;
pub mod table;

pub use error::{Error, Result};

use clap::Parser;

/// Entry point — called by the binary.
pub fn run() -> std::process::ExitCode {
    // First env file found wins; real environment variables take precedence.
    'env_load: for env_file in [".env.local", ".env"] {
        let path = std::path::Path::new(env_file);
        if path.exists() {
            match dotenvy::from_path(path) {
                Ok(_) => eprintln!("[STARTUP] Loaded {}", path.display()),
                Err(e) => eprintln!("[STARTUP] Failed to load {}: {}", path.display(), e),
            }
            break 'env_load;
        }
    }

    env_logger::init();

    let cli = cli::Cli::parse();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            log::error!("Failed to start async runtime: {}", e);
            return std::process::ExitCode::FAILURE;
        }
    };

    match runtime.block_on(cli::execute(cli)) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("error: {}", e);
            std::process::ExitCode::FAILURE
        }
    }
}
