//! ocr-watchdog: runs an external OCR tool on every PDF dropped into a directory
//!
//! A non-recursive [`watcher::DirectoryWatcher`] feeds the [`dispatcher::Dispatcher`],
//! which classifies each created or written file and submits PDFs to a bounded
//! job queue. A fixed pool of workers stages each file into the output
//! directory, invokes OCRmyPDF (or any compatible command), publishes the
//! result as `<stem>.pdf` with the source's ownership and mode, and moves
//! failures into a `failed` directory under the input directory.

pub mod classifier;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod ocr;
pub mod permissions;
pub mod processing;
pub mod service;
pub mod watcher;

pub use config::{ProcessingConfig, WatchdogConfig};
pub use error::{Error, Result};
pub use service::{shutdown_signal, Watchdog};
