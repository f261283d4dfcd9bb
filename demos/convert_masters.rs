//! # Example: convert_masters
//!
//! Runs one converter process per master folder, at most five at a time, and
//! prints each completion report as it arrives.
//!
//! Demonstrates how to:
//! - Build one [`CommandWork`] per folder with a shared completion reporter.
//! - Attach the built-in [`LogWriter`] subscriber (rendered by `tracing_subscriber`).
//! - Await the drain signal returned by [`Dispatcher::process`].
//! - Flush subscriber output with [`Dispatcher::close`] before exiting.
//!
//! ## Flow
//! ```text
//! folders ──► CommandWork (one per folder) ──► Dispatcher::enqueue()
//!     └─► Dispatcher::process()
//!           ├─► ≤ 5 converters running, refilled on each exit
//!           ├─► reporter prints [Success] / [Error] blocks
//!           └─► DrainSignal resolves once every folder is done
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=info cargo run --example convert_masters --features logging -- ./MasterConverter Masters/Item Masters/Enemy
//! ```

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use taskdrain::{CommandWork, Completion, Dispatcher, DispatcherConfig, LogWriter, Subscribe};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let mut args = std::env::args().skip(1);
    let converter = args.next().ok_or("usage: convert_masters <converter> <folder>...")?;
    let folders: Vec<String> = args.collect();

    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let dispatcher = Dispatcher::builder(DispatcherConfig::with_max_parallel(5))
        .with_subscribers(subs)
        .build();

    let failures = Arc::new(AtomicUsize::new(0));
    let failed = failures.clone();
    let report = Arc::new(move |c: Completion| {
        if !c.success {
            failed.fetch_add(1, Ordering::SeqCst);
        }
        println!("{}", c.message);
    });

    for folder in &folders {
        let name = Path::new(folder)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| folder.clone());

        let work = CommandWork::new(name, &converter)
            .args(["--directory", folder.as_str()])
            .on_finish(report.clone());
        if !dispatcher.enqueue(work.boxed()) {
            eprintln!("queue full, skipped {folder}");
        }
    }

    dispatcher.process().await?;
    // Let LogWriter finish the last completions and the drain line.
    dispatcher.close().await;
    println!(
        "done: {} folders, {} failed",
        folders.len(),
        failures.load(Ordering::SeqCst)
    );
    Ok(())
}
