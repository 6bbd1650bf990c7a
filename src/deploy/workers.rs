//! Bounded upload worker pool
//!
//! Phase 5 is the only concurrent phase: independent per-file uploads run
//! on a fixed number of worker threads. Drivers are not assumed
//! thread-safe, so every worker opens its own session from the factory
//! and keeps it for the lifetime of the pool. Progress flows back to the
//! single logger thread over a channel.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use crate::deploy::plan::{staging_name, UploadItem};
use crate::deploy::{Logger, ServerFactory};
use crate::error::SitesyncError;
use crate::server::connect_with_retry;

/// Retries per file on retryable transport errors.
const UPLOAD_RETRIES: u32 = 3;
const RETRY_DELAYS_MS: [u64; 3] = [100, 500, 1000];

/// What came back from the pool.
pub struct UploadReport {
    /// Live names whose staging upload completed.
    pub staged: Vec<String>,
    /// First terminal error, if any.
    pub error: Option<SitesyncError>,
}

enum Event {
    Progress { rel: String, percent: u8 },
    Done { rel: String },
    Failed { rel: String, message: String, retrying: bool },
}

/// Upload every item to its staging name, `workers` files at a time.
///
/// Stops handing out new work after the first terminal failure; files
/// already in flight finish (and count as staged, so rollback cleans
/// them).
pub fn upload_files(
    factory: &ServerFactory,
    items: &[UploadItem],
    workers: usize,
    logger: &mut dyn Logger,
) -> UploadReport {
    let mut report = UploadReport {
        staged: Vec::new(),
        error: None,
    };
    if items.is_empty() {
        return report;
    }

    let pool_size = workers.clamp(1, items.len());
    let next = AtomicUsize::new(0);
    let abort = AtomicBool::new(false);
    let first_error: Mutex<Option<SitesyncError>> = Mutex::new(None);
    let (sender, receiver) = mpsc::channel::<Event>();

    logger.begin_transfers(items.len());

    thread::scope(|scope| {
        for _ in 0..pool_size {
            let sender = sender.clone();
            let next = &next;
            let abort = &abort;
            let first_error = &first_error;
            scope.spawn(move || {
                let server = match factory().and_then(|mut s| {
                    connect_with_retry(s.as_mut()).map(|()| s)
                }) {
                    Ok(server) => server,
                    Err(err) => {
                        abort.store(true, Ordering::SeqCst);
                        first_error.lock().unwrap().get_or_insert(err);
                        return;
                    }
                };

                loop {
                    let idx = next.fetch_add(1, Ordering::SeqCst);
                    if idx >= items.len() || abort.load(Ordering::SeqCst) {
                        break;
                    }
                    let item = &items[idx];
                    let target = staging_name(&item.rel);

                    let mut attempt = 0;
                    loop {
                        let rel = item.rel.clone();
                        let sender_progress = sender.clone();
                        let mut on_progress = move |percent: u8| {
                            let _ = sender_progress.send(Event::Progress {
                                rel: rel.clone(),
                                percent,
                            });
                        };

                        match server.write_file(&item.source, &target, &mut on_progress) {
                            Ok(()) => {
                                let _ = sender.send(Event::Done {
                                    rel: item.rel.clone(),
                                });
                                break;
                            }
                            Err(err)
                                if err.is_retryable() && attempt < UPLOAD_RETRIES =>
                            {
                                let _ = sender.send(Event::Failed {
                                    rel: item.rel.clone(),
                                    message: err.to_string(),
                                    retrying: true,
                                });
                                let delay =
                                    RETRY_DELAYS_MS[(attempt as usize).min(RETRY_DELAYS_MS.len() - 1)];
                                thread::sleep(Duration::from_millis(delay));
                                attempt += 1;
                            }
                            Err(err) => {
                                let _ = sender.send(Event::Failed {
                                    rel: item.rel.clone(),
                                    message: err.to_string(),
                                    retrying: false,
                                });
                                abort.store(true, Ordering::SeqCst);
                                first_error.lock().unwrap().get_or_insert(err);
                                break;
                            }
                        }
                    }
                }
            });
        }
        drop(sender);

        // Drain events on the calling thread; the logger is not shared.
        for event in receiver {
            match event {
                Event::Progress { rel, percent } => logger.transfer_progress(&rel, percent),
                Event::Done { rel } => {
                    logger.transfer_done(&rel);
                    report.staged.push(rel);
                }
                Event::Failed {
                    rel,
                    message,
                    retrying,
                } => logger.transfer_failed(&rel, &message, retrying),
            }
        }
    });

    report.error = first_error.into_inner().unwrap();
    report
}
