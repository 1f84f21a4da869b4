//! Scan orchestration: discovers file pairs, fans the per-file work out over a
//! fixed worker pool and streams defects back in submission order.

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};

use rayon::ThreadPoolBuilder;
use serde::Serialize;

use crate::error::Result;
use crate::model::entry::IdentityPolicy;
use crate::model::event::{LogLevel, ScanEvent};
use crate::model::report::DefectRecord;
use crate::parsers::kirikiri;
use crate::services::discovery::{self, FilePair};
use crate::services::matcher::{self, MatchStats};
use crate::services::qa::Analyzer;
use crate::services::suggest::Suggester;

pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_BATCH_SIZE: usize = 50;

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub workers: usize,
    pub batch_size: usize,
    pub identity_policy: IdentityPolicy,
    pub source_lang: String,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            batch_size: DEFAULT_BATCH_SIZE,
            identity_policy: IdentityPolicy::LastWins,
            source_lang: "ja".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub source_dir: PathBuf,
    pub translated_dir: PathBuf,
    pub target_lang: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    pub files_total: usize,
    pub files_scanned: usize,
    pub files_skipped: usize,
    pub total_defects: usize,
    pub cancelled: bool,
}

impl ScanSummary {
    /// Source files were found but none of them could be scanned. An empty
    /// source tree is "nothing to do" and a cancelled run is not a failure.
    pub fn failed(&self) -> bool {
        self.files_total > 0 && self.files_scanned == 0 && !self.cancelled
    }
}

/// Advisory stop signal; work already handed to the pool still runs to completion.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

enum FileOutcome {
    Done {
        records: Vec<DefectRecord>,
        stats: MatchStats,
    },
    Failed {
        level: LogLevel,
        message: String,
    },
}

/// Extract, match and analyze one file pair.
pub fn scan_file(
    pair: &FilePair,
    analyzer: &Analyzer,
    policy: IdentityPolicy,
) -> Result<(Vec<DefectRecord>, MatchStats)> {
    let source = kirikiri::read_dialogue(&pair.source, policy)?;
    let translated = kirikiri::read_dialogue(&pair.translated, policy)?;
    let (pairs, stats) = matcher::match_sets_with_stats(&source, &translated);

    let records = pairs
        .iter()
        .filter_map(|p| {
            let result = analyzer.analyze_pair(p);
            result
                .is_defect()
                .then(|| DefectRecord::new(&pair.relative, p, result))
        })
        .collect();

    Ok((records, stats))
}

fn run_task(pair: &FilePair, analyzer: &Analyzer, policy: IdentityPolicy) -> FileOutcome {
    match panic::catch_unwind(AssertUnwindSafe(|| scan_file(pair, analyzer, policy))) {
        Ok(Ok((records, stats))) => FileOutcome::Done { records, stats },
        Ok(Err(e)) => FileOutcome::Failed {
            level: LogLevel::Warn,
            message: format!("{}: {e}; skipped", pair.relative),
        },
        Err(_) => FileOutcome::Failed {
            level: LogLevel::Error,
            message: format!("{}: internal error while scanning; skipped", pair.relative),
        },
    }
}

fn log(emit: &mut impl FnMut(ScanEvent), level: LogLevel, message: String) {
    match level {
        LogLevel::Debug => tracing::debug!("{message}"),
        LogLevel::Info => tracing::info!("{message}"),
        LogLevel::Warn => tracing::warn!("{message}"),
        LogLevel::Error | LogLevel::Fatal => tracing::error!("{message}"),
    }
    emit(ScanEvent::log(level, message));
}

fn progress(done: usize, total: usize) -> u8 {
    ((done as f64 / total as f64) * 100.0).round() as u8
}

pub struct Scanner {
    suggester: Arc<Suggester>,
    options: ScanOptions,
    cancel: CancelFlag,
}

impl Scanner {
    pub fn new(suggester: Arc<Suggester>, options: ScanOptions) -> Self {
        Self {
            suggester,
            options,
            cancel: CancelFlag::default(),
        }
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn run(&self, req: &ScanRequest, mut emit: impl FnMut(ScanEvent)) -> Result<ScanSummary> {
        let mut summary = ScanSummary::default();

        log(
            &mut emit,
            LogLevel::Info,
            format!(
                "Scanning {} against {}",
                req.source_dir.display(),
                req.translated_dir.display()
            ),
        );

        let found = discovery::pair_files(&req.source_dir, &req.translated_dir);
        summary.files_total = found.total_sources;

        if found.total_sources == 0 {
            log(
                &mut emit,
                LogLevel::Error,
                format!("No script files found in {}", req.source_dir.display()),
            );
            return Ok(self.finish(summary, &mut emit));
        }

        for relative in &found.missing {
            log(
                &mut emit,
                LogLevel::Warn,
                format!("No translated file for {relative}; skipped"),
            );
        }
        summary.files_skipped = found.missing.len();

        let total = found.pairs.len();
        if total == 0 {
            log(
                &mut emit,
                LogLevel::Error,
                format!("No translated counterparts found in {}", req.translated_dir.display()),
            );
            return Ok(self.finish(summary, &mut emit));
        }

        let workers = self.options.workers.max(1);
        let batch_size = self.options.batch_size.max(1);
        let policy = self.options.identity_policy;
        let analyzer = Arc::new(Analyzer::new(
            self.suggester.clone(),
            &self.options.source_lang,
            &req.target_lang,
        ));

        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("sekai-qa-worker-{i}"))
            .build()?;

        let (tx, rx) = mpsc::channel::<(usize, FileOutcome)>();
        let window = workers * 2;

        let mut next_submit = 0usize;
        let mut next_drain = 0usize;
        let mut pending: BTreeMap<usize, FileOutcome> = BTreeMap::new();
        let mut buffer: Vec<DefectRecord> = Vec::new();

        while next_drain < total {
            while next_submit < total && next_submit - next_drain < window {
                if self.cancel.is_cancelled() {
                    break;
                }
                let pair = found.pairs[next_submit].clone();
                let analyzer = analyzer.clone();
                let tx = tx.clone();
                let index = next_submit;
                pool.spawn(move || {
                    let outcome = run_task(&pair, &analyzer, policy);
                    let _ = tx.send((index, outcome));
                });
                next_submit += 1;
            }

            if self.cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            // Hold finished work until it is its turn.
            let outcome = loop {
                if let Some(o) = pending.remove(&next_drain) {
                    break o;
                }
                match rx.recv() {
                    Ok((i, o)) => {
                        pending.insert(i, o);
                    }
                    Err(_) => {
                        break FileOutcome::Failed {
                            level: LogLevel::Error,
                            message: "worker pool stopped unexpectedly".to_string(),
                        }
                    }
                }
            };
            let relative = &found.pairs[next_drain].relative;
            next_drain += 1;

            match outcome {
                FileOutcome::Done { records, stats } => {
                    log(
                        &mut emit,
                        LogLevel::Debug,
                        format!(
                            "{relative}: {} exact, {} fuzzy, {} unmatched, {} defects",
                            stats.exact,
                            stats.fuzzy,
                            stats.dropped,
                            records.len()
                        ),
                    );
                    summary.files_scanned += 1;
                    buffer.extend(records);
                }
                FileOutcome::Failed { level, message } => {
                    summary.files_skipped += 1;
                    log(&mut emit, level, message);
                }
            }

            while buffer.len() >= batch_size {
                let records: Vec<DefectRecord> = buffer.drain(..batch_size).collect();
                summary.total_defects += records.len();
                emit(ScanEvent::Batch { records });
            }

            emit(ScanEvent::Progress {
                percent: progress(next_drain, total),
            });
        }

        if summary.cancelled {
            log(
                &mut emit,
                LogLevel::Info,
                format!("Scan cancelled after {next_drain} of {total} files"),
            );
        } else if !buffer.is_empty() {
            summary.total_defects += buffer.len();
            emit(ScanEvent::Batch { records: buffer });
        }

        Ok(self.finish(summary, &mut emit))
    }

    fn finish(&self, summary: ScanSummary, emit: &mut impl FnMut(ScanEvent)) -> ScanSummary {
        self.suggester.flush();

        log(
            emit,
            LogLevel::Info,
            format!(
                "Scan finished: {} defects in {} files",
                summary.total_defects, summary.files_scanned
            ),
        );
        emit(ScanEvent::Finished {
            total_defects: summary.total_defects,
            files_scanned: summary.files_scanned,
            cancelled: summary.cancelled,
        });

        summary
    }
}
