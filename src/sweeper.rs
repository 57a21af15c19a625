use chrono::Utc;
use log::{error, info, warn};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;

use crate::browser::Browser;
use crate::classifier::KeywordClassifier;
use crate::config::Config;
use crate::delay_manager::{self, NoPacing, Pacing};
use crate::notifier::{self, DesktopNotifier, LogNotifier, Notifier};
use crate::posting::SearchTask;
use crate::sources::{JobSource, SelectorAdapter};
use crate::store::PostingStore;

/// Shared stop flag, checked between tasks.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Counters for one (source, term) task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskOutcome {
    pub accepted: usize,
    pub high_value: usize,
    /// Candidates whose id was already stored.
    pub known: usize,
    /// Candidates never looked at because the cap was reached.
    pub over_cap: usize,
    pub skipped_untitled: usize,
    pub filtered_irrelevant: usize,
    pub failed_nodes: usize,
    pub store_errors: usize,
    /// The adapter returned an error.
    pub failed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceSummary {
    pub name: String,
    pub tasks: usize,
    pub failed_tasks: usize,
    pub accepted: usize,
    pub high_value: usize,
    pub known: usize,
    pub over_cap: usize,
    pub skipped_untitled: usize,
    pub filtered_irrelevant: usize,
    pub failed_nodes: usize,
}

impl SourceSummary {
    fn record(&mut self, outcome: &TaskOutcome) {
        self.tasks += 1;
        if outcome.failed {
            self.failed_tasks += 1;
        }
        self.accepted += outcome.accepted;
        self.high_value += outcome.high_value;
        self.known += outcome.known;
        self.over_cap += outcome.over_cap;
        self.skipped_untitled += outcome.skipped_untitled;
        self.filtered_irrelevant += outcome.filtered_irrelevant;
        self.failed_nodes += outcome.failed_nodes;
    }
}

/// Result of one sweep. Produced even when the sweep is cut short.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepSummary {
    pub sources: Vec<SourceSummary>,
    pub accepted_total: usize,
    pub high_value_total: usize,
    pub known_total: usize,
    pub tasks_planned: usize,
    pub tasks_run: usize,
    pub cancelled: bool,
}

impl SweepSummary {
    pub fn source(&self, name: &str) -> Option<&SourceSummary> {
        self.sources.iter().find(|s| s.name == name)
    }

    fn record(&mut self, source_index: usize, outcome: &TaskOutcome) {
        self.sources[source_index].record(outcome);
        self.accepted_total += outcome.accepted;
        self.high_value_total += outcome.high_value;
        self.known_total += outcome.known;
        self.tasks_run += 1;
    }
}

#[derive(Debug, Clone)]
pub struct SweepSettings {
    pub terms: Vec<String>,
    pub locality: String,
    pub per_task_cap: usize,
    pub deadline: Option<Duration>,
}

impl SweepSettings {
    pub fn from_config(config: &Config) -> Self {
        SweepSettings {
            terms: config
                .terms
                .iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
            locality: config.locality.clone(),
            per_task_cap: config.per_task_cap,
            deadline: config.sweep_deadline_secs.map(Duration::from_secs),
        }
    }
}

/// Runs every (source, term) task through one browser session.
pub struct Sweeper<B: Browser> {
    browser: B,
    sources: Vec<Box<dyn JobSource<B>>>,
    store: Arc<PostingStore>,
    pacing: Box<dyn Pacing>,
    notifier: Box<dyn Notifier>,
    settings: SweepSettings,
}

impl<B: Browser> Sweeper<B> {
    /// A sweeper with no sources, no pacing and log-only notifications.
    pub fn new(browser: B, store: Arc<PostingStore>, settings: SweepSettings) -> Self {
        Sweeper {
            browser,
            sources: Vec::new(),
            store,
            pacing: Box::new(NoPacing),
            notifier: Box::new(LogNotifier),
            settings,
        }
    }

    /// Wires adapters, pacing and notifications as `config` describes.
    pub fn from_config(config: &Config, browser: B, store: Arc<PostingStore>) -> Result<Self> {
        let classifier = KeywordClassifier::new(&config.keywords);
        let mut sweeper = Sweeper::new(browser, store, SweepSettings::from_config(config))
            .with_pacing(delay_manager::from_config(&config.pacing));
        if config.notifications {
            sweeper = sweeper.with_notifier(Box::new(DesktopNotifier));
        }
        for profile in config.profiles()? {
            sweeper = sweeper.with_source(Box::new(SelectorAdapter::new(
                profile,
                classifier.clone(),
                config.timeouts,
                config.snapshot_dir.clone(),
            )));
        }
        Ok(sweeper)
    }

    pub fn with_source(mut self, source: Box<dyn JobSource<B>>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn with_pacing(mut self, pacing: Box<dyn Pacing>) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_notifier(mut self, notifier: Box<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn run(&mut self, cancel: &CancelToken) -> SweepSummary {
        let started = Instant::now();
        let Sweeper {
            browser,
            sources,
            store,
            pacing,
            notifier: sink,
            settings,
        } = self;

        let mut summary = SweepSummary {
            sources: sources
                .iter()
                .map(|s| SourceSummary {
                    name: s.name().to_string(),
                    ..Default::default()
                })
                .collect(),
            tasks_planned: sources.len() * settings.terms.len(),
            ..Default::default()
        };

        let should_stop = |cancel: &CancelToken| {
            cancel.is_cancelled() || settings.deadline.is_some_and(|d| started.elapsed() >= d)
        };

        info!(
            "=== Sweep started: {} sources x {} terms ===",
            sources.len(),
            settings.terms.len()
        );

        'sweep: for (si, source) in sources.iter().enumerate() {
            for (ti, term) in settings.terms.iter().enumerate() {
                if should_stop(cancel) {
                    summary.cancelled = true;
                    break 'sweep;
                }
                if ti > 0 {
                    pacing.between_tasks();
                } else if si > 0 {
                    pacing.between_sources();
                }
                if should_stop(cancel) {
                    summary.cancelled = true;
                    break 'sweep;
                }

                let task = SearchTask::new(source.name(), term, &settings.locality);
                info!("Searching {}: {}", task.source, task.term);
                let outcome = run_task(&**source, browser, &**store, settings.per_task_cap, &task);
                info!(
                    "   {} new, {} known, {} over cap, {} untitled",
                    outcome.accepted, outcome.known, outcome.over_cap, outcome.skipped_untitled
                );
                summary.record(si, &outcome);
            }
        }

        if summary.cancelled {
            warn!(
                "Sweep stopped early after {} of {} tasks.",
                summary.tasks_run, summary.tasks_planned
            );
        }
        for s in &summary.sources {
            info!(
                "   {:10} -> {} new ({} high-value), {} known",
                s.name, s.accepted, s.high_value, s.known
            );
        }

        if summary.accepted_total > 0 {
            notifier::announce(
                &**sink,
                summary.accepted_total,
                summary.high_value_total,
            );
            info!("END: {} new postings stored.", summary.accepted_total);
        } else {
            info!("END: no new postings.");
        }

        summary
    }
}

fn run_task<B: Browser>(
    source: &dyn JobSource<B>,
    browser: &mut B,
    store: &PostingStore,
    cap: usize,
    task: &SearchTask,
) -> TaskOutcome {
    let mut outcome = TaskOutcome::default();

    let report = match source.search(browser, task) {
        Ok(report) => report,
        Err(e) => {
            error!("Error in {} / {}: {}", task.source, task.term, e);
            outcome.failed = true;
            return outcome;
        }
    };
    outcome.skipped_untitled = report.skipped_untitled;
    outcome.filtered_irrelevant = report.filtered_irrelevant;
    outcome.failed_nodes = report.failed_nodes;

    let total = report.candidates.len();
    for (i, candidate) in report.candidates.into_iter().enumerate() {
        if outcome.accepted >= cap {
            outcome.over_cap = total - i;
            break;
        }
        let posting = candidate.into_posting(Utc::now());
        match store.insert_if_absent(&posting) {
            Ok(true) => {
                outcome.accepted += 1;
                let prefix = if posting.high_value {
                    outcome.high_value += 1;
                    "VIP"
                } else {
                    "New"
                };
                info!("   {}: {} | {}", prefix, posting.title, posting.company);
            }
            Ok(false) => outcome.known += 1,
            Err(e) => {
                error!("Failed to store {}: {:#}", posting.id, e);
                outcome.store_errors += 1;
            }
        }
    }

    outcome
}
