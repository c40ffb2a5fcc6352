//! The tick loop.
//!
//! Each tick walks the phases of [`Phase`] in order:
//!
//! 1. wait until `cursor + availability_delay`
//! 2. resolve the inputs of the cursor date and run the pipeline
//! 3. adjust the failure counter, advance the cursor and persist it
//! 4. alert when the counter went over the threshold
//!
//! A shutdown signal ends the wait immediately. A signal that arrives while
//! the pipeline runs abandons the tick without persisting, so it is replayed
//! on the next start.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use super::clock::Clock;
use super::failure::FailureCounter;
use super::state::{PersistedState, StateStore};
use crate::job::JobRunner;
use crate::locator::FileLocator;
use crate::metrics::{write_metrics_file, MetricsCollector};
use crate::notify::{Alert, Notifier};
use crate::pipeline::{Pipeline, ResolvedInputs, StepStatus, TickReport};
use crate::report::SummaryWriter;

/// Default interval between ticks (6 hours).
pub const DEFAULT_CADENCE_SECS: i64 = 6 * 3600;

/// Default wait after a tick's date before its data is expected (1 day).
pub const DEFAULT_AVAILABILITY_DELAY_SECS: i64 = 24 * 3600;

/// Default number of net failures tolerated before alerting.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Timing and alerting settings of one scheduler instance.
#[derive(Debug, Clone)]
pub struct ScheduleSettings {
    /// Instance name, used in alerts.
    pub name: String,
    /// Cursor used when there is no saved state.
    pub start: DateTime<Utc>,
    pub cadence: TimeDelta,
    pub availability_delay: TimeDelta,
    pub failure_threshold: u32,
    /// Log file mentioned in alerts.
    pub log_file: Option<PathBuf>,
}

impl ScheduleSettings {
    pub fn new(name: impl Into<String>, start: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            start,
            cadence: TimeDelta::seconds(DEFAULT_CADENCE_SECS),
            availability_delay: TimeDelta::seconds(DEFAULT_AVAILABILITY_DELAY_SECS),
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            log_file: None,
        }
    }

    pub fn with_cadence(mut self, cadence: TimeDelta) -> Self {
        self.cadence = cadence;
        self
    }

    pub fn with_availability_delay(mut self, delay: TimeDelta) -> Self {
        self.availability_delay = delay;
        self
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn with_log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }
}

/// Where the scheduler is within a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    WaitingForData,
    RunningTick,
    Persisting,
    Alerting,
}

/// Result of [`Scheduler::tick`].
#[derive(Debug)]
pub enum TickOutcome {
    /// The tick ran to the end and the cursor moved on.
    Completed {
        report: TickReport,
        /// Alert emitted by this tick, whether or not delivery succeeded.
        alert: Option<Alert>,
    },
    /// Shutdown was requested. The cursor did not move.
    Interrupted,
}

/// Drives the pipeline over successive cursor dates.
pub struct Scheduler {
    settings: ScheduleSettings,
    locator: Arc<FileLocator>,
    pipeline: Pipeline,
    runner: Arc<dyn JobRunner>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    store: Option<StateStore>,
    summary: Option<SummaryWriter>,
    metrics_file: Option<PathBuf>,
    metrics: MetricsCollector,
    cursor: DateTime<Utc>,
    failures: FailureCounter,
    phase: Phase,
}

impl Scheduler {
    /// Creates a scheduler starting at `settings.start` with no saved state.
    pub fn new(
        settings: ScheduleSettings,
        locator: Arc<FileLocator>,
        pipeline: Pipeline,
        runner: Arc<dyn JobRunner>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let cursor = settings.start;
        Self {
            settings,
            locator,
            pipeline,
            runner,
            clock,
            notifier,
            store: None,
            summary: None,
            metrics_file: None,
            metrics: MetricsCollector::new(),
            cursor,
            failures: FailureCounter::default(),
            phase: Phase::WaitingForData,
        }
    }

    /// Resumes from `store`, falling back to the configured start when the
    /// saved record is missing or unusable. Every completed tick is saved
    /// back to it.
    pub fn with_state_store(mut self, store: StateStore) -> Self {
        let state = store.load_or(self.settings.start);
        info!(
            path = %store.path().display(),
            cursor = %state.cursor,
            failures = state.failure_count.value(),
            "Loaded scheduler state"
        );
        self.cursor = state.cursor;
        self.failures = state.failure_count;
        self.store = Some(store);
        self
    }

    pub fn with_summary_writer(mut self, writer: SummaryWriter) -> Self {
        self.summary = Some(writer);
        self
    }

    pub fn with_metrics_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.metrics_file = Some(path.into());
        self
    }

    pub fn settings(&self) -> &ScheduleSettings {
        &self.settings
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Date of the next tick.
    pub fn cursor(&self) -> DateTime<Utc> {
        self.cursor
    }

    pub fn failures(&self) -> FailureCounter {
        self.failures
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Earliest time at which the next tick may start.
    pub fn readiness(&self) -> DateTime<Utc> {
        self.cursor + self.settings.availability_delay
    }

    /// Finds the file of every channel the pipeline needs for `date`.
    ///
    /// A locator error is logged and every channel is treated as missing.
    pub async fn resolve_inputs(&self, date: DateTime<Utc>) -> ResolvedInputs {
        let channels = self.pipeline.required_channels();
        match self.locator.locate_many(date, &channels).await {
            Ok(resolved) => resolved,
            Err(e) => {
                error!(date = %date, error = %e, "File lookup failed");
                channels.into_iter().map(|c| (c, None)).collect()
            }
        }
    }

    /// Resolves inputs and runs the pipeline for `date`. Does not touch the
    /// cursor, the counter or the saved state.
    pub async fn run_tick(&self, date: DateTime<Utc>) -> TickReport {
        let inputs = self.resolve_inputs(date).await;
        self.pipeline.run(date, &inputs, self.runner.as_ref()).await
    }

    /// Runs one full tick for the current cursor.
    pub async fn tick(&mut self, shutdown: &mut broadcast::Receiver<()>) -> TickOutcome {
        self.phase = Phase::WaitingForData;
        let readiness = self.readiness();
        if self.clock.now() < readiness {
            info!(date = %self.cursor, until = %readiness, "Waiting for data to be available");
            tokio::select! {
                _ = self.clock.sleep_until(readiness) => {}
                _ = shutdown.recv() => {
                    info!("Shutdown requested while waiting");
                    return TickOutcome::Interrupted;
                }
            }
        }
        if shutdown_requested(shutdown) {
            return TickOutcome::Interrupted;
        }

        self.phase = Phase::RunningTick;
        let date = self.cursor;
        info!(date = %date, "Starting tick");
        let report = tokio::select! {
            report = self.run_tick(date) => Some(report),
            _ = shutdown.recv() => None,
        };
        let Some(report) = report else {
            warn!(date = %date, "Shutdown requested during tick, it will be replayed");
            self.phase = Phase::WaitingForData;
            return TickOutcome::Interrupted;
        };

        let success = report.is_success();
        self.failures.record(success);
        self.record_outcome(&report);

        self.phase = Phase::Persisting;
        self.cursor = date + self.settings.cadence;
        let alert_count = self.failures.take_alert(self.settings.failure_threshold);
        self.persist();

        let alert = match alert_count {
            Some(count) => {
                self.phase = Phase::Alerting;
                Some(self.send_alert(count, &report).await)
            }
            None => None,
        };

        self.metrics.update_failure_count(self.failures.value());
        self.write_metrics();
        self.phase = Phase::WaitingForData;

        TickOutcome::Completed { report, alert }
    }

    /// Runs ticks until shutdown, or until `max_ticks` ticks completed.
    /// Returns the number of completed ticks.
    pub async fn run(
        &mut self,
        mut shutdown: broadcast::Receiver<()>,
        max_ticks: Option<usize>,
    ) -> usize {
        info!(
            name = %self.settings.name,
            cursor = %self.cursor,
            failures = self.failures.value(),
            "Scheduler started"
        );

        let mut completed = 0;
        loop {
            if max_ticks.is_some_and(|max| completed >= max) {
                break;
            }
            if shutdown_requested(&mut shutdown) {
                info!("Scheduler received shutdown signal");
                break;
            }
            match self.tick(&mut shutdown).await {
                TickOutcome::Completed { .. } => completed += 1,
                TickOutcome::Interrupted => break,
            }
        }

        info!(completed = completed, cursor = %self.cursor, "Scheduler stopped");
        completed
    }

    /// Runs the pipeline for every date from `start` up to, but excluding,
    /// `end`, `interval` apart. Never waits, persists or alerts.
    pub async fn backfill(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval: TimeDelta,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Vec<TickReport> {
        let mut reports = Vec::new();
        if interval <= TimeDelta::zero() {
            warn!(interval = %interval, "Backfill interval must be positive");
            return reports;
        }

        let mut date = start;
        while date < end {
            if shutdown_requested(shutdown) {
                break;
            }
            let report = tokio::select! {
                report = self.run_tick(date) => report,
                _ = shutdown.recv() => {
                    warn!(date = %date, "Shutdown requested during backfill");
                    break;
                }
            };
            self.record_outcome(&report);
            reports.push(report);
            date += interval;
        }
        reports
    }

    fn record_outcome(&self, report: &TickReport) {
        if report.is_success() {
            self.metrics.record_tick("succeeded");
            info!(date = %report.date, steps = report.steps.len(), "Tick succeeded");
            if let Some(writer) = &self.summary {
                match writer.write(report) {
                    Ok(path) => info!(path = %path.display(), "Wrote tick summary"),
                    Err(e) => {
                        error!(date = %report.date, error = %e, "Could not write tick summary")
                    }
                }
            }
        } else {
            self.metrics.record_tick("failed");
            let problem = problem_description(report);
            warn!(
                date = %report.date,
                problem = problem.as_deref().unwrap_or("unknown"),
                failures = self.failures.value(),
                "Tick failed"
            );
        }
    }

    fn persist(&self) {
        let Some(store) = &self.store else {
            return;
        };
        let state = PersistedState::new(self.cursor, self.failures);
        if let Err(e) = store.save(&state) {
            error!(
                path = %store.path().display(),
                cursor = %self.cursor,
                error = %e,
                "Could not save scheduler state"
            );
        }
    }

    async fn send_alert(&self, count: u32, report: &TickReport) -> Alert {
        let problem = problem_description(report);
        let alert = Alert::too_many_errors(
            &self.settings.name,
            count,
            self.settings.log_file.as_deref(),
            problem.as_deref(),
        );

        match self.notifier.send(&alert).await {
            Ok(()) => {
                self.metrics.record_alert(true);
                info!(failures = count, subject = %alert.subject, "Alert sent");
            }
            Err(e) => {
                self.metrics.record_alert(false);
                error!(failures = count, error = %e, "Could not send alert");
            }
        }
        alert
    }

    fn write_metrics(&self) {
        if let Some(path) = &self.metrics_file {
            if let Err(e) = write_metrics_file(path) {
                warn!(path = %path.display(), error = %e, "Could not write metrics file");
            }
        }
    }
}

/// Non-blocking check of the shutdown channel.
fn shutdown_requested(shutdown: &mut broadcast::Receiver<()>) -> bool {
    loop {
        match shutdown.try_recv() {
            Ok(()) | Err(broadcast::error::TryRecvError::Closed) => return true,
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(broadcast::error::TryRecvError::Empty) => return false,
        }
    }
}

fn problem_description(report: &TickReport) -> Option<String> {
    let step = report.first_problem()?;
    let detail = match &step.status {
        StepStatus::Failed { error, .. } => error.to_string(),
        StepStatus::Skipped(reason) => reason.to_string(),
        StepStatus::Succeeded { .. } => return None,
    };
    Some(format!("{}: step '{}': {}", report.date, step.name, detail))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{SegmentationJob, StaffStatsJob};
    use crate::locator::header::testing::write_fits;
    use crate::locator::{FilePattern, FitsHeaderReader};
    use crate::notify::testing::RecordingNotifier;
    use crate::pipeline::testing::RecordingRunner;
    use crate::pipeline::PipelineStep;
    use crate::quality::QualityGate;
    use crate::scheduler::clock::ManualClock;
    use chrono::TimeZone;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        clock: Arc<ManualClock>,
        runner: Arc<RecordingRunner>,
        notifier: Arc<RecordingNotifier>,
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2015, 10, 16, 0, 0, 0).unwrap()
    }

    impl Fixture {
        fn new(runner: RecordingRunner) -> Self {
            Self {
                dir: TempDir::new().unwrap(),
                clock: Arc::new(ManualClock::new(start())),
                runner: Arc::new(runner),
                notifier: Arc::new(RecordingNotifier::default()),
            }
        }

        fn write_images(&self, date: DateTime<Utc>) {
            for channel in [94, 171, 193] {
                let path = self.dir.path().join(format!(
                    "aia/{}/aia.lev1.{}A.fits",
                    date.format("%Y%m%d_%H%M"),
                    channel
                ));
                write_fits(&path, Some(0));
            }
        }

        fn state_path(&self) -> PathBuf {
            self.dir.path().join("state.json")
        }

        fn scheduler(&self, threshold: u32) -> Scheduler {
            let root = self.dir.path().display().to_string();
            let pattern = FilePattern::parse(&format!(
                "{}/aia/{{date:%Y%m%d_%H%M}}/aia.lev1.{{wavelength}}A.fits",
                root
            ))
            .unwrap();
            let locator = FileLocator::new(
                pattern,
                QualityGate::default(),
                Arc::new(FitsHeaderReader::default()),
            );

            let map = |kind: &str| {
                FilePattern::parse(&format!(
                    "{}/{}/{{date:%Y%m%d_%H%M%S}}.SegmentedMap.fits",
                    root, kind
                ))
                .unwrap()
            };
            let pipeline = Pipeline::new(vec![
                PipelineStep::segmentation(
                    "ar",
                    SegmentationJob::new("ar_classification.x", "AR.config", "AR.centers"),
                    vec![171, 193],
                    map("AR"),
                ),
                PipelineStep::segmentation(
                    "ch",
                    SegmentationJob::new("ch_classification.x", "CH.config", "CH.centers"),
                    vec![171, 193],
                    map("CH"),
                ),
                PipelineStep::staff_stats(
                    "stats",
                    StaffStatsJob::new("get_STAFF_stats.x", "stats.config", &root),
                    "ar",
                    "ch",
                    vec![94, 171, 193],
                ),
            ])
            .unwrap();

            let settings = ScheduleSettings::new("run_spoca_STAFF", start())
                .with_failure_threshold(threshold);
            Scheduler::new(
                settings,
                Arc::new(locator),
                pipeline,
                self.runner.clone(),
                self.clock.clone(),
                self.notifier.clone(),
            )
            .with_state_store(StateStore::new(self.state_path()))
            .with_summary_writer(SummaryWriter::new(self.dir.path().join("summaries")))
        }

        fn saved(&self) -> PersistedState {
            StateStore::new(self.state_path()).load().unwrap().unwrap()
        }
    }

    fn channel() -> (broadcast::Sender<()>, broadcast::Receiver<()>) {
        broadcast::channel(1)
    }

    #[tokio::test]
    async fn test_tick_waits_then_runs_pipeline() {
        let fixture = Fixture::new(RecordingRunner::default());
        fixture.write_images(start());
        let mut scheduler = fixture.scheduler(DEFAULT_FAILURE_THRESHOLD);
        let (_tx, mut rx) = channel();

        let outcome = scheduler.tick(&mut rx).await;
        let TickOutcome::Completed { report, alert } = outcome else {
            panic!("tick was interrupted");
        };
        assert!(report.is_success());
        assert!(alert.is_none());
        assert_eq!(fixture.clock.sleeps(), vec![start() + TimeDelta::days(1)]);
        assert_eq!(fixture.runner.executables().len(), 3);

        assert_eq!(scheduler.cursor(), start() + TimeDelta::hours(6));
        assert_eq!(scheduler.phase(), Phase::WaitingForData);
        assert_eq!(fixture.saved().cursor, start() + TimeDelta::hours(6));
        assert!(fixture
            .dir
            .path()
            .join("summaries/20151016_000000.csv")
            .exists());
    }

    #[tokio::test]
    async fn test_no_wait_when_data_is_old() {
        let fixture = Fixture::new(RecordingRunner::default());
        fixture.clock.set(start() + TimeDelta::days(30));
        let mut scheduler = fixture.scheduler(DEFAULT_FAILURE_THRESHOLD);
        let (_tx, mut rx) = channel();

        scheduler.tick(&mut rx).await;
        assert!(fixture.clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_missing_data_counts_failure_and_advances() {
        let fixture = Fixture::new(RecordingRunner::default());
        let mut scheduler = fixture.scheduler(DEFAULT_FAILURE_THRESHOLD);
        let (_tx, mut rx) = channel();

        let TickOutcome::Completed { report, .. } = scheduler.tick(&mut rx).await else {
            panic!("tick was interrupted");
        };
        assert!(!report.is_success());
        assert!(fixture.runner.executables().is_empty());
        assert_eq!(scheduler.failures().value(), 1);
        assert_eq!(scheduler.cursor(), start() + TimeDelta::hours(6));
        assert_eq!(fixture.saved().failure_count.value(), 1);
        assert!(!fixture.dir.path().join("summaries").exists());
    }

    #[tokio::test]
    async fn test_failed_step_stops_chain() {
        let fixture = Fixture::new(RecordingRunner::default().failing("ar_classification.x"));
        fixture.write_images(start());
        let mut scheduler = fixture.scheduler(DEFAULT_FAILURE_THRESHOLD);
        let (_tx, mut rx) = channel();

        scheduler.tick(&mut rx).await;
        assert_eq!(fixture.runner.executables(), vec!["ar_classification.x"]);
        assert_eq!(scheduler.failures().value(), 1);
    }

    #[tokio::test]
    async fn test_success_decrements_counter() {
        let fixture = Fixture::new(RecordingRunner::default());
        StateStore::new(fixture.state_path())
            .save(&PersistedState::new(start(), FailureCounter::new(3)))
            .unwrap();
        fixture.write_images(start());
        let mut scheduler = fixture.scheduler(DEFAULT_FAILURE_THRESHOLD);
        assert_eq!(scheduler.failures().value(), 3);
        let (_tx, mut rx) = channel();

        scheduler.tick(&mut rx).await;
        assert_eq!(scheduler.failures().value(), 2);
    }

    #[tokio::test]
    async fn test_alert_once_when_threshold_exceeded() {
        let threshold = 2;
        let fixture = Fixture::new(RecordingRunner::default());
        StateStore::new(fixture.state_path())
            .save(&PersistedState::new(start(), FailureCounter::new(threshold)))
            .unwrap();
        let mut scheduler = fixture.scheduler(threshold);
        let (_tx, mut rx) = channel();

        let TickOutcome::Completed { alert, .. } = scheduler.tick(&mut rx).await else {
            panic!("tick was interrupted");
        };
        let alert = alert.unwrap();
        assert_eq!(alert.subject, "Too many errors in run_spoca_STAFF");
        assert!(alert.body.contains("There has been 3 errors"));
        assert_eq!(fixture.notifier.count(), 1);
        assert_eq!(scheduler.failures().value(), 0);
        assert_eq!(fixture.saved().failure_count.value(), 0);

        // Next failure does not re-alert.
        scheduler.tick(&mut rx).await;
        assert_eq!(fixture.notifier.count(), 1);
        assert_eq!(scheduler.failures().value(), 1);
    }

    #[tokio::test]
    async fn test_alert_delivery_failure_is_not_fatal() {
        let mut fixture = Fixture::new(RecordingRunner::default());
        fixture.notifier = Arc::new(RecordingNotifier {
            fail: true,
            ..Default::default()
        });
        let mut scheduler = fixture.scheduler(0);
        let (_tx, rx) = channel();

        assert_eq!(scheduler.run(rx, Some(2)).await, 2);
        assert_eq!(fixture.notifier.count(), 2);
        assert_eq!(scheduler.cursor(), start() + TimeDelta::hours(12));
    }

    #[tokio::test]
    async fn test_resume_from_saved_cursor() {
        let fixture = Fixture::new(RecordingRunner::default());
        let saved = start() + TimeDelta::hours(18);
        StateStore::new(fixture.state_path())
            .save(&PersistedState::new(saved, FailureCounter::default()))
            .unwrap();

        let scheduler = fixture.scheduler(DEFAULT_FAILURE_THRESHOLD);
        assert_eq!(scheduler.cursor(), saved);
        assert_eq!(scheduler.readiness(), saved + TimeDelta::days(1));
    }

    #[tokio::test]
    async fn test_replay_same_cursor_is_idempotent() {
        let fixture = Fixture::new(RecordingRunner::default());
        fixture.write_images(start());
        let (_tx, mut rx) = channel();

        fixture.scheduler(DEFAULT_FAILURE_THRESHOLD).tick(&mut rx).await;
        let map = fixture.dir.path().join("AR/20151016_000000.SegmentedMap.fits");
        let first = std::fs::read(&map).unwrap();

        // Simulate a crash before the save: rewind the state and run again.
        StateStore::new(fixture.state_path())
            .save(&PersistedState::new(start(), FailureCounter::default()))
            .unwrap();
        let mut scheduler = fixture.scheduler(DEFAULT_FAILURE_THRESHOLD);
        let TickOutcome::Completed { report, .. } = scheduler.tick(&mut rx).await else {
            panic!("tick was interrupted");
        };
        assert!(report.is_success());
        assert_eq!(std::fs::read(&map).unwrap(), first);
        assert_eq!(fixture.saved().cursor, start() + TimeDelta::hours(6));
    }

    #[tokio::test]
    async fn test_shutdown_before_tick_keeps_cursor() {
        let fixture = Fixture::new(RecordingRunner::default());
        let mut scheduler = fixture.scheduler(DEFAULT_FAILURE_THRESHOLD);
        let (tx, rx) = channel();
        tx.send(()).unwrap();

        assert_eq!(scheduler.run(rx, None).await, 0);
        assert_eq!(scheduler.cursor(), start());
        assert!(!fixture.state_path().exists());
        assert!(fixture.runner.executables().is_empty());
    }

    #[tokio::test]
    async fn test_backfill_runs_each_date_without_persisting() {
        let fixture = Fixture::new(RecordingRunner::default());
        fixture.write_images(start());
        fixture.write_images(start() + TimeDelta::hours(12));
        fixture.write_images(start() + TimeDelta::hours(18));
        let scheduler = fixture.scheduler(0);
        let (_tx, mut rx) = channel();

        let reports = scheduler
            .backfill(
                start(),
                start() + TimeDelta::hours(18),
                TimeDelta::hours(6),
                &mut rx,
            )
            .await;
        let outcomes: Vec<bool> = reports.iter().map(|r| r.is_success()).collect();
        assert_eq!(outcomes, vec![true, false, true]);
        let dates: Vec<DateTime<Utc>> = reports.iter().map(|r| r.date).collect();
        assert_eq!(
            dates,
            vec![
                start(),
                start() + TimeDelta::hours(6),
                start() + TimeDelta::hours(12)
            ]
        );
        assert_eq!(fixture.notifier.count(), 0);
        assert!(!fixture.state_path().exists());
        assert!(fixture.clock.sleeps().is_empty());
    }

    #[test]
    fn test_problem_description_names_step() {
        let report = TickReport {
            date: start(),
            inputs: ResolvedInputs::new(),
            steps: vec![crate::pipeline::StepRecord {
                name: "ar".to_string(),
                images: Vec::new(),
                status: StepStatus::Skipped(crate::pipeline::SkipReason::MissingInputs(vec![
                    193,
                ])),
            }],
        };
        let text = problem_description(&report).unwrap();
        assert!(text.contains("step 'ar'"));
        assert!(text.contains("193"));
    }
}
