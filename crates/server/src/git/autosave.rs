// Auto-save scheduler: rate-limited, non-overlapping git snapshots of the
// uploads directory.
//
// Triggers come from a periodic timer, a delayed post-upload call and the
// manual endpoint. All of them funnel into `AutoSaver::attempt_save`, which
// drops (never queues) a trigger that arrives while another attempt is in
// flight or before the minimum interval has elapsed. Repository access is
// abstracted via `SaveBackend` for testing.

use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use gallery_common::media::count_images;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::message::SaveLabel;
use super::worker::{CommandRunner, GitError, GitWorker, SystemRunner};

/// Delay between arming the timer and the first attempt.
pub const WARM_UP_DELAY: Duration = Duration::from_secs(5);

/// Delay between an upload response and the save attempt it schedules.
pub const UPLOAD_SETTLE_DELAY: Duration = Duration::from_secs(10);

/// Default minimum time between completed attempts.
pub const DEFAULT_MIN_COMMIT_INTERVAL: Duration = Duration::from_secs(120);

// ── Backend trait ───────────────────────────────────────────────────

/// Failures reported by a save backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SaveError {
    /// The tool could not be started at all.
    #[error("failed to run `{command}`: {message}")]
    Spawn { command: String, message: String },

    /// Staging, committing or the status query exited unsuccessfully.
    #[error("`{command}` failed with code {code:?}: {stderr}")]
    CommandFailed { command: String, code: Option<i32>, stderr: String },

    /// The remote rejected the push or could not be reached.
    #[error("push to `{remote}` failed: {stderr}")]
    RemoteUnavailable { remote: String, stderr: String },
}

impl From<GitError> for SaveError {
    fn from(error: GitError) -> Self {
        match error {
            GitError::NoPathspec => SaveError::CommandFailed {
                command: "git add".to_string(),
                code: None,
                stderr: GitError::NoPathspec.to_string(),
            },
            GitError::Spawn { command, reason } => SaveError::Spawn { command, message: reason },
            GitError::Exit { command, code, output } => {
                SaveError::CommandFailed { command, code, stderr: output.trim().to_string() }
            }
        }
    }
}

/// Repository operations needed by the scheduler. Trait-based for testability.
pub trait SaveBackend: Send + Sync {
    /// Whether the target carries repository metadata. Must not run the tool.
    fn is_repository(&self) -> bool;

    /// Whether the working tree has anything to commit.
    fn pending_changes(&self) -> Result<bool, SaveError>;

    /// Stage everything, commit with `message` and push, as one operation.
    fn commit_and_push(&self, message: &str) -> Result<(), SaveError>;

    /// Stage everything and commit with `message`, without pushing.
    fn commit_local(&self, message: &str) -> Result<(), SaveError>;
}

// ── Git backend ─────────────────────────────────────────────────────

/// `SaveBackend` over the git command line.
#[derive(Debug, Clone)]
pub struct GitSaveBackend<R = SystemRunner> {
    worker: GitWorker<R>,
    pathspec: String,
    remote: String,
    branch: String,
}

impl GitSaveBackend<SystemRunner> {
    pub fn new(
        repo_root: impl Into<PathBuf>,
        uploads_dir: &Path,
        remote: impl Into<String>,
        branch: impl Into<String>,
    ) -> Self {
        Self::with_runner(repo_root, uploads_dir, remote, branch, SystemRunner)
    }
}

impl<R: CommandRunner> GitSaveBackend<R> {
    pub fn with_runner(
        repo_root: impl Into<PathBuf>,
        uploads_dir: &Path,
        remote: impl Into<String>,
        branch: impl Into<String>,
        runner: R,
    ) -> Self {
        let repo_root = repo_root.into();
        let pathspec = uploads_pathspec(&repo_root, uploads_dir);
        Self {
            worker: GitWorker::with_runner(repo_root, runner),
            pathspec,
            remote: remote.into(),
            branch: branch.into(),
        }
    }

    pub fn pathspec(&self) -> &str {
        &self.pathspec
    }

    fn stage_and_commit(&self, message: &str) -> Result<(), GitError> {
        self.worker.add_all(&[self.pathspec.as_str()])?;
        self.worker.commit(message)?;
        Ok(())
    }
}

impl<R: CommandRunner> SaveBackend for GitSaveBackend<R> {
    fn is_repository(&self) -> bool {
        self.worker.is_repository()
    }

    fn pending_changes(&self) -> Result<bool, SaveError> {
        let output = self.worker.status_porcelain(&[self.pathspec.as_str()])?;
        Ok(!output.stdout.trim().is_empty())
    }

    fn commit_and_push(&self, message: &str) -> Result<(), SaveError> {
        self.stage_and_commit(message)?;
        self.worker.push(&self.remote, &self.branch).map_err(|error| {
            SaveError::RemoteUnavailable {
                remote: self.remote.clone(),
                stderr: error.output().trim().to_string(),
            }
        })?;
        Ok(())
    }

    fn commit_local(&self, message: &str) -> Result<(), SaveError> {
        match self.stage_and_commit(message) {
            Ok(()) => Ok(()),
            // The combined operation commits before it pushes, so a failed
            // push leaves the snapshot already recorded locally.
            Err(error) if is_nothing_to_commit(&error) => Ok(()),
            Err(error) => Err(error.into()),
        }
    }
}

fn is_nothing_to_commit(error: &GitError) -> bool {
    matches!(error, GitError::Exit { command, .. } if command.starts_with("git commit"))
        && error.output().contains("nothing to commit")
}

/// Pathspec of `uploads_dir` relative to `repo_root` (`.` for the root itself).
fn uploads_pathspec(repo_root: &Path, uploads_dir: &Path) -> String {
    let root = normalize_for_prefix(repo_root);
    let uploads = normalize_for_prefix(uploads_dir);
    match uploads.strip_prefix(&root) {
        Ok(relative) if relative.as_os_str().is_empty() => ".".to_string(),
        Ok(relative) => relative
            .components()
            .map(|component| component.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/"),
        Err(_) => uploads_dir.display().to_string(),
    }
}

fn normalize_for_prefix(path: &Path) -> PathBuf {
    if let Ok(canonical) = std::fs::canonicalize(path) {
        return canonical;
    }
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().map(|cwd| cwd.join(path)).unwrap_or_else(|_| path.to_path_buf())
    };
    absolute.components().filter(|component| !matches!(component, Component::CurDir)).collect()
}

// ── Clock ───────────────────────────────────────────────────────────

/// Time source for rate limiting and commit labels.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn wall_now(&self) -> DateTime<Local>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall_now(&self) -> DateTime<Local> {
        Local::now()
    }
}

// ── Outcomes ────────────────────────────────────────────────────────

/// Why an attempt stopped before touching the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another attempt is in flight.
    InFlight,
    /// The minimum interval has not elapsed since the last completed attempt.
    TooSoon { remaining: Duration },
    /// The target has no repository metadata.
    NotARepository,
}

/// Terminal state of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Skipped(SkipReason),
    /// The status query failed; nothing was committed.
    StatusFailed,
    /// The working tree was clean.
    NoChanges,
    /// Committed and pushed.
    Pushed { photos: usize },
    /// Push failed; the snapshot exists only in the local repository.
    CommittedLocally { photos: usize },
    /// Both the combined and the local-only commit failed.
    Failed { photos: usize },
}

impl SaveOutcome {
    /// Whether the attempt counts for the minimum interval.
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Pushed { .. } | Self::CommittedLocally { .. } | Self::Failed { .. })
    }

    /// Short label for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Skipped(SkipReason::InFlight) => "skipped_in_flight",
            Self::Skipped(SkipReason::TooSoon { .. }) => "skipped_too_soon",
            Self::Skipped(SkipReason::NotARepository) => "skipped_not_a_repository",
            Self::StatusFailed => "status_failed",
            Self::NoChanges => "no_changes",
            Self::Pushed { .. } => "pushed",
            Self::CommittedLocally { .. } => "committed_locally",
            Self::Failed { .. } => "failed",
        }
    }
}

// ── Scheduler ───────────────────────────────────────────────────────

/// Owns the save state for one uploads directory.
///
/// Constructed once by the process bootstrap and shared by `Arc` with the
/// HTTP handlers and the timers.
pub struct AutoSaver<B, C = SystemClock> {
    uploads_dir: PathBuf,
    min_commit_interval: Duration,
    in_flight: AtomicBool,
    last_commit_at: Mutex<Instant>,
    backend: B,
    clock: C,
}

impl<B: SaveBackend> AutoSaver<B> {
    pub fn new(uploads_dir: impl Into<PathBuf>, min_commit_interval: Duration, backend: B) -> Self {
        Self::with_clock(uploads_dir, min_commit_interval, backend, SystemClock)
    }
}

impl<B: SaveBackend, C: Clock> AutoSaver<B, C> {
    /// The rate limit starts counting from construction time.
    pub fn with_clock(
        uploads_dir: impl Into<PathBuf>,
        min_commit_interval: Duration,
        backend: B,
        clock: C,
    ) -> Self {
        let started_at = clock.now();
        Self {
            uploads_dir: uploads_dir.into(),
            min_commit_interval,
            in_flight: AtomicBool::new(false),
            last_commit_at: Mutex::new(started_at),
            backend,
            clock,
        }
    }

    pub fn uploads_dir(&self) -> &Path {
        &self.uploads_dir
    }

    pub fn min_commit_interval(&self) -> Duration {
        self.min_commit_interval
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn last_commit_at(&self) -> Instant {
        *self.last_commit_at.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Run one attempt. Never fails; the outcome is informational.
    pub fn attempt_save(&self) -> SaveOutcome {
        if self.is_in_flight() {
            debug!("auto-save already in progress, skipping");
            return SaveOutcome::Skipped(SkipReason::InFlight);
        }

        if let Some(remaining) = self.interval_remaining() {
            debug!(wait_secs = ceil_secs(remaining), "auto-save too soon, skipping");
            return SaveOutcome::Skipped(SkipReason::TooSoon { remaining });
        }

        if !self.backend.is_repository() {
            warn!(
                uploads_dir = %self.uploads_dir.display(),
                "auto-save target is not a git repository; run `git init` to enable it"
            );
            return SaveOutcome::Skipped(SkipReason::NotARepository);
        }

        let Some(_guard) = InFlightGuard::try_enter(&self.in_flight) else {
            debug!("auto-save started concurrently, skipping");
            return SaveOutcome::Skipped(SkipReason::InFlight);
        };

        // An attempt that finished between the first check and the flag
        // restarts the interval.
        if let Some(remaining) = self.interval_remaining() {
            debug!(wait_secs = ceil_secs(remaining), "auto-save completed concurrently, skipping");
            return SaveOutcome::Skipped(SkipReason::TooSoon { remaining });
        }

        self.commit_pending()
    }

    fn interval_remaining(&self) -> Option<Duration> {
        let elapsed = self.clock.now().saturating_duration_since(self.last_commit_at());
        self.min_commit_interval.checked_sub(elapsed).filter(|remaining| !remaining.is_zero())
    }

    fn commit_pending(&self) -> SaveOutcome {
        match self.backend.pending_changes() {
            Ok(true) => {}
            Ok(false) => {
                info!("no changes to auto-save");
                return SaveOutcome::NoChanges;
            }
            Err(error) => {
                error!(%error, "failed to query repository status");
                return SaveOutcome::StatusFailed;
            }
        }

        let photos = count_images(&self.uploads_dir).unwrap_or_else(|error| {
            warn!(
                %error,
                uploads_dir = %self.uploads_dir.display(),
                "failed to count images for commit label"
            );
            0
        });
        let message = SaveLabel::new(photos, self.clock.wall_now()).render();
        info!(photos, "committing uploads");

        let outcome = match self.backend.commit_and_push(&message) {
            Ok(()) => {
                info!(
                    photos,
                    next_in_secs = self.min_commit_interval.as_secs(),
                    "auto-saved uploads to remote"
                );
                SaveOutcome::Pushed { photos }
            }
            Err(push_error) => {
                warn!(error = %push_error, "auto-save failed, falling back to local commit");
                match self.backend.commit_local(&message) {
                    Ok(()) => {
                        warn!(
                            photos,
                            "changes committed locally (push failed); run `git push` manually when online"
                        );
                        SaveOutcome::CommittedLocally { photos }
                    }
                    Err(error) => {
                        error!(%error, "local auto-save commit failed");
                        SaveOutcome::Failed { photos }
                    }
                }
            }
        };

        *self.last_commit_at.lock().unwrap_or_else(PoisonError::into_inner) = self.clock.now();
        outcome
    }
}

impl<B, C> AutoSaver<B, C>
where
    B: SaveBackend + 'static,
    C: Clock + 'static,
{
    /// Arm the warm-up attempt and the recurring attempt every
    /// `interval_minutes` minutes (at least one).
    pub fn start_auto_save(self: &Arc<Self>, interval_minutes: u64) -> AutoSaveHandle {
        let period = Duration::from_secs(interval_minutes.max(1) * 60);
        info!(interval_minutes = interval_minutes.max(1), "auto-save enabled");
        self.start_periodic(WARM_UP_DELAY, period)
    }

    /// Schedule one attempt after `warm_up`, then one every `period`.
    pub fn start_periodic(self: &Arc<Self>, warm_up: Duration, period: Duration) -> AutoSaveHandle {
        let warm_up_task = self.schedule_after(warm_up);

        let saver = Arc::clone(self);
        let periodic_task = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut ticker = tokio::time::interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                run_attempt(Arc::clone(&saver), "periodic").await;
            }
        });

        AutoSaveHandle { warm_up_task, periodic_task }
    }

    /// Fire-and-forget: one attempt after `delay`.
    pub fn schedule_after(self: &Arc<Self>, delay: Duration) -> JoinHandle<()> {
        let saver = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            run_attempt(saver, "delayed").await;
        })
    }
}

/// Fire-and-forget entry points used by the HTTP layer. Object-safe so the
/// router does not depend on the backend type.
pub trait SaveScheduler: Send + Sync {
    /// Run one attempt in the background as soon as possible.
    fn trigger_now(self: Arc<Self>);

    /// Run one attempt in the background after `delay`.
    fn trigger_after(self: Arc<Self>, delay: Duration);
}

impl<B, C> SaveScheduler for AutoSaver<B, C>
where
    B: SaveBackend + 'static,
    C: Clock + 'static,
{
    fn trigger_now(self: Arc<Self>) {
        tokio::spawn(run_attempt(self, "manual"));
    }

    fn trigger_after(self: Arc<Self>, delay: Duration) {
        let _ = self.schedule_after(delay);
    }
}

async fn run_attempt<B, C>(saver: Arc<AutoSaver<B, C>>, trigger: &'static str)
where
    B: SaveBackend + 'static,
    C: Clock + 'static,
{
    match tokio::task::spawn_blocking(move || saver.attempt_save()).await {
        Ok(outcome) => debug!(trigger, outcome = outcome.kind(), "auto-save trigger finished"),
        Err(join_error) => error!(?join_error, trigger, "auto-save attempt panicked"),
    }
}

/// Join handles of the armed timers. Dropping the handle leaves the timers
/// running until process exit.
pub struct AutoSaveHandle {
    warm_up_task: JoinHandle<()>,
    periodic_task: JoinHandle<()>,
}

impl AutoSaveHandle {
    pub fn is_running(&self) -> bool {
        !self.periodic_task.is_finished()
    }

    #[cfg(test)]
    fn abort(&self) {
        self.warm_up_task.abort();
        self.periodic_task.abort();
    }
}

/// Clears the in-flight flag on every exit path.
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn try_enter(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).ok()?;
        Some(Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    duration.as_millis().div_ceil(1000) as u64
}
