//! The orchestrating event loop.
//!
//! Background work (refreshes, detail fetches, status probes, automation,
//! the change watcher) never touches [`AppState`]. Each task posts a
//! [`Message`]; the loop applies it and hands the result to a [`View`].
//!
//! ```text
//!   refresh thread ─┐
//!   rayon probes ───┤
//!   debouncer ──────┼─► select! ─► App::handle ─► AppState ─► View::render
//!   watcher ────────┤
//!   tick ───────────┤
//!   user input ─────┘
//! ```

mod state;

pub use state::{AppState, sort_worktrees};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crossbeam_channel::{self as chan, Receiver, Sender};

use crate::automation::{
    Automation, HookContext, HookPhase, HookPlan, TrustDecision, TrustDecisionRequired,
};
use crate::cache::SnapshotCache;
use crate::config::AppConfig;
use crate::detail::{DetailDebouncer, DetailResult, DetailSource, GitDetailSource};
use crate::git::{
    CommandRunner, DiffPager, ProcessRunner, RefreshEngine, Repository, Snapshot, StatusCounts,
};
use crate::notification::{ChannelNotifier, Notification, Notifier};
use crate::trust::TrustStore;
use crate::watch::ChangeWatcher;

/// Everything the loop reacts to.
#[derive(Debug)]
pub enum Message {
    /// A refresh finished. On error `snapshot` is empty and ignored.
    SnapshotLoaded {
        snapshot: Snapshot,
        error: Option<String>,
    },
    DetailReady(DetailResult),
    ChangeDetected,
    StatusPatched {
        path: PathBuf,
        counts: StatusCounts,
    },
    Notify(Notification),
    TrustDecisionRequired(TrustDecisionRequired),
    AutomationFinished {
        phase: HookPhase,
        result: Result<usize, String>,
    },
}

/// Requests from whoever drives the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserCommand {
    Select(usize),
    Refresh,
    RefreshDetails,
    RunHooks(HookPhase),
    Decide(TrustDecision),
    Quit,
}

/// What changed, passed to the view after the state was updated.
#[derive(Debug, Clone, Copy)]
pub enum Update<'a> {
    Snapshot,
    Selection,
    Detail(&'a DetailResult),
    Notice(&'a Notification),
    TrustPrompt(&'a TrustDecisionRequired),
}

pub trait View {
    fn render(&mut self, state: &AppState, update: Update<'_>) -> anyhow::Result<()>;
}

pub struct App {
    state: AppState,
    config: AppConfig,
    repo: Repository,
    main_worktree: PathBuf,
    engine: Arc<RefreshEngine>,
    debouncer: DetailDebouncer,
    watcher: ChangeWatcher,
    cache: SnapshotCache,
    automation: Automation,
    trust: TrustStore,
    tx: Sender<Message>,
    rx: Receiver<Message>,
    detail_rx: Receiver<DetailResult>,
    notify_rx: Receiver<Notification>,
    refresh_in_flight: bool,
    refresh_queued: bool,
    pending_context: Option<HookContext>,
}

impl App {
    /// Discover the repository containing `start` and wire up every
    /// component. Command failures surface as [`Message::Notify`].
    pub fn open(start: &Path, config: AppConfig, trust: TrustStore) -> anyhow::Result<Self> {
        let (notify_tx, notify_rx) = chan::unbounded();
        let notifier: Arc<dyn Notifier> = Arc::new(ChannelNotifier::new(notify_tx));
        let runner: Arc<dyn CommandRunner> = Arc::new(ProcessRunner::new(notifier));
        let repo = Repository::discover(start, runner)?;
        Self::with_repository(repo, config, trust, notify_rx)
    }

    /// Build around an existing repository handle. `notifications` should
    /// receive whatever the repository's runner reports.
    pub fn with_repository(
        repo: Repository,
        config: AppConfig,
        trust: TrustStore,
        notifications: Receiver<Notification>,
    ) -> anyhow::Result<Self> {
        let runner = Arc::clone(repo.runner());
        let engine = Arc::new(RefreshEngine::new(repo.root(), Arc::clone(&runner))?);

        let pager = DiffPager::detect(&config.git_pager, config.git_pager_args.clone());
        let source: Arc<dyn DetailSource> = Arc::new(GitDetailSource::new(
            runner,
            config.diff_limits(),
            pager,
            config.log_entries(),
        ));
        let (detail_tx, detail_rx) = chan::unbounded();
        let debouncer = DetailDebouncer::new(source, detail_tx);

        let main_worktree = repo.main_worktree_path();
        let cache = SnapshotCache::new(&config.worktree_dir(), &repo.repo_key());
        let automation = Automation::new(main_worktree.clone(), config.trust_mode);
        let (tx, rx) = chan::unbounded();

        log::debug!(
            "Opened {} (cache {})",
            repo.root().display(),
            cache.path().display()
        );

        Ok(Self {
            state: AppState::new(config.sort_by_active),
            config,
            repo,
            main_worktree,
            engine,
            debouncer,
            watcher: ChangeWatcher::new(),
            cache,
            automation,
            trust,
            tx,
            rx,
            detail_rx,
            notify_rx: notifications,
            refresh_in_flight: false,
            refresh_queued: false,
            pending_context: None,
        })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    pub fn cache(&self) -> &SnapshotCache {
        &self.cache
    }

    pub fn watcher(&self) -> &ChangeWatcher {
        &self.watcher
    }

    /// Show the cached snapshot, if there is one. Returns whether it was used.
    pub fn load_cached(&mut self) -> bool {
        match self.cache.load() {
            Some(snapshot) if !snapshot.is_empty() => {
                self.state.apply_snapshot(snapshot, true);
                true
            }
            _ => false,
        }
    }

    /// Refresh on the calling thread and persist the result.
    pub fn refresh_once(&mut self) -> anyhow::Result<()> {
        let snapshot = self.engine.try_refresh()?;
        self.save_cache(&snapshot);
        self.state.apply_snapshot(snapshot, false);
        Ok(())
    }

    /// Drive the loop until [`UserCommand::Quit`] or `input` disconnects.
    pub fn run(&mut self, input: &Receiver<UserCommand>, view: &mut dyn View) -> anyhow::Result<()> {
        if self.load_cached() {
            view.render(&self.state, Update::Snapshot)?;
        }
        self.watcher.start(&self.repo, self.config.auto_refresh);
        self.request_refresh();

        let ticker = match self.config.refresh_interval() {
            Some(interval) => chan::tick(interval),
            None => chan::never(),
        };
        let messages = self.rx.clone();
        let mut details = self.detail_rx.clone();
        let mut notices = self.notify_rx.clone();
        let signals = self.watcher.signals();

        let result = loop {
            // A disconnected receiver is always ready; park it
            let mut closed = (false, false);
            let step = chan::select! {
                recv(messages) -> msg => match msg {
                    Ok(msg) => self.handle(msg, view),
                    Err(_) => break Ok(()),
                },
                recv(details) -> result => match result {
                    Ok(result) => self.handle(Message::DetailReady(result), view),
                    Err(_) => {
                        closed.0 = true;
                        Ok(())
                    }
                },
                recv(notices) -> notice => match notice {
                    Ok(notice) => self.handle(Message::Notify(notice), view),
                    Err(_) => {
                        closed.1 = true;
                        Ok(())
                    }
                },
                recv(signals) -> _ => self.handle(Message::ChangeDetected, view),
                recv(ticker) -> _ => {
                    self.request_refresh();
                    Ok(())
                }
                recv(input) -> cmd => match cmd {
                    Ok(UserCommand::Quit) | Err(_) => break Ok(()),
                    Ok(cmd) => self.apply_command(cmd, view),
                },
            };
            if let Err(e) = step {
                break Err(e);
            }
            if closed.0 {
                details = chan::never();
            }
            if closed.1 {
                notices = chan::never();
            }
        };

        self.watcher.stop();
        self.debouncer.cancel();
        result
    }

    /// Apply one message to the state.
    pub fn handle(&mut self, msg: Message, view: &mut dyn View) -> anyhow::Result<()> {
        match msg {
            Message::SnapshotLoaded { snapshot, error } => {
                self.refresh_in_flight = false;
                self.state.set_refreshing(false);
                match error {
                    Some(error) => {
                        self.state.record_refresh_error(error.clone());
                        self.notice(view, Notification::error(error))?;
                    }
                    None => {
                        self.save_cache(&snapshot);
                        self.state.apply_snapshot(snapshot, false);
                        view.render(&self.state, Update::Snapshot)?;
                        if let Some(index) = self.state.selected_index() {
                            self.debouncer.request_now(index, self.state.worktrees());
                        }
                    }
                }
                if std::mem::take(&mut self.refresh_queued) {
                    self.request_refresh();
                }
            }
            Message::DetailReady(result) => {
                let path = result.path.clone();
                if self.state.apply_detail(result)
                    && let Some(detail) = self.state.detail_for(&path)
                {
                    view.render(&self.state, Update::Detail(detail))?;
                }
            }
            Message::ChangeDetected => self.request_refresh(),
            Message::StatusPatched { path, counts } => {
                if self.state.patch_status(&path, counts) {
                    view.render(&self.state, Update::Snapshot)?;
                }
            }
            Message::Notify(notification) => self.notice(view, notification)?,
            Message::TrustDecisionRequired(request) => {
                self.state.set_pending_trust(Some(request));
                if let Some(request) = self.state.pending_trust() {
                    view.render(&self.state, Update::TrustPrompt(request))?;
                }
            }
            Message::AutomationFinished { phase, result } => {
                let notification = match result {
                    Ok(count) => Notification::info(format!("Ran {count} {phase} command(s)")),
                    Err(e) => Notification::error(format!("{phase} commands failed: {e}")),
                };
                self.notice(view, notification)?;
            }
        }
        Ok(())
    }

    /// Apply one user request. [`UserCommand::Quit`] is the caller's concern.
    pub fn apply_command(&mut self, cmd: UserCommand, view: &mut dyn View) -> anyhow::Result<()> {
        match cmd {
            UserCommand::Select(index) => {
                if !self.state.select(index) {
                    return self.notice(
                        view,
                        Notification::warning(format!("No worktree at index {index}")),
                    );
                }
                view.render(&self.state, Update::Selection)?;
                if let Some(detail) = self.state.selected_detail() {
                    view.render(&self.state, Update::Detail(detail))?;
                }
                self.debouncer
                    .on_selection_changed(index, self.state.worktrees());
            }
            UserCommand::Refresh => self.request_refresh(),
            UserCommand::RefreshDetails => self.refresh_details(),
            UserCommand::RunHooks(phase) => self.start_automation(phase, view)?,
            UserCommand::Decide(decision) => self.resolve_trust(decision, view)?,
            UserCommand::Quit => {}
        }
        Ok(())
    }

    /// Start a background refresh, or queue one if a refresh is running.
    pub fn request_refresh(&mut self) {
        if self.refresh_in_flight {
            self.refresh_queued = true;
            return;
        }

        let engine = Arc::clone(&self.engine);
        let tx = self.tx.clone();
        let spawned = std::thread::Builder::new()
            .name("treeline-refresh".into())
            .spawn(move || {
                let msg = match engine.try_refresh() {
                    Ok(snapshot) => Message::SnapshotLoaded {
                        snapshot,
                        error: None,
                    },
                    Err(e) => Message::SnapshotLoaded {
                        snapshot: Snapshot::new(Vec::new()),
                        error: Some(format!("Failed to list worktrees: {e}")),
                    },
                };
                let _ = tx.send(msg);
            });

        match spawned {
            Ok(_) => {
                self.refresh_in_flight = true;
                self.state.set_refreshing(true);
            }
            Err(e) => log::warn!("Failed to start refresh: {e}"),
        }
    }

    /// Drop cached details for the selection, fetch them again and re-probe
    /// its status counters.
    fn refresh_details(&mut self) {
        let Some((index, path)) = self
            .state
            .selected_index()
            .zip(self.state.selected().map(|wt| wt.path.clone()))
        else {
            return;
        };
        self.state.invalidate_detail(&path);
        self.debouncer.request_now(index, self.state.worktrees());

        let engine = Arc::clone(&self.engine);
        let tx = self.tx.clone();
        rayon::spawn(move || {
            let counts = engine.probe_status(&path);
            let _ = tx.send(Message::StatusPatched { path, counts });
        });
    }

    fn start_automation(&mut self, phase: HookPhase, view: &mut dyn View) -> anyhow::Result<()> {
        let Some(record) = self.state.selected() else {
            return self.notice(view, Notification::warning("No worktree selected"));
        };
        let ctx = HookContext::for_record(record, &self.main_worktree);
        match self.automation.plan(phase, &self.trust) {
            Ok(plan) => self.dispatch_plan(plan, phase, ctx, view),
            Err(e) => self.notice(
                view,
                Notification::error(format!("Failed to load automation: {e:#}")),
            ),
        }
    }

    fn resolve_trust(&mut self, decision: TrustDecision, view: &mut dyn View) -> anyhow::Result<()> {
        let (Some(request), Some(ctx)) = (
            self.state.pending_trust().cloned(),
            self.pending_context.take(),
        ) else {
            return self.notice(view, Notification::warning("No trust decision pending"));
        };
        self.state.set_pending_trust(None);

        match self.automation.decide(decision, &request, &mut self.trust) {
            Ok(plan) => self.dispatch_plan(plan, request.phase, ctx, view),
            Err(e) => self.notice(
                view,
                Notification::error(format!("Failed to record trust: {e:#}")),
            ),
        }
    }

    fn dispatch_plan(
        &mut self,
        plan: HookPlan,
        phase: HookPhase,
        ctx: HookContext,
        view: &mut dyn View,
    ) -> anyhow::Result<()> {
        match plan {
            HookPlan::Nothing => {
                self.notice(view, Notification::info(format!("No {phase} commands configured")))
            }
            HookPlan::Blocked => self.notice(
                view,
                Notification::warning(format!(
                    "Skipped {phase} commands from untrusted {}",
                    self.automation.config_path().display()
                )),
            ),
            HookPlan::Cancelled => {
                self.notice(view, Notification::info(format!("Cancelled {phase} commands")))
            }
            HookPlan::NeedsTrust(request) => {
                self.pending_context = Some(ctx);
                let _ = self.tx.send(Message::TrustDecisionRequired(request));
                Ok(())
            }
            HookPlan::Run(commands) => {
                let automation = self.automation.clone();
                let tx = self.tx.clone();
                let spawned = std::thread::Builder::new()
                    .name(format!("treeline-{phase}"))
                    .spawn(move || {
                        let result = automation
                            .run(&commands, &ctx)
                            .map(|outputs| {
                                for out in &outputs {
                                    log::debug!("$ {}\n{}", out.command, out.output);
                                }
                                outputs.len()
                            })
                            .map_err(|e| e.to_string());
                        let _ = tx.send(Message::AutomationFinished { phase, result });
                    });
                if let Err(e) = spawned {
                    return self.notice(
                        view,
                        Notification::error(format!("Failed to start {phase} commands: {e}")),
                    );
                }
                Ok(())
            }
        }
    }

    fn notice(&self, view: &mut dyn View, notification: Notification) -> anyhow::Result<()> {
        log::debug!("[{}] {}", notification.severity, notification.message);
        view.render(&self.state, Update::Notice(&notification))
    }

    fn save_cache(&self, snapshot: &Snapshot) {
        if let Err(e) = self.cache.save(snapshot) {
            log::warn!("Failed to write snapshot cache: {e:#}");
        }
    }
}
