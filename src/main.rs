mod models;
mod screens;
mod services;

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use eframe::egui;
use screens::admin::{AdminAction, AdminForm};
use screens::answer_generation::{AnswerAction, AnswerPanel};
use screens::clue_upload::ClueUploadAction;
use screens::header::HeaderAction;
use screens::profile_setup::ProfileSetupAction;
use screens::sign_in::SignInAction;
use screens::toasts::ToastAction;
use services::config_loader::{self, RiddlerConfig};
use services::local_backend::LocalBackend;
use services::media;
use services::notifications::{Toasts, UserAction};
use services::query_cache::{QueryState, QueryValue};
use services::remote_data::{RemoteData, RemoteOutcome};
use services::session::{FileIdentityProvider, Session};
use services::upload_queue::UploadQueue;
use services::validation::ValidationError;
use tokio::runtime::Runtime;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use tracing_unwrap::ResultExt;

use crate::models::{ClueKind, Principal, SourceFile, UploadStatus, UserRole};

struct RiddlerApp {
    config: RiddlerConfig,
    // Owns the worker threads remote calls run on.
    _runtime: Runtime,
    remote: RemoteData,
    session: Session,
    toasts: Toasts,
    riddle_text: String,
    queues: [UploadQueue; 3],
    answer_panel: AnswerPanel,
    profile_name: String,
    admin_form: AdminForm,
}

fn queue_for(queues: &mut [UploadQueue], kind: ClueKind) -> Option<&mut UploadQueue> {
    queues.iter_mut().find(|queue| queue.kind() == kind)
}

impl RiddlerApp {
    fn new(config: RiddlerConfig, runtime: Runtime) -> Self {
        let backend = Arc::new(LocalBackend::new(&config.backend));
        let mut remote = RemoteData::new(runtime.handle().clone(), backend);

        let mut session = Session::new(Box::new(FileIdentityProvider::new(
            config.session.session_file.clone(),
        )));
        session.init();
        remote.set_identity(session.identity().cloned());

        let toasts = Toasts::new(
            Duration::from_secs_f32(config.ui.toast_seconds.max(0.5)),
            config.ui.max_toasts,
        );

        Self {
            config,
            _runtime: runtime,
            remote,
            session,
            toasts,
            riddle_text: String::new(),
            queues: ClueKind::ALL.map(UploadQueue::new),
            answer_panel: AnswerPanel::default(),
            profile_name: String::new(),
            admin_form: AdminForm::default(),
        }
    }

    fn sign_in(&mut self) {
        match self.session.sign_in() {
            Ok(identity) => {
                info!("Transition: SignedOut -> SignedIn");
                self.remote.set_identity(Some(identity));
            }
            Err(err) => {
                error!("Sign in failed: {err:#}");
                self.toasts.error("Sign in failed. Please try again.");
            }
        }
    }

    fn sign_out(&mut self) {
        if let Err(err) = self.session.sign_out() {
            warn!("Session cleanup failed: {err:#}");
        }
        info!("Transition: SignedIn -> SignedOut");
        self.remote.set_identity(None);
        for queue in &mut self.queues {
            queue.clear();
        }
        self.answer_panel.reset();
        self.riddle_text.clear();
        self.profile_name.clear();
        self.admin_form = AdminForm::default();
    }

    fn apply_outcomes(&mut self) {
        for outcome in self.remote.pump() {
            match outcome {
                RemoteOutcome::UploadProgress {
                    kind,
                    local_id,
                    percent,
                } => {
                    if let Some(queue) = queue_for(&mut self.queues, kind) {
                        queue.record_progress(local_id, percent);
                    }
                }
                RemoteOutcome::UploadFinished {
                    kind,
                    local_id,
                    result,
                } => {
                    let Some(queue) = queue_for(&mut self.queues, kind) else {
                        continue;
                    };
                    if let Some(notice) = queue.record_result(local_id, result) {
                        self.toasts.push(notice);
                    }
                }
                RemoteOutcome::ProfileSaved(result) => match result {
                    Ok(()) => {
                        self.profile_name.clear();
                        self.toasts.success("Profile saved");
                    }
                    Err(err) => self.toasts.failure(&err, UserAction::SaveProfile),
                },
                RemoteOutcome::AnswerGenerated { mutation, result } => {
                    if !self.answer_panel.draft.finish(mutation, &result) {
                        continue;
                    }
                    if let Err(err) = result {
                        self.toasts.failure(&err, UserAction::GenerateAnswer);
                    }
                }
                RemoteOutcome::RoleAssigned {
                    principal,
                    role,
                    result,
                } => match result {
                    Ok(()) => {
                        self.toasts.success(format!(
                            "Assigned role {} to {}",
                            role.label(),
                            principal.abbreviated()
                        ));
                        if self.admin_form.principal.trim() == principal.as_str() {
                            self.admin_form.principal.clear();
                        }
                    }
                    Err(err) => self.toasts.failure(&err, UserAction::AssignRole),
                },
                RemoteOutcome::ReadFailed { key, error } => {
                    self.toasts.failure(&error, UserAction::Load(key.kind));
                }
            }
        }
    }

    fn handle_upload_action(&mut self, kind: ClueKind, action: ClueUploadAction) {
        let Some(queue) = queue_for(&mut self.queues, kind) else {
            return;
        };
        let mut tickets = Vec::new();
        let mut problems = Vec::new();

        match action {
            ClueUploadAction::Stay => {}
            ClueUploadAction::Selected(files) => {
                let outcome = queue.select_files(files);
                for rejection in outcome.rejected {
                    self.toasts.invalid(&rejection);
                }
            }
            ClueUploadAction::Upload(local_id) => match queue.begin_upload(local_id) {
                Ok(ticket) => tickets.push(ticket),
                Err(err) => problems.push(err),
            },
            ClueUploadAction::UploadAllPending => {
                let pending: Vec<_> = queue
                    .items()
                    .iter()
                    .filter(|item| item.status == UploadStatus::Pending)
                    .map(|item| item.local_id)
                    .collect();
                for local_id in pending {
                    match queue.begin_upload(local_id) {
                        Ok(ticket) => tickets.push(ticket),
                        Err(err) => problems.push(err),
                    }
                }
            }
            ClueUploadAction::Remove(local_id) => {
                if let Err(err) = queue.remove(local_id) {
                    problems.push(err);
                }
            }
            ClueUploadAction::ClearAll => {
                let discarded = queue.clear();
                if discarded > 0 {
                    info!("Cleared {} queue with {} upload(s) in flight", kind, discarded);
                }
            }
        }

        for err in problems {
            warn!("Rejected {} queue action: {}", kind, err);
            self.toasts.error(err.to_string());
        }
        for ticket in tickets {
            info!("Uploading {} {} ({})", kind, ticket.local_id, ticket.source.name);
            self.remote.upload_clue(ticket);
        }
    }

    fn handle_answer_action(&mut self, action: AnswerAction) {
        match action {
            AnswerAction::Stay => {}
            AnswerAction::Generate => match self.answer_panel.draft.prepare(&self.riddle_text) {
                Ok(request) => {
                    let mutation = self.remote.generate_answer(request.clone());
                    self.answer_panel.draft.mark_pending(mutation, request);
                }
                Err(err) => self.toasts.invalid(&err),
            },
            AnswerAction::Rejected(err) => self.toasts.invalid(&err),
            AnswerAction::Verified => self.toasts.success("Answer generated successfully!"),
        }
    }

    /// Routes files dropped onto the window to the queue matching their media type.
    fn accept_dropped_files(&mut self, ctx: &egui::Context) {
        let dropped = ctx.input(|i| i.raw.dropped_files.clone());
        if dropped.is_empty() || !self.session.is_authenticated() {
            return;
        }

        let mut by_kind: Vec<(ClueKind, Vec<SourceFile>)> = Vec::new();
        for file in dropped {
            let label = file
                .path
                .as_ref()
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| file.name.clone());
            let source = match media::dropped_source(&file.name, file.path, file.bytes) {
                Ok(source) => source,
                Err(err) => {
                    warn!("Skipping dropped file {}: {err:#}", label);
                    continue;
                }
            };
            let Some(kind) = media::kind_of(source.media_type.as_deref()) else {
                self.toasts.invalid(&ValidationError::UnsupportedFile {
                    file_name: source.name,
                });
                continue;
            };
            match by_kind.iter_mut().find(|(k, _)| *k == kind) {
                Some((_, files)) => files.push(source),
                None => by_kind.push((kind, vec![source])),
            }
        }

        for (kind, files) in by_kind {
            info!("Dropped {} {} file(s)", files.len(), kind);
            self.handle_upload_action(kind, ClueUploadAction::Selected(files));
        }
    }

    fn save_profile(&mut self) {
        match self.remote.save_profile(&self.profile_name) {
            Ok(mutation) => info!("Saving profile ({})", mutation),
            Err(err) => self.toasts.invalid(&err),
        }
    }

    fn assign_role(&mut self) {
        match self
            .remote
            .assign_role(&self.admin_form.principal, self.admin_form.role)
        {
            Ok(mutation) => info!("Assigning role ({})", mutation),
            Err(err) => self.toasts.invalid(&err),
        }
    }

    fn look_up_profile(&mut self) {
        let principal = self.admin_form.principal.trim();
        if principal.is_empty() {
            self.toasts.invalid(&ValidationError::BlankPrincipal);
            return;
        }
        info!("Looking up profile of {}", principal);
        self.admin_form.looked_up = Some(Principal(principal.to_string()));
    }

    fn profile_name(&mut self) -> Option<String> {
        match self.remote.caller_profile() {
            QueryState::Ready {
                value: QueryValue::Profile(Some(profile)),
                ..
            } => Some(profile.name.clone()),
            _ => None,
        }
    }

    fn needs_profile(&mut self) -> bool {
        matches!(
            self.remote.caller_profile(),
            QueryState::Ready {
                value: QueryValue::Profile(None),
                ..
            }
        )
    }

    fn caller_role(&mut self) -> Option<UserRole> {
        match self.remote.caller_role() {
            QueryState::Ready {
                value: QueryValue::Role(role),
                ..
            } => Some(*role),
            _ => None,
        }
    }

    fn is_admin(&mut self) -> bool {
        matches!(
            self.remote.caller_is_admin(),
            QueryState::Ready {
                value: QueryValue::Flag(true),
                ..
            }
        )
    }

    fn content_ui(&mut self, ui: &mut egui::Ui) {
        screens::riddle_text::ui(ui, &mut self.riddle_text);
        ui.add_space(8.0);

        for kind in ClueKind::ALL {
            let action = match self.queues.iter().find(|queue| queue.kind() == kind) {
                Some(queue) => screens::clue_upload::ui(ui, queue),
                None => ClueUploadAction::Stay,
            };
            self.handle_upload_action(kind, action);
            ui.add_space(8.0);
        }

        let action = screens::answer_generation::ui(
            ui,
            &mut self.answer_panel,
            &mut self.remote,
            &self.riddle_text,
            self.config.ui.preview_max_dimension,
        );
        self.handle_answer_action(action);

        if self.is_admin() {
            ui.add_space(8.0);
            match screens::admin::ui(ui, &mut self.admin_form, &mut self.remote) {
                AdminAction::Stay => {}
                AdminAction::Assign => self.assign_role(),
                AdminAction::LookUp => self.look_up_profile(),
            }
        }
    }
}

impl eframe::App for RiddlerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.apply_outcomes();
        self.accept_dropped_files(ctx);
        self.toasts.prune(Instant::now());

        let signed_in = self.session.is_authenticated();
        let profile_name = if signed_in { self.profile_name() } else { None };
        let role = if signed_in { self.caller_role() } else { None };
        let account_failed = signed_in && self.remote.account_read_failed();

        egui::TopBottomPanel::top("header").show(ctx, |ui| {
            ui.add_space(4.0);
            let identity = self.session.identity().cloned();
            match screens::header::ui(
                ui,
                identity.as_ref(),
                profile_name.as_deref(),
                role,
                account_failed,
            ) {
                HeaderAction::Stay => {}
                HeaderAction::SignIn => self.sign_in(),
                HeaderAction::SignOut => self.sign_out(),
                HeaderAction::Retry => self.remote.retry_account(),
            }
            ui.add_space(4.0);
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            if !self.session.is_authenticated() {
                if let SignInAction::SignIn = screens::sign_in::ui(ui, self.session.last_error())
                {
                    self.sign_in();
                }
                return;
            }
            egui::ScrollArea::vertical()
                .auto_shrink([false, false])
                .show(ui, |ui| self.content_ui(ui));
        });

        if self.session.is_authenticated() && self.needs_profile() {
            let saving = self.remote.profile_save_pending();
            if let ProfileSetupAction::Save =
                screens::profile_setup::ui(ctx, &mut self.profile_name, saving)
            {
                self.save_profile();
            }
        }

        match screens::toasts::ui(ctx, &self.toasts) {
            ToastAction::Stay => {}
            ToastAction::SignIn => self.sign_in(),
            ToastAction::Dismiss(id) => self.toasts.dismiss(id),
        }

        if self.remote.is_busy() || !self.toasts.is_empty() {
            ctx.request_repaint_after(Duration::from_millis(50));
        }
    }
}

fn init_tracing(log_dir: &Path) -> Option<WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(true);

    let _ = fs::create_dir_all(log_dir);
    let file_appender = tracing_appender::rolling::daily(log_dir, "riddler.log");
    let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer)
        .with_target(true);

    let init_result = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init();

    if let Err(err) = init_result {
        eprintln!("tracing init failed: {err}");
        return None;
    }

    Some(file_guard)
}

fn main() -> eframe::Result<()> {
    let config_path = config_loader::config_path_from_env();
    let (config, config_error) = match config_loader::load_riddler_config(&config_path) {
        Ok(config) => (config, None),
        Err(err) => (RiddlerConfig::default(), Some(err)),
    };

    let _log_guard = init_tracing(&config.log_dir);
    info!("Starting Riddler");
    if let Some(err) = config_error {
        warn!("Falling back to default config: {err:#}");
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.worker_threads.max(1))
        .thread_name("riddler-worker")
        .enable_all()
        .build()
        .expect_or_log("failed to build the async runtime");

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([960.0, 820.0])
            .with_min_inner_size([640.0, 480.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Riddler",
        options,
        Box::new(move |cc| {
            let mut style = (*cc.egui_ctx.style()).clone();
            style
                .text_styles
                .insert(egui::TextStyle::Heading, egui::FontId::proportional(26.0));
            style
                .text_styles
                .insert(egui::TextStyle::Body, egui::FontId::proportional(16.0));
            style
                .text_styles
                .insert(egui::TextStyle::Button, egui::FontId::proportional(16.0));
            style.spacing.button_padding = egui::vec2(10.0, 5.0);
            cc.egui_ctx.set_style(style);

            Ok(Box::new(RiddlerApp::new(config, runtime)))
        }),
    )
}
