//! The launcher core's public surface.
//!
//! [`Launcher::configure`] establishes a session rooted at a directory.
//! [`Launcher::launch`] runs the whole pipeline (version resolution,
//! Java provisioning, loader installation, artifact downloads, native
//! extraction, installer processors, mod staging, argument synthesis)
//! and spawns the supervised game process. Progress and errors stream
//! over the session's [`EventBus`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use cl_core::json::version::RuleContext;
use cl_core::json::Credential;
use cl_core::{file_utils, info, EventBus, IntoIoError, LogLevel};
use cl_java_handler::JavaSelector;
use cl_loaders::{LoaderContext, LoaderSpec};

pub mod download;
pub mod launch;
pub mod mods;

pub use cl_core::event::{CheckKind, Event, LogLevel as EventLogLevel};
pub use cl_core::ErrorKind;
pub use cl_loaders::{BuildSelection, Loader};
pub use download::{DownloadError, Downloader, GameDownloader};
pub use launch::{GameLaunchError, LaunchSupervisor, SupervisorState, NO_LOGS_SENTINEL};

/// Session-wide configuration. Everything lives under `root`.
#[derive(Debug, Clone)]
pub struct LauncherConfig {
    pub root: PathBuf,
    pub memory_min_mb: usize,
    pub memory_max_mb: usize,
    pub java_override: Option<PathBuf>,
    pub download_pool_size: usize,
    pub request_timeout: Duration,
    pub download_timeout: Duration,
    /// Ordered Maven mirrors tried for artifacts without a declared URL.
    pub mirrors: Vec<String>,
    pub launcher_name: String,
    pub launcher_version: String,
    /// Re-hash every artifact after the download phase.
    pub verify_after: bool,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            memory_min_mb: 512,
            memory_max_mb: 2048,
            java_override: None,
            download_pool_size: 16,
            request_timeout: Duration::from_secs(10),
            download_timeout: Duration::from_secs(300),
            mirrors: vec![
                "https://libraries.minecraft.net".to_owned(),
                "https://maven.fabricmc.net".to_owned(),
                "https://maven.minecraftforge.net".to_owned(),
            ],
            launcher_name: cl_core::LAUNCHER_BRAND.to_owned(),
            launcher_version: cl_core::LAUNCHER_VERSION_NAME.to_owned(),
            verify_after: false,
        }
    }
}

/// One launch request.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// Version id, or the `latest_release` / `latest_snapshot` aliases.
    pub version: String,
    /// Instance name under `instances/`.
    pub instance: String,
    pub loader: Option<LoaderSpec>,
    pub credential: Credential,
    pub extra_jvm: Vec<String>,
    pub extra_game: Vec<String>,
    pub env: HashMap<String, String>,
    pub mods: Vec<String>,
    pub custom_mod_paths: Vec<PathBuf>,
    pub resolution: Option<(u32, u32)>,
    /// Suppress child stdout/stderr events (the log file still fills).
    pub quiet: bool,
}

pub struct Launcher {
    config: LauncherConfig,
    client: reqwest::Client,
    bus: EventBus,
    supervisor: LaunchSupervisor,
    cancel: Mutex<CancellationToken>,
}

impl Launcher {
    /// Validates the configuration and establishes a session.
    pub fn configure(config: LauncherConfig) -> Result<Self, GameLaunchError> {
        if config.memory_max_mb == 0 || config.memory_min_mb > config.memory_max_mb {
            return Err(GameLaunchError::InvalidConfig(format!(
                "bad memory range {}..{} MB",
                config.memory_min_mb, config.memory_max_mb
            )));
        }
        if config.download_pool_size == 0 {
            return Err(GameLaunchError::InvalidConfig(
                "download pool size must be at least 1".to_owned(),
            ));
        }

        let client = file_utils::build_client(config.request_timeout)
            .map_err(|e| GameLaunchError::InvalidConfig(e.to_string()))?;
        let bus = EventBus::new();
        let supervisor = LaunchSupervisor::new(bus.clone());

        Ok(Self {
            config,
            client,
            bus,
            supervisor,
            cancel: Mutex::new(CancellationToken::new()),
        })
    }

    /// Subscribe to the session's event stream. May be called before
    /// `launch`; no event is emitted after a launch's `close`.
    #[must_use]
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.bus
    }

    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.supervisor.pid()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.supervisor.is_running()
    }

    /// Aborts in-flight downloads and kills the child process, politely
    /// first, forcefully after the grace window. Returns whether a live
    /// process was signalled.
    pub async fn kill(&self, grace: Duration) -> bool {
        self.cancel.lock().unwrap().cancel();
        self.supervisor.kill(grace).await
    }

    /// Cancels the pipeline without touching a running child.
    pub fn abort(&self) {
        self.cancel.lock().unwrap().cancel();
    }

    /// Current contents of the instance's `latest.log`.
    pub async fn inspect_logs(&self, instance: &str) -> String {
        LaunchSupervisor::inspect_logs(&self.instance_dir(instance)).await
    }

    #[must_use]
    pub fn instance_dir(&self, instance: &str) -> PathBuf {
        self.config.root.join("instances").join(instance)
    }

    /// Runs the full pipeline and spawns the game. Every fatal path
    /// emits an `error` event before this returns.
    pub async fn launch(&self, options: LaunchOptions) -> Result<u32, GameLaunchError> {
        if self.supervisor.is_running() {
            let err = GameLaunchError::AlreadyRunning;
            self.bus.error(err.kind(), err.to_string());
            return Err(err);
        }

        match self.launch_inner(&options).await {
            Ok(pid) => Ok(pid),
            Err(err) => {
                self.bus.error(err.kind(), err.to_string());
                Err(err)
            }
        }
    }

    async fn launch_inner(&self, options: &LaunchOptions) -> Result<u32, GameLaunchError> {
        let root = &self.config.root;
        let cancel = self.fresh_cancel_token();

        let instance_dir = self.instance_dir(&options.instance);
        for sub in ["logs", "mods"] {
            let dir = instance_dir.join(sub);
            tokio::fs::create_dir_all(&dir).await.path(dir)?;
        }

        let mut features = HashMap::new();
        if options.resolution.is_some() {
            features.insert("has_custom_resolution".to_owned(), true);
        }
        let rule_ctx = RuleContext::current(features);

        let downloader = Downloader::new(
            self.client.clone(),
            self.bus.clone(),
            self.config.download_pool_size,
            self.config.download_timeout,
            cancel.clone(),
        );

        // 1. Version resolution (inheritance merged, manifest persisted).
        let mut game = GameDownloader::new(
            root,
            self.client.clone(),
            self.bus.clone(),
            downloader.clone(),
            rule_ctx.clone(),
            self.config.mirrors.clone(),
            &options.version,
        )
        .await?;
        let base_version_id = game.version_id.clone();

        // 2. Java, selected by the manifest's runtime component.
        let selector = game
            .version_json
            .javaVersion
            .as_ref()
            .map(|j| JavaSelector {
                component: j.component.clone(),
                major_version: j.majorVersion,
            })
            .unwrap_or_default();
        let java_bin = cl_java_handler::get_java_binary(
            root,
            &self.client,
            &self.bus,
            &selector,
            self.config.java_override.as_deref(),
        )
        .await?;

        // 3. Client jar before the loader needs to copy it.
        game.download_jar().await?;

        // 4. Loader overlay (downloads its own libraries).
        let mut patch_job = None;
        let mut overlay = None;
        if let Some(spec) = &options.loader {
            let ctx = LoaderContext {
                root,
                client: &self.client,
                bus: &self.bus,
                base_version: &game.version_json,
                base_version_id: &base_version_id,
                rule_ctx: &rule_ctx,
            };
            let (profile, job) = cl_loaders::resolve_profile(&ctx, spec).await?;
            patch_job = job;
            overlay = Some(profile);
        }

        // 5. Base libraries, assets, log config; then natives.
        game.download_libraries().await?;
        game.download_assets().await?;
        let logging_config = game.download_logging_config().await?;
        game.extract_natives().await?;

        if self.config.verify_after {
            game.verify_artifacts().await?;
        }

        // 6. Installer processors, once every library and native is in
        // place.
        if let Some(job) = &patch_job {
            cl_loaders::forge::patcher::run(root, &java_bin, &self.bus, job, None).await?;
        }

        // 7. Mods are best-effort.
        if !options.mods.is_empty() || !options.custom_mod_paths.is_empty() {
            mods::stage_mods(
                &downloader,
                &self.bus,
                &instance_dir,
                &options.mods,
                &options.custom_mod_paths,
            )
            .await;
        }

        // 8. Arguments from the effective (overlay-merged) manifest.
        let effective = match &overlay {
            Some(profile) => profile
                .overlay
                .clone()
                .merged_with_parent(game.version_json.clone()),
            None => game.version_json.clone(),
        };
        let effective_id = effective.id.clone();

        // Loader libraries first so their versions win the dedup.
        let mut classpath: Vec<(String, PathBuf)> = Vec::new();
        if let Some(profile) = &overlay {
            classpath.extend(cl_loaders::profile_library_paths(
                &profile.overlay.libraries,
                &root.join("libraries"),
                &rule_ctx,
            ));
        }
        classpath.extend_from_slice(game.classpath_entries());

        let argument_options = launch::ArgumentOptions {
            memory_min_mb: self.config.memory_min_mb,
            memory_max_mb: self.config.memory_max_mb,
            resolution: options.resolution,
            extra_jvm: options.extra_jvm.clone(),
            extra_game: options.extra_game.clone(),
            launcher_name: self.config.launcher_name.clone(),
            launcher_version: self.config.launcher_version.clone(),
        };
        let command = launch::arguments::build(&launch::ArgumentInputs {
            version: &effective,
            version_id: &effective_id,
            base_version_id: &base_version_id,
            root,
            instance_dir: &instance_dir,
            credential: &options.credential,
            classpath: &classpath,
            client_jar: &game.jar_path(),
            java_bin: &java_bin,
            rule_ctx: &rule_ctx,
            logging_config: logging_config.as_deref(),
            options: &argument_options,
            bus: &self.bus,
        });

        let redacted =
            launch::arguments::redact_args(&command.args, &options.credential, root);
        info!("Launch command: {:?} {:?}", command.program, redacted);
        self.bus.log(
            LogLevel::Info,
            format!("launching {} as {:?}", effective_id, redacted.join(" ")),
        );

        // A cancellation that raced the pipeline must not spawn.
        if cancel.is_cancelled() {
            return Err(GameLaunchError::Aborted);
        }

        // 9. Spawn under supervision.
        self.supervisor
            .launch(launch::SpawnSpec {
                command,
                cwd: instance_dir,
                env: options.env.clone(),
                quiet: options.quiet,
            })
            .await
    }

    fn fresh_cancel_token(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.cancel.lock().unwrap() = token.clone();
        token
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configure_rejects_nonsense() {
        let bad_memory = LauncherConfig {
            memory_min_mb: 4096,
            memory_max_mb: 1024,
            ..LauncherConfig::default()
        };
        assert!(matches!(
            Launcher::configure(bad_memory),
            Err(GameLaunchError::InvalidConfig(_))
        ));

        let bad_pool = LauncherConfig {
            download_pool_size: 0,
            ..LauncherConfig::default()
        };
        assert!(matches!(
            Launcher::configure(bad_pool),
            Err(GameLaunchError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn fresh_session_is_idle() {
        let launcher = Launcher::configure(LauncherConfig {
            root: std::env::temp_dir().join("cl_facade_test"),
            ..LauncherConfig::default()
        })
        .unwrap();

        assert_eq!(launcher.pid(), None);
        assert!(!launcher.is_running());
        assert!(!launcher.kill(Duration::from_millis(1)).await);
        assert_eq!(
            launcher.inspect_logs("nope").await,
            launch::NO_LOGS_SENTINEL
        );
    }
}
