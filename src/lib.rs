mod config;
mod dispatch;
mod engine;
mod events;
mod feed;
mod input;
mod items;
mod motion;
mod scheduler;
mod sequences;
mod state;
mod stop;
mod suppression;
mod tables;

use anyhow::Context;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Command-line options the binary hands to `run`.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Explicit config file; otherwise `<config dir>/config.toml`.
    pub config_path: Option<PathBuf>,
    pub debug:       bool,
}

pub fn run(opts: RunOptions) -> anyhow::Result<()> {
    let config_dir = opts
        .config_path
        .as_deref()
        .and_then(|p| p.parent())
        .filter(|p| !p.as_os_str().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(config::default_config_dir);

    // -----------------------------------------------------------------------
    // Logging: rolling daily file under <config dir>/logs, mirrored to stderr.
    // -----------------------------------------------------------------------
    let log_dir = config_dir.join("logs");
    // Reported once the subscriber is up.
    let log_dir_err = std::fs::create_dir_all(&log_dir).err();

    let file_appender = tracing_appender::rolling::daily(&log_dir, "switcher.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    // Lives for the whole process; dropping it stops the flush thread.
    std::mem::forget(_guard);

    let level = if opts.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("tick_switcher_lib={}", level).parse()?),
        )
        .with_writer(non_blocking.and(std::io::stderr))
        .with_ansi(false)
        .init();

    std::panic::set_hook(Box::new(|info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_else(|| "unknown location".to_string());
        let message = if let Some(s) = info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        tracing::error!("PANIC at {}: {}", location, message);
    }));

    tracing::info!("tick-switcher {} starting, logs → {}", env!("CARGO_PKG_VERSION"), log_dir.display());
    if let Some(e) = log_dir_err {
        tracing::warn!("Could not create log dir {}: {}; logging to stderr only", log_dir.display(), e);
    }

    // --- Config (written out on first run so it can be edited) ---
    let cfg = match &opts.config_path {
        Some(path) => config::load_file(path)?,
        None => {
            let cfg = config::load_or_default(&config_dir)?;
            if !config_dir.join("config.toml").exists() {
                if let Err(e) = config::save(&cfg, &config_dir) {
                    tracing::warn!("Could not write default config: {:#}", e);
                }
            }
            cfg
        }
    };

    // --- Tables: fatal before anything starts ---
    let paths = cfg.table_paths(&config_dir);
    let tables = Arc::new(tables::load(&paths).context("loading mapping tables")?);

    // --- Shared components ---
    let store = Arc::new(state::StateStore::new());
    let engine = Arc::new(engine::ProtectionEngine::new(
        Arc::clone(&store),
        Arc::new(tables.animations.clone()),
    ));
    engine.set_enabled(cfg.auto_protect_on_start);
    let guard = Arc::new(suppression::InputGuard::new(Arc::clone(&engine)));
    let queue = Arc::new(scheduler::ActionQueue::new());
    let device = input::SharedDevice::new(input::DryRunDevice::new());

    // --- Drain worker ---
    let ctx = sequences::SequenceContext {
        store:    Arc::clone(&store),
        engine:   Arc::clone(&engine),
        guard:    Arc::clone(&guard),
        tables:   Arc::clone(&tables),
        device:   device.clone(),
        tab_keys: cfg.tab_keys.clone(),
    };
    let motion = motion::MotionProfile::new(motion::PreciseSleeper::new(cfg.spin_threshold()));
    queue
        .spawn_worker(sequences::Switcher::new(ctx, motion))
        .context("spawning action worker")?;

    // --- Suppression watcher ---
    let watcher_shutdown = Arc::new(AtomicBool::new(false));
    {
        let guard = Arc::clone(&guard);
        let store = Arc::clone(&store);
        let device = device.clone();
        let queue = Arc::clone(&queue);
        let interval = cfg.watcher_interval();
        let shutdown = Arc::clone(&watcher_shutdown);
        std::thread::Builder::new()
            .name("suppression-watcher".into())
            .spawn(move || {
                suppression::run_watcher(guard, store, device, || queue.is_action_in_progress(), interval, shutdown)
            })
            .context("spawning suppression watcher")?;
    }

    // --- Async side: feed, poller, hang monitor ---
    let runtime = tokio::runtime::Runtime::new().context("building tokio runtime")?;
    runtime.spawn(feed::run(cfg.feed_url.clone(), Arc::clone(&store), cfg.reconnect_backoff()));
    runtime.spawn(
        dispatch::ProtectionPoller::new(Arc::clone(&engine), Arc::clone(&guard), Arc::clone(&queue))
            .run(cfg.poll_interval()),
    );
    runtime.spawn(dispatch::run_hang_monitor(Arc::clone(&queue), cfg.hang_warn()));

    // --- Triggers on this thread until quit ---
    tracing::info!("Ready: F6-F12 run loadouts, x toggles auto-protect, b resets the bracket, esc quits");
    let dispatcher = dispatch::Dispatcher::new(
        Arc::clone(&queue),
        Arc::clone(&engine),
        tables.hotkeys.clone(),
        cfg.preempt_wait(),
    );
    let result = dispatch::read_triggers(std::io::stdin().lock(), &dispatcher);

    queue.shutdown();
    watcher_shutdown.store(true, std::sync::atomic::Ordering::SeqCst);
    runtime.shutdown_background();
    tracing::info!("tick-switcher stopped");
    result
}
