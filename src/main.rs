use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use rebuttal_agent::config::{
    load_api_key, AudioSourceKind, LoggingConfig, RecognitionBackendKind,
};
use rebuttal_agent::{
    http, AgentListener, AgentStatus, AppState, Config, ConfiguredComponents, ConsoleDisplay,
    DisplayFanout, DisplaySink, OpenAiCompatClient, OverlayDisplay, ReconnectLoop,
    ResponseDispatcher, SessionConfig, SharedStatus, StopSignal,
};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RecognizerArg {
    Dashscope,
    Nats,
}

/// Voice agent that argues with everything you say
#[derive(Debug, Parser)]
#[command(name = "rebuttal-agent", version)]
struct Args {
    /// Configuration file, without extension
    #[arg(short, long, default_value = "config/rebuttal-agent")]
    config: String,

    /// Replay a WAV file instead of capturing the microphone
    #[arg(long)]
    audio_file: Option<PathBuf>,

    /// Speech recognition backend
    #[arg(long, value_enum)]
    recognizer: Option<RecognizerArg>,

    /// Do not serve the overlay page
    #[arg(long)]
    no_overlay: bool,
}

impl Args {
    fn apply(&self, cfg: &mut Config) {
        if let Some(path) = &self.audio_file {
            cfg.audio.source = AudioSourceKind::File;
            cfg.audio.file = Some(path.clone());
        }
        if let Some(recognizer) = self.recognizer {
            cfg.recognition.backend = match recognizer {
                RecognizerArg::Dashscope => RecognitionBackendKind::DashScope,
                RecognizerArg::Nats => RecognitionBackendKind::Nats,
            };
        }
        if self.no_overlay {
            cfg.overlay.enabled = false;
        }
    }
}

/// Console logging, plus daily log files when enabled
///
/// The returned guard flushes the file writer on drop and must live until exit.
fn init_tracing(logging: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = if logging.file {
        std::fs::create_dir_all(&logging.dir)
            .with_context(|| format!("Failed to create log directory {}", logging.dir.display()))?;
        let appender = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix("rebuttal-agent")
            .filename_suffix("log")
            .max_log_files(logging.max_files)
            .build(&logging.dir)
            .with_context(|| format!("Failed to open log file in {}", logging.dir.display()))?;
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = fmt::layer().with_ansi(false).with_writer(writer);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();

    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut cfg = Config::load(&args.config)?;
    args.apply(&mut cfg);
    cfg.validate()?;

    let _log_guard = init_tracing(&cfg.logging)?;

    let api_key = load_api_key()?;

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));
    info!(
        "Audio: {:?} at {} Hz, {} samples per frame",
        cfg.audio.source, cfg.audio.sample_rate, cfg.audio.block_size
    );
    info!(
        "Recognition: {:?} ({}), replies: {}",
        cfg.recognition.backend, cfg.recognition.model, cfg.llm.model
    );

    let stop = StopSignal::new();
    let status: SharedStatus = Arc::new(RwLock::new(AgentStatus::default()));

    let mut sinks: Vec<Arc<dyn DisplaySink>> = Vec::new();
    if cfg.console.enabled {
        sinks.push(Arc::new(ConsoleDisplay::new()));
    }

    let server = if cfg.overlay.enabled {
        let overlay = OverlayDisplay::new();
        sinks.push(Arc::new(overlay.clone()));

        let addr = format!("{}:{}", cfg.overlay.bind, cfg.overlay.port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind overlay server to {}", addr))?;
        let state = AppState::new(overlay, Arc::clone(&status), stop.clone());
        Some(tokio::spawn(http::serve(listener, state)))
    } else {
        None
    };

    let display: Arc<dyn DisplaySink> = Arc::new(DisplayFanout::new(sinks));
    let chat = Arc::new(OpenAiCompatClient::new(
        cfg.llm.base_url.clone(),
        api_key.clone(),
    ));
    let dispatcher = ResponseDispatcher::new(
        chat,
        Arc::clone(&display),
        cfg.llm.model.clone(),
        cfg.llm.system_prompt.clone(),
    );
    let listener = Arc::new(AgentListener::new(display, dispatcher, status));
    let components = Arc::new(ConfiguredComponents::new(cfg.clone(), api_key));

    let agent = ReconnectLoop::with_stop_signal(
        SessionConfig::from(&cfg),
        components,
        listener,
        stop.clone(),
    );

    let interrupt = stop.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, shutting down");
                interrupt.trigger();
            }
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    let sessions = agent.run().await;

    if let Some(server) = server {
        match server.await {
            Ok(Ok(())) => info!("Overlay server stopped"),
            Ok(Err(e)) => error!("{:#}", e),
            Err(e) => error!("Overlay server task failed: {}", e),
        }
    }

    info!("Exited after {} sessions", sessions);
    Ok(())
}
