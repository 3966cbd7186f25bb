use slide_capture::controller::CaptureController;
use slide_capture::detect::classifier::{JsonWeightsLoader, TransitionClassifier};
use slide_capture::engine::observer::{LogObserver, SessionObserver};
use slide_capture::export::ExportOutcome;
use slide_capture::source::FrameSource;
use slide_capture_common::config::{ClassifierConfig, Config};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config_found = config_path.exists();
    let config = if config_found {
        match Config::load(&config_path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to load config from {}: {e}", config_path.display());
                std::process::exit(1);
            }
        }
    } else {
        Config::default()
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    if !config_found {
        warn!(path = %config_path.display(), "config file not found, using built-in defaults");
    }

    info!(
        source = config.sampler.source,
        interval_ms = config.sampler.interval_ms,
        similarity_threshold = config.detection.similarity_threshold,
        required_stability = config.detection.required_stability,
        min_slide_interval_ms = config.detection.min_slide_interval_ms,
        classifier = config.classifier.enabled,
        "starting slide-capture"
    );

    let source = match FrameSource::from_config(&config.sampler).await {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to open frame source");
            std::process::exit(1);
        }
    };
    info!(source = source.describe(), "frame source ready");

    let classifier = build_classifier(&config.classifier);
    let observer: Arc<dyn SessionObserver> = Arc::new(LogObserver);
    let mut controller = CaptureController::new(&config, source, classifier, observer);

    controller.start_session().await;
    info!("commands: start | stop | capture | status | quit");
    run_console(&mut controller).await;
}

fn build_classifier(config: &ClassifierConfig) -> Arc<TransitionClassifier> {
    if !config.enabled {
        return Arc::new(TransitionClassifier::disabled());
    }
    info!(
        weights = %config.weights_path.display(),
        input_size = config.input_size,
        threshold = config.threshold,
        "transition classifier enabled, weights load on first use"
    );
    let loader = Arc::new(JsonWeightsLoader::new(
        config.weights_path.clone(),
        config.input_size,
    ));
    Arc::new(TransitionClassifier::new(
        loader,
        config.input_size,
        config.threshold,
    ))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Start,
    Stop,
    Capture,
    Status,
    Quit,
}

impl Command {
    fn parse(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "start" => Some(Self::Start),
            "stop" => Some(Self::Stop),
            "capture" | "c" => Some(Self::Capture),
            "status" | "s" => Some(Self::Status),
            "quit" | "exit" | "q" => Some(Self::Quit),
            _ => None,
        }
    }
}

/// Read commands from stdin until `quit`, Ctrl-C, or the source runs dry.
/// Whatever session is still running at that point is stopped and exported.
async fn run_console(controller: &mut CaptureController) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut exhaustion_check = tokio::time::interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => match Command::parse(&line) {
                    Some(Command::Quit) => break,
                    Some(command) => handle(controller, command).await,
                    None if line.trim().is_empty() => {}
                    None => warn!(
                        input = line.trim(),
                        "unknown command, expected start | stop | capture | status | quit"
                    ),
                },
                Ok(None) => {
                    debug!("stdin closed, console commands disabled");
                    stdin_open = false;
                }
                Err(e) => {
                    warn!(error = %e, "failed to read stdin, console commands disabled");
                    stdin_open = false;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
            _ = exhaustion_check.tick() => {
                if controller.source_exhausted().await && controller.is_active().await {
                    info!("frame source exhausted, stopping capture");
                    break;
                }
            }
        }
    }

    if controller.is_active().await {
        stop_and_report(controller).await;
    }
}

async fn handle(controller: &mut CaptureController, command: Command) {
    match command {
        Command::Start => controller.start_session().await,
        Command::Stop => stop_and_report(controller).await,
        Command::Capture => match controller.manual_capture().await {
            Ok(Some(sequence_number)) => info!(sequence_number, "slide captured manually"),
            Ok(None) => warn!("no frame available, nothing captured"),
            Err(e) => warn!(error = %e, "manual capture rejected"),
        },
        Command::Status => match controller.status().await {
            Some(status) => info!(
                active = status.active,
                slides = status.slides,
                state = ?status.progress.state,
                stable_ticks = status.progress.stable_ticks,
                required = status.progress.required,
                "session status"
            ),
            None => info!("no session, type 'start' to begin"),
        },
        Command::Quit => {}
    }
}

async fn stop_and_report(controller: &mut CaptureController) {
    match controller.stop_session().await {
        Ok(ExportOutcome::Written { path, slides }) => {
            info!(path = %path.display(), slides, "slides saved; open in a browser and print to PDF");
        }
        Ok(ExportOutcome::Skipped) => {}
        Err(e) => error!(error = %e, "export failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_parse_case_insensitively() {
        assert_eq!(Command::parse("start"), Some(Command::Start));
        assert_eq!(Command::parse("  STOP \n"), Some(Command::Stop));
        assert_eq!(Command::parse("c"), Some(Command::Capture));
        assert_eq!(Command::parse("status"), Some(Command::Status));
        assert_eq!(Command::parse("exit"), Some(Command::Quit));
        assert_eq!(Command::parse("pause"), None);
        assert_eq!(Command::parse(""), None);
    }
}
