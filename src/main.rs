use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use vitmon_service::alert::dispatch::{LogSink, NotificationSink, WebhookSink};
use vitmon_service::config::Config;
use vitmon_service::dev_mode::ReplaySource;
use vitmon_service::ingest::DataSource;
use vitmon_service::ingest::sensor::HttpDataSource;
use vitmon_service::logging::{self, Component};
use vitmon_service::monitor::Monitor;
use vitmon_service::verify::verify_endpoint;

const SUMMARY_INTERVAL: Duration = Duration::from_secs(60);

const USAGE: &str = "usage: vitmon [--config FILE] [--once] [--verify] [--replay FILE]";

#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    replay: Option<PathBuf>,
    once: bool,
    verify: bool,
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args::default();
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let path = iter.next().ok_or("--config needs a file")?;
                args.config = Some(PathBuf::from(path));
            }
            "--replay" => {
                let path = iter.next().ok_or("--replay needs a file")?;
                args.replay = Some(PathBuf::from(path));
            }
            "--once" => args.once = true,
            "--verify" => args.verify = true,
            "-h" | "--help" => return Err(USAGE.to_string()),
            other => return Err(format!("unknown argument '{}'\n{}", other, USAGE)),
        }
    }
    Ok(args)
}

fn main() -> ExitCode {
    let args = match parse_args() {
        Ok(args) => args,
        Err(msg) => {
            eprintln!("{}", msg);
            return ExitCode::from(2);
        }
    };

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            logging::error(Component::System, None, &e.to_string());
            eprintln!("vitmon: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load(args.config.as_deref())?;
    logging::init_logger(
        config.logging.level,
        config.logging.file.as_deref(),
        config.logging.timestamps,
    )?;
    let subject = Some(config.subject_id.as_str());
    logging::info(Component::System, subject, "vitmon starting");

    let source: Arc<dyn DataSource> = match &args.replay {
        Some(path) => Arc::new(ReplaySource::from_file(path)?),
        None => Arc::new(HttpDataSource::new(
            &config.source.base_url,
            &config.source.path,
            config.source.timeout(),
        )?),
    };

    if args.verify {
        let report = verify_endpoint(source.as_ref());
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let sink: Arc<dyn NotificationSink> = match &config.notify.webhook_url {
        Some(url) => Arc::new(WebhookSink::new(url.as_str(), config.source.timeout())?),
        None => Arc::new(LogSink),
    };
    logging::info(
        Component::Config,
        subject,
        &format!(
            "Source {}, cooldown {}s, sink {}",
            source.describe(),
            config.alerts.cooldown_secs,
            if config.notify.webhook_url.is_some() { "webhook" } else { "log" }
        ),
    );

    let monitor = Monitor::from_config(&config, source, sink)?;

    if args.once {
        let report = monitor.refresh_once()?;
        println!(
            "{} overall, {} alert(s) sent, {} suppressed, {} ms",
            report.evaluation.classification.overall,
            report.evaluation.fired.len(),
            report.evaluation.suppressed.len(),
            report.latency.as_millis()
        );
        return Ok(());
    }

    monitor.start()?;

    let mut previous = monitor.connection_state();
    loop {
        thread::sleep(SUMMARY_INTERVAL);
        let current = monitor.connection_state();
        let total = current.total_fetches - previous.total_fetches;
        let failed = current.failed_fetches - previous.failed_fetches;
        logging::log_connectivity_summary(subject, total, total - failed, failed);
        if monitor.is_stale() {
            logging::warn(
                Component::Loop,
                subject,
                &format!(
                    "No fresh reading for over {}s",
                    config.acquisition.stale_after_secs
                ),
            );
        }
        previous = current;
    }
}
