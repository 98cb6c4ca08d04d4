use flipbook::cli::{Args, Command};
use flipbook::config::{self, Settings};
use flipbook::core::{DirectoryHost, FfmpegEncoder, HostContext, LocalTracker, sequence};
use flipbook::entities::VersionKey;
use flipbook::panel::{NoticeLevel, Panel, ThumbnailCell};

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use log::{debug, info};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const LEDGER_FILE: &str = "publishes.json";

fn verbosity_level(count: u8) -> log::LevelFilter {
    match count {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    }
}

/// `--log [FILE]` sends everything at the chosen level to a file; otherwise
/// stderr, where `RUST_LOG` wins over `-v`.
fn init_logging(args: &Args, path_config: &config::PathConfig) -> Result<()> {
    let level = verbosity_level(args.verbosity);
    let mut log_file = None;

    let mut builder = match &args.log_file {
        Some(file_arg) => {
            let log_path = file_arg
                .clone()
                .unwrap_or_else(|| config::data_file(config::LOG_FILE, path_config));
            let file = std::fs::File::create(&log_path)
                .with_context(|| format!("Failed to create log file {}", log_path.display()))?;
            log_file = Some(log_path);

            let mut builder = env_logger::Builder::new();
            builder
                .filter_level(level)
                .target(env_logger::Target::Pipe(Box::new(file)));
            builder
        }
        None => env_logger::Builder::from_env(
            env_logger::Env::default().default_filter_or(level.as_str()),
        ),
    };
    builder.format_timestamp_millis().init();
    if let Some(path) = log_file {
        info!("Logging to {} at {}", path.display(), level);
    }
    Ok(())
}

fn parse_keys(keys: &[String]) -> Result<Vec<VersionKey>> {
    keys.iter()
        .map(|k| {
            VersionKey::parse(k).ok_or_else(|| anyhow!("'{}' is not a version key (expected <name>_v<NNN>)", k))
        })
        .collect()
}

/// Print queued notices; true if any of them is a warning or error.
fn report(panel: &mut Panel) -> bool {
    let mut failed = false;
    for notice in panel.take_notices() {
        match notice.level {
            NoticeLevel::Info => eprintln!("{}", notice.message),
            NoticeLevel::Warning => {
                failed = true;
                eprintln!("warning: {}", notice.message);
            }
            NoticeLevel::Error => {
                failed = true;
                eprintln!("error: {}", notice.message);
            }
        }
    }
    failed
}

fn print_rows(panel: &Panel) {
    for group in panel.rows() {
        println!("{}", group.name);
        for item in group.items {
            let thumb = match item.thumbnail {
                ThumbnailCell::Image(_) => "thumb",
                ThumbnailCell::Pending => "pending",
                ThumbnailCell::Unavailable => "-",
            };
            let published = if item.published { "published" } else { "" };
            println!(
                "  {:<6} {:<24} {:<8} {:<10} {}",
                item.label, item.range, thumb, published, item.comment
            );
        }
    }
}

fn build_host(args: &Args, root: &Path, settings: &Settings) -> DirectoryHost {
    let layout = settings.layout(root);
    let mut host = DirectoryHost::new(layout.clone());
    if let Some(scene) = &args.scene {
        host = host.with_scene(scene);
    }

    if let Command::Create {
        source, variables, ..
    } = &args.command
    {
        // $FSTART/$FEND default to the source sequence's own range
        match sequence::probe(&layout, source) {
            Ok(seq) => {
                host = host
                    .with_variable("FSTART", seq.first_frame.to_string())
                    .with_variable("FEND", seq.last_frame.to_string());
            }
            Err(e) => debug!("Source {} not probed: {}", source, e),
        }
        for (name, value) in variables {
            host = host.with_variable(name, value.clone());
        }
        host = host.with_source(source.clone());
    }
    host
}

fn main() -> Result<()> {
    let args = Args::parse();

    let path_config = config::PathConfig::from_env_and_cli(args.config_dir.clone());
    if let Err(e) = config::ensure_dirs(&path_config) {
        eprintln!("Warning: Failed to create application directories: {}", e);
    }

    init_logging(&args, &path_config)?;
    info!("Flipbook {} starting...", env!("CARGO_PKG_VERSION"));
    debug!("Command-line args: {:?}", args);

    let settings_path = config::config_file(config::SETTINGS_FILE, &path_config);
    info!("Config path: {}", settings_path.display());
    let settings = Settings::load(&settings_path);

    let root: PathBuf = if args.root.is_absolute() {
        args.root.clone()
    } else {
        std::env::current_dir()
            .context("Failed to resolve current directory")?
            .join(&args.root)
    };
    info!("Shot root: {}", root.display());

    let host: Arc<dyn HostContext> = Arc::new(build_host(&args, &root, &settings));
    let tracker = Arc::new(
        LocalTracker::open(root.join(LEDGER_FILE)).context("Failed to open publish ledger")?,
    );
    let encoder = Arc::new(FfmpegEncoder::new(
        settings.encoder.clone(),
        Duration::from_secs(settings.encoder_timeout_secs),
    ));
    let scratch = config::data_file("thumbs", &path_config);
    let timeout = Duration::from_secs(settings.encoder_timeout_secs);

    let mut panel = Panel::new(settings, &root, scratch, host, tracker, encoder);
    // encoder jobs only when this process waits for them
    panel.set_thumbnails_enabled(matches!(args.command, Command::List { thumbs: true }));
    if panel.refresh().is_none() {
        report(&mut panel);
        bail!("Cannot read flipbooks under {}", root.display());
    }
    // unreadable empty slots are not a failure of the command itself
    panel.take_notices();

    let ok = match &args.command {
        Command::List { thumbs } => {
            if *thumbs {
                panel.wait_for_thumbnails(timeout);
            }
            print_rows(&panel);
            !report(&mut panel)
        }
        Command::Create {
            name,
            start,
            end,
            resolution,
            comment,
            ..
        } => {
            let form = &mut panel.form;
            form.name = name.clone().unwrap_or_default();
            form.start = start.clone().unwrap_or_default();
            form.end = end.clone().unwrap_or_default();
            form.auto_resolution = resolution.is_none();
            if let Some((w, h)) = resolution {
                form.width = w.to_string();
                form.height = h.to_string();
            }
            form.comment = comment.clone().unwrap_or_default();

            let created = panel.create_flipbook();
            if let Some(record) = &created {
                println!("{} {}", record.key, panel.catalog().range_display(&record.key));
            }
            !report(&mut panel) && created.is_some()
        }
        Command::Delete { keys } => {
            let keys = parse_keys(keys)?;
            let deleted = panel.delete(&keys);
            info!("Deleted {}/{} version(s)", deleted, keys.len());
            !report(&mut panel) && deleted == keys.len()
        }
        Command::Comment { key, text } => {
            let key = parse_keys(std::slice::from_ref(key))?.remove(0);
            let done = panel.set_comment(&key, text);
            !report(&mut panel) && done
        }
        Command::Publish { key } => {
            let key = parse_keys(std::slice::from_ref(key))?.remove(0);
            let outcome = panel.publish(&key);
            if let Some(outcome) = &outcome {
                println!("{} review {} movie {}", key, outcome.review.id, outcome.movie.display());
            }
            !report(&mut panel) && outcome.is_some()
        }
        Command::Play { keys } => {
            let keys = parse_keys(keys)?;
            let pid = panel.play(&keys);
            if let Some(pid) = pid {
                info!("Player pid {}", pid);
            }
            !report(&mut panel) && pid.is_some()
        }
        Command::Copy { keys } => {
            let keys = parse_keys(keys)?;
            let copied = panel.copy_to_clipboard(&keys);
            !report(&mut panel) && copied.is_some()
        }
    };

    if !ok {
        bail!("Command failed");
    }
    Ok(())
}
