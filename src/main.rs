use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing_subscriber::EnvFilter;

use docsnap::backend::{GalleryService, UploadService};
use docsnap::capture::FileCapture;
use docsnap::debug_log::DebugLog;
use docsnap::events::GalleryEntry;
use docsnap::loader::StopReason;
use docsnap::model::{AppModel, Screen};
use docsnap::payload::ImagePayload;
use docsnap::remote::build_client;
use docsnap::remote::gallery::HttpGalleryService;
use docsnap::remote::upload::HttpUploader;
use docsnap::settings::{AppSettings, load_settings, save_settings, settings_path};
use docsnap::{DocsnapError, Result};

#[derive(Parser)]
#[command(name = "docsnap", version, about = "Upload document photos and browse the remote gallery")]
struct Cli {
    /// Gallery script URL (overrides settings and environment)
    #[arg(long, global = true, value_name = "URL")]
    gallery_endpoint: Option<String>,

    /// Upload script URL (overrides settings and environment)
    #[arg(long, global = true, value_name = "URL")]
    upload_endpoint: Option<String>,

    /// Request timeout in seconds
    #[arg(long, global = true, value_name = "SECS")]
    timeout: Option<u64>,

    /// More log output (-v info, -vv debug). RUST_LOG takes precedence.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load a gallery folder and print images as they arrive
    List {
        /// Folder name; omit for the unscoped gallery
        #[arg(long, conflicts_with_all = ["input", "output"])]
        folder: Option<String>,
        /// Use the configured input folder
        #[arg(long, conflicts_with = "output")]
        input: bool,
        /// Use the configured output folder
        #[arg(long)]
        output: bool,
        /// Fetch the whole folder in one request (older script deployments)
        #[arg(long)]
        bulk: bool,
    },
    /// Capture an image from a file and upload it
    Upload { path: PathBuf },
    /// Show the effective configuration
    Config {
        /// Print the settings file location only
        #[arg(long)]
        path: bool,
        /// Write the effective configuration to the settings file
        #[arg(long, conflicts_with = "path")]
        save: bool,
    },
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn effective_settings(cli: &Cli) -> AppSettings {
    let mut settings = load_settings();
    settings.apply_env_overrides();
    if let Some(ref url) = cli.gallery_endpoint {
        settings.gallery_endpoint = url.clone();
    }
    if let Some(ref url) = cli.upload_endpoint {
        settings.upload_endpoint = url.clone();
    }
    if let Some(secs) = cli.timeout {
        settings.request_timeout_secs = secs;
    }
    settings
}

fn describe_payload(payload: &ImagePayload) -> String {
    match payload.dimensions {
        Some((w, h)) => format!("{} {}x{} {} bytes", payload.mime, w, h, payload.len()),
        None => format!("{} {} bytes", payload.mime, payload.len()),
    }
}

fn print_entry(entry: &GalleryEntry) {
    println!(
        "{:>5}  {:<40} {}",
        entry.reverse_key,
        entry.label,
        describe_payload(&entry.payload)
    );
}

async fn run_list(settings: AppSettings, screen: Screen, bulk: bool) -> Result<()> {
    let client = build_client(settings.request_timeout())?;
    let gallery = Arc::new(HttpGalleryService::new(client, &settings.gallery_endpoint)?);

    if bulk {
        let folder = match &screen {
            Screen::Input => settings.input_folder.clone(),
            Screen::Output => settings.output_folder.clone(),
            Screen::Folder(folder) => folder.clone(),
            Screen::Camera => String::new(),
        };
        let items = gallery.list_images(&folder).await?;
        for (i, item) in items.iter().enumerate() {
            let label = item.name.clone().unwrap_or_else(|| format!("Image {}", i + 1));
            match item.data_url.as_deref().map(ImagePayload::from_data_url) {
                Some(Ok(payload)) => println!("{:<40} {}", label, describe_payload(&payload)),
                Some(Err(e)) => eprintln!("{}: {}", label, e),
                None => eprintln!("{}: no image payload", label),
            }
        }
        println!("{} images", items.len());
        return Ok(());
    }

    let gallery: Arc<dyn GalleryService> = gallery;
    let mut model = AppModel::new(settings, Some(gallery), None, DebugLog::new(), Handle::current());
    model.show_screen(screen);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut ticker = tokio::time::interval(Duration::from_millis(50));
    let mut printed = 0;
    let mut last_status = String::new();
    let mut interrupted = false;

    loop {
        tokio::select! {
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                model.show_screen(Screen::Camera);
            }
            _ = ticker.tick() => {}
        }

        let finished = model.session_finished();
        model.process_events();
        if model.status() != last_status {
            last_status = model.status().to_string();
            eprintln!("{}", last_status);
        }
        for entry in model.entries().get(printed..).unwrap_or(&[]) {
            print_entry(entry);
        }
        printed = model.entries().len();

        if finished || interrupted {
            break;
        }
    }

    if interrupted {
        // The cancelled task may still be parked on a request; leave it.
        if let Some(folder) = model.abandon_session() {
            eprintln!("Cancelled loading '{}'", folder);
        }
        return Ok(());
    }

    if let Some(report) = model.wait_session().await? {
        tracing::info!(?report, "load session finished");
        let report = report.check()?;
        match report.reason {
            StopReason::Cancelled => eprintln!("Cancelled loading '{}'", report.folder),
            _ => eprintln!(
                "{} of {} images shown ({} failed)",
                report.rendered, report.total, report.failed
            ),
        }
    }
    Ok(())
}

async fn run_upload(settings: AppSettings, path: PathBuf) -> Result<()> {
    let client = build_client(settings.request_timeout())?;
    let uploader: Arc<dyn UploadService> =
        Arc::new(HttpUploader::new(client, &settings.upload_endpoint)?);
    let mut model = AppModel::new(settings, None, Some(uploader), DebugLog::new(), Handle::current());

    let mut capture = FileCapture::new(path);
    model.capture_photo(&mut capture)?;
    model.send_photo().await?;
    println!("Sent {}", capture.path().display());
    Ok(())
}

fn run_config(settings: &AppSettings, path: bool, save: bool) -> Result<()> {
    if path {
        let path = settings_path().ok_or_else(|| {
            DocsnapError::Config("cannot determine config directory".to_string())
        })?;
        println!("{}", path.display());
    } else if save {
        let path = save_settings(settings)?;
        println!("Saved {}", path.display());
    } else {
        println!("{}", serde_json::to_string_pretty(settings)?);
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let settings = effective_settings(&cli);
    match cli.command {
        Command::List {
            folder,
            input,
            output,
            bulk,
        } => {
            let screen = if input {
                Screen::Input
            } else if output {
                Screen::Output
            } else {
                Screen::Folder(folder.unwrap_or_default())
            };
            run_list(settings, screen, bulk).await
        }
        Command::Upload { path } => run_upload(settings, path).await,
        Command::Config { path, save } => run_config(&settings, path, save),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("docsnap: {}", e);
            ExitCode::FAILURE
        }
    }
}
