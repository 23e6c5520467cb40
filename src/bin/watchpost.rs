//! watchpost - fire and animal detection with alerts
//!
//! Subcommands:
//! - `signup`: create an account in the local credential store
//! - `detect`: log in, then run one detection session over an image, a video,
//!   or a camera until the source is exhausted or Ctrl-C is pressed
//!
//! Passwords are read from `WATCHPOST_PASSWORD`, or one line on stdin.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::io::{BufRead, IsTerminal, Write};
use std::path::PathBuf;
use zeroize::Zeroizing;

use watchpost::{
    stop_channel, Authenticator, DetectionProfile, DirectorySink, FrameSink, LatestFrameSink,
    Origin, SessionEnd, SessionReport, SqliteCredentialStore, StreamController, StreamSession,
    WatchpostConfig,
};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(name = "watchpost", about = "Fire and animal detection with alerts")]
struct Cli {
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE", global = true)]
    ui: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an account
    Signup {
        #[arg(long, env = "WATCHPOST_USER")]
        user: String,
    },
    /// Log in and run a detection session
    Detect(DetectArgs),
}

#[derive(Args, Debug)]
struct DetectArgs {
    #[arg(long, env = "WATCHPOST_USER")]
    user: String,

    /// Detection profile (fire|animal); overrides the configured profile
    #[arg(long)]
    profile: Option<DetectionProfile>,

    /// Confidence threshold in percent
    #[arg(long, value_name = "PERCENT")]
    threshold: Option<u8>,

    /// Directory for annotated frames
    #[arg(long, value_name = "DIR", conflicts_with = "latest")]
    output: Option<PathBuf>,

    /// Keep only the most recent annotated frame, at this path
    #[arg(long, value_name = "PATH")]
    latest: Option<PathBuf>,

    /// Stop after this many frames
    #[arg(long, value_name = "N")]
    max_frames: Option<u64>,

    #[command(subcommand)]
    origin: OriginArg,
}

#[derive(Subcommand, Debug)]
enum OriginArg {
    /// A single still image
    Image { path: PathBuf },
    /// A video file, a directory of stills, or stub://N
    Video { path: String },
    /// A live camera (defaults to the configured device)
    Camera { device: Option<String> },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let ui = ui::Ui::new(ui::UiMode::parse(&cli.ui), std::io::stderr().is_terminal());
    let config = WatchpostConfig::load()?;

    match cli.command {
        Command::Signup { user } => signup(&config, &ui, &user),
        Command::Detect(args) => detect(config, &ui, args),
    }
}

fn signup(config: &WatchpostConfig, ui: &ui::Ui, user: &str) -> Result<()> {
    let password = read_password()?;
    let _stage = ui.stage("Create account");
    let mut auth = Authenticator::new(SqliteCredentialStore::open(&config.db_path)?);
    auth.signup(user, &password)?;
    println!("account '{}' created", user);
    Ok(())
}

fn detect(mut config: WatchpostConfig, ui: &ui::Ui, args: DetectArgs) -> Result<()> {
    if let Some(profile) = args.profile {
        config.profile = profile;
    }
    if let Some(threshold) = args.threshold {
        config.threshold = threshold;
    }
    if let Some(output) = args.output {
        config.output_dir = output;
    }

    let password = read_password()?;
    {
        let _stage = ui.stage("Log in");
        let mut auth = Authenticator::new(SqliteCredentialStore::open(&config.db_path)?);
        auth.login(&args.user, &password)?;
    }

    let origin = match args.origin {
        OriginArg::Image { path } => Origin::Image(path),
        OriginArg::Video { path } => Origin::Video(path),
        OriginArg::Camera { device } => {
            let mut camera = config.camera.clone();
            if let Some(device) = device {
                camera.device = device;
            }
            Origin::Camera(camera)
        }
    };

    let display: Box<dyn FrameSink> = match &args.latest {
        Some(path) => Box::new(LatestFrameSink::new(path)?),
        None => Box::new(DirectorySink::create(&config.output_dir)?),
    };

    let mut controller = {
        let _stage = ui.stage(&format!("Load {} detector", config.profile));
        StreamController::from_config(&config)?
            .with_display(display)
            .with_max_frames(args.max_frames)
    };

    let mut session = {
        let _stage = ui.stage(&format!("Open {}", origin));
        StreamSession::start(&origin)?
    };

    let (handle, mut stop) = stop_channel();
    ctrlc::set_handler(move || handle.stop()).context("failed to install Ctrl-C handler")?;

    let report = {
        let _stage = ui.running("Detecting");
        controller.run(&mut session, &mut stop)
    };
    print_report(&report, &config, args.latest.as_deref());
    Ok(())
}

fn read_password() -> Result<Zeroizing<String>> {
    if let Ok(password) = std::env::var("WATCHPOST_PASSWORD") {
        return Ok(Zeroizing::new(password));
    }
    let stdin = std::io::stdin();
    if stdin.is_terminal() {
        eprint!("password: ");
        std::io::stderr().flush()?;
    }
    let mut line = Zeroizing::new(String::new());
    stdin
        .lock()
        .read_line(&mut line)
        .context("failed to read password from stdin")?;
    Ok(Zeroizing::new(
        line.trim_end_matches(['\r', '\n']).to_string(),
    ))
}

fn print_report(report: &SessionReport, config: &WatchpostConfig, latest: Option<&std::path::Path>) {
    let ending = match &report.end {
        SessionEnd::Exhausted => "end of stream".to_string(),
        SessionEnd::Cancelled => "stopped".to_string(),
        SessionEnd::ReadFailure(reason) => format!("camera failed: {}", reason),
    };
    println!("session finished ({})", ending);
    println!("  frames processed: {}", report.frames_processed);
    if report.frames_skipped > 0 {
        println!("  frames without inference: {}", report.frames_skipped);
    }
    println!("  alerts: {}", report.alerts_emitted);
    if report.notification_failures > 0 {
        println!("  failed deliveries: {}", report.notification_failures);
    }
    match latest {
        Some(path) => println!("  latest frame: {}", path.display()),
        None => println!("  annotated frames: {}", config.output_dir.display()),
    }
}
