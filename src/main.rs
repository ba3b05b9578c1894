use std::{
    error::Error,
    io::Write,
    path::{Path, PathBuf},
    process,
};

use clap::{command, Parser, Subcommand, ValueHint};
use log::{debug, error, info, warn, LevelFilter};
use tokio_util::sync::CancellationToken;
use url::Url;

use cloudtune::{
    client::Api,
    config::Config,
    download::{Downloader, Job, JobState},
    error::ErrorKind,
    gate::Gate,
    login,
    resolve::{self, Dispatcher, Mode},
    session::Credential,
    track::{Quality, Track},
};

/// Profile to display when not built in release mode.
#[cfg(debug_assertions)]
const BUILD_PROFILE: &str = "debug";
/// Profile to display when built in release mode.
#[cfg(not(debug_assertions))]
const BUILD_PROFILE: &str = "release";

/// Group name for mutually exclusive logging options.
const ARGS_GROUP_LOGGING: &str = "logging";

/// Command line arguments as parsed by `clap`.
#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Resolver service URL
    #[arg(
        short,
        long,
        value_name = "URL",
        value_hint = ValueHint::Url,
        env = "CLOUDTUNE_SERVER",
        default_value_t = String::from("http://127.0.0.1:5151")
    )]
    server: String,

    /// Secrets file
    ///
    /// Holds the catalog session cookie captured by `login`. Ensure that
    /// this file is kept secure and not shared publicly, as it grants
    /// access to your catalog account.
    #[arg(short = 'f', long, value_name = "FILE", value_hint = ValueHint::FilePath, default_value_t = String::from("secrets.toml"))]
    secrets_file: String,

    /// Quality tier
    ///
    /// One of: standard, exhigh, lossless, hires, jyeffect, sky, jymaster.
    ///
    /// [default: lossless]
    #[arg(short, long, value_name = "TIER")]
    quality: Option<Quality>,

    /// Downloads directory
    #[arg(short, long, value_name = "DIR", value_hint = ValueHint::DirPath, default_value_t = String::from("downloads"))]
    output: String,

    /// Suppresses all output except warnings and errors.
    #[arg(short = 'Q', long, default_value_t = false, group = ARGS_GROUP_LOGGING)]
    quiet: bool,

    /// Enable verbose logging
    ///
    /// Specify twice for trace logging.
    #[arg(short, long, action = clap::ArgAction::Count, group = ARGS_GROUP_LOGGING)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, Subcommand)]
enum Command {
    /// Sign in by scanning a QR code with the catalog app
    Login {
        /// Password unlocking the QR feature on the service
        #[arg(long, value_name = "PASSWORD")]
        password: Option<String>,

        /// Also write the code as a PNG image
        #[arg(long, value_name = "FILE", value_hint = ValueHint::FilePath)]
        image: Option<PathBuf>,
    },

    /// Show validity and entitlement of the stored session
    Status,

    /// Search the catalog by keyword
    Search {
        keyword: String,

        /// Maximum number of results
        #[arg(short, long, value_name = "N", default_value_t = 30)]
        limit: u32,
    },

    /// Resolve a link or ID and list its tracks
    Resolve {
        /// Catalog link or numeric ID
        input: String,

        /// song, playlist or album; inferred from links when omitted
        #[arg(short, long, value_name = "MODE")]
        mode: Option<Mode>,

        /// Page of the listing to show
        #[arg(short, long, value_name = "N", default_value_t = 1)]
        page: usize,
    },

    /// Download a song, or a whole playlist or album
    Download {
        /// Catalog link or numeric ID
        input: String,

        /// song, playlist or album; inferred from links when omitted
        #[arg(short, long, value_name = "MODE")]
        mode: Option<Mode>,

        /// Downloads in flight at once during a batch
        ///
        /// [default: 1, one at a time]
        #[arg(long, value_name = "N")]
        concurrency: Option<usize>,
    },
}

/// Initializes the logger facade.
///
/// The logging level is determined as follows, in order of precedence from
/// highest to lowest:
/// 1. Command line arguments
/// 2. `RUST_LOG` environment variable
/// 3. Hard coded default
///
/// # Panics
///
/// Panics when a logger facade is already initialized.
fn init_logger(config: &Args) {
    let mut logger = env_logger::Builder::from_env(
        // Note: if you change the default logging level here, then you should
        // probably also change the verbosity levels below.
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    if config.quiet || config.verbose > 0 {
        let level = match config.verbose {
            0 => {
                // Quiet and verbose are mutually exclusive, and `verbose` is 0
                // by default. So this arm means: quiet mode.
                LevelFilter::Warn
            }
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };

        // Filter log messages of external crates.
        logger.filter_module(module_path!(), level);
    }

    logger.init();
}

/// Picks the resolve mode: explicit flag first, link inference second.
fn pick_mode(explicit: Option<Mode>, input: &str) -> Result<Mode, cloudtune::error::Error> {
    match explicit {
        Some(mode) => Ok(mode),
        None => resolve::detect_mode(input).ok_or_else(|| {
            cloudtune::error::Error::invalid_argument(
                "cannot tell what this input is; pass --mode song, playlist or album",
            )
        }),
    }
}

/// In-place progress line for a single download.
fn render_progress(job: &Job) {
    match job.state() {
        JobState::Fetching => print!("\r{}  {:>3}%", job.name, job.progress()),
        JobState::Done => print!("\r{}  100%  done", job.name),
        JobState::Failed => print!("\r{}  failed   ", job.name),
        JobState::TimedOut => print!("\r{}  timed out", job.name),
        JobState::Pending => {}
    }
    let _ = std::io::stdout().flush();
}

/// Prints the current page of the displayed collection with the page
/// controls underneath.
fn render_listing(dispatcher: &Dispatcher) {
    let (Some(collection), Some(view)) = (dispatcher.collection(), dispatcher.page()) else {
        return;
    };

    let mut header = format!("{} \"{}\"", collection.kind, collection.name);
    if !collection.owner.is_empty() {
        header.push_str(&format!(" by {}", collection.owner));
    }
    if let Some(published) = &collection.published {
        header.push_str(&format!(" ({published})"));
    }
    println!("{header}: {} tracks", collection.total());

    let (start, _) = view.bounds();
    for (offset, track) in view.slice(&collection.tracks).iter().enumerate() {
        let note = track
            .library_note()
            .map(|note| format!("  [{note}]"))
            .unwrap_or_default();
        println!(
            "{:>4}. {} - {}  {}{note}",
            start + offset + 1,
            track.artist,
            track.title,
            track.duration_display(),
        );
    }

    if view.total_pages() > 1 {
        let mut buttons = String::new();
        buttons.push_str(if view.has_prev() { "‹ " } else { "  " });
        for page in view.window() {
            if page == view.current() {
                buttons.push_str(&format!("[{page}] "));
            } else {
                buttons.push_str(&format!("{page} "));
            }
        }
        if view.has_next() {
            buttons.push('›');
        }
        println!(
            "page {}/{}  {}",
            view.current(),
            view.total_pages(),
            buttons.trim_end()
        );
    }
}

/// Main application flow.
///
/// # Errors
///
/// This function returns an error when a command fails. The failure has
/// already been logged or printed in context by then.
async fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let base_url = args.server.parse::<Url>()?;
    let mut config = Config::with_base_url(base_url);
    if let Some(quality) = args.quality {
        config.quality = quality;
    }
    config.downloads_dir = PathBuf::from(&args.output);

    let api = Api::new(&config)?;

    match args.command {
        Command::Login { password, image } => {
            let outcome = login::run(&api, password.as_deref(), image.as_deref()).await?;
            outcome.credential.save(Path::new(&args.secrets_file))?;
            info!("session saved to {}", args.secrets_file);
            println!("signed in{}", if outcome.is_vip { " (VIP)" } else { "" });

            // Re-validate through the service so a broken save shows up now.
            match api.cookie_status().await {
                Ok(status) if status.valid => info!("session verified"),
                Ok(_) => warn!("the service does not see the fresh session as valid yet"),
                Err(e) => warn!("could not verify the fresh session: {e}"),
            }
        }

        Command::Status => {
            match Credential::from_file(Path::new(&args.secrets_file)) {
                Ok(_) => println!("local credential: {}", args.secrets_file),
                Err(e) => println!("local credential: none ({e})"),
            }
            let status = api.cookie_status().await?;
            println!("session valid:   {}", status.valid);
            println!("vip entitlement: {}", status.is_vip);
        }

        Command::Search { keyword, limit } => {
            let hits = api.search(&keyword, limit).await?;
            if hits.is_empty() {
                println!("no results for \"{keyword}\"");
            }
            for hit in hits {
                let track = Track::from(hit);
                let note = track
                    .library_note()
                    .map(|note| format!("  [{note}]"))
                    .unwrap_or_default();
                println!(
                    "{:>12}  {} - {} ({}){note}",
                    track.id, track.artist, track.title, track.album
                );
            }
        }

        Command::Resolve { input, mode, page } => {
            let mode = pick_mode(mode, &input)?;
            let mut dispatcher = Dispatcher::new();

            let ticket = dispatcher.begin();
            let collection = resolve::resolve(&api, mode, &input, config.quality).await?;
            dispatcher.commit(ticket, collection);

            if page > 1 {
                let jumped = dispatcher
                    .page_mut()
                    .is_some_and(|view| view.goto(page));
                if !jumped {
                    return Err(cloudtune::error::Error::out_of_range(format!(
                        "page {page} does not exist"
                    ))
                    .into());
                }
            }
            render_listing(&dispatcher);
        }

        Command::Download {
            input,
            mode,
            concurrency,
        } => {
            if let Some(concurrency) = concurrency {
                config.batch_concurrency = concurrency.max(1);
            }
            let mode = pick_mode(mode, &input)?;

            // Downloads need a valid, VIP-entitled session; checked per
            // action, right before the parse.
            let gate = Gate::new(&api);
            let collection = match gate
                .require(|| resolve::resolve(&api, mode, &input, config.quality))
                .await
            {
                Ok(collection) => collection,
                Err(e) => {
                    if e.kind == ErrorKind::Unauthenticated {
                        eprintln!("session is missing or expired; run `cloudtune login` first");
                    }
                    return Err(e.into());
                }
            };

            if collection.is_empty() {
                warn!("nothing to download in {} \"{}\"", collection.kind, collection.name);
                return Ok(());
            }

            let downloader = Downloader::new(&api, &config);
            let cancel = CancellationToken::new();
            let signal_token = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("cancelling; letting items in flight finish");
                    signal_token.cancel();
                }
            });

            if collection.len() == 1 {
                let mut job = Job::new(&collection.tracks[0], config.quality);
                let ok = downloader.fetch_one(&mut job, render_progress).await;
                println!();
                if !ok {
                    return Err(cloudtune::error::Error::unknown("download failed").into());
                }
            } else {
                println!(
                    "downloading {} tracks from {} \"{}\"",
                    collection.len(),
                    collection.kind,
                    collection.name
                );
                let report = downloader
                    .fetch_all(&collection.tracks, config.quality, &cancel, |job| {
                        let mark = match job.state() {
                            JobState::Done => "ok",
                            JobState::TimedOut => "timeout",
                            _ => "failed",
                        };
                        println!("[{mark:>7}] {}", job.name);
                    })
                    .await;

                let mut summary = format!("{} done, {} failed", report.completed, report.failed);
                if report.cancelled {
                    summary.push_str(&format!(", {} skipped (cancelled)", report.skipped));
                }
                println!("{summary}");
            }
        }
    }

    Ok(())
}

/// Main entry point of the application.
///
/// This function initializes the logger facade, parses the command line
/// arguments, and runs the selected command.
#[tokio::main]
async fn main() {
    // `clap` handles our command line arguments and help text.
    let args = Args::parse();
    init_logger(&args);

    // Dump command line arguments before we do anything more.
    // This aids in debugging of whatever comes next.
    debug!("Command {:#?}", args);

    let cmd = command!();
    let name = cmd.get_name().to_string();
    let version = cmd.get_version().unwrap_or("UNKNOWN").to_string();

    info!("starting {name}/{version}; {BUILD_PROFILE}");

    if let Err(e) = run(args).await {
        error!("{e}");
        process::exit(1);
    }
}
