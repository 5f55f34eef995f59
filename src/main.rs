use clap::Parser;
use pitch_connect::embed::webdriver::WebDriverFrame;
use pitch_connect::funnel::Screen;
use pitch_connect::narration::{CommandEngine, SpeechEngine};
use pitch_connect::{
    AppConfig, Error, FileStore, KeyValueStore, LinkCodec, MemoryStore, PitchPackage, PitchStore,
    ViewState, Viewer, ViewerCommand,
};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

mod args;
use args::{Args, Command, PackageArgs};

#[tokio::main]
async fn main() {
    // Initialize logging
    env_logger::init();

    // Parse command-line arguments
    let args = Args::parse();

    let config = match load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            ::log::error!("Failed to load configuration: {}", e);
            eprintln!("{e}");
            return;
        }
    };

    let result = match args.command {
        Command::Share(package) => share(&config, package),
        Command::Check(package) => check(package),
        Command::View { link } => view(&config, &link).await,
    };

    if let Err(e) = result {
        ::log::error!("{}", e);
        eprintln!("{e}");
        eprintln!("Start over with `pitch-connect share` to create a new link.");
    }
}

fn load_config(path: Option<&Path>) -> Result<AppConfig, Error> {
    let config = match path {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::default(),
    };
    Ok(config.with_env())
}

/// Opens the pitch store, degrading to memory so sharing still works
fn open_store(config: &AppConfig) -> Box<dyn KeyValueStore> {
    match FileStore::open(&config.store_path) {
        Ok(store) => Box::new(store),
        Err(e) => {
            ::log::warn!(
                "Pitch store at {} is unusable ({}), keeping pitches in memory",
                config.store_path.display(),
                e
            );
            Box::new(MemoryStore::new())
        }
    }
}

fn codec(config: &AppConfig) -> Result<LinkCodec<Box<dyn KeyValueStore>>, Error> {
    let codec = LinkCodec::new(config.base_url()?, PitchStore::new(open_store(config)))
        .with_inline_pitch(config.inline_pitch);
    Ok(codec)
}

fn share(config: &AppConfig, args: PackageArgs) -> Result<(), Error> {
    let package = PitchPackage::new(&args.portfolio, &args.linkedin, &args.pitch)?;
    let encoded = codec(config)?.encode(&package);

    println!("{}", encoded.share_url);
    if let Some(warning) = encoded.storage_warning {
        eprintln!("Warning: the pitch could not be saved ({warning}); the link may not work.");
    }
    Ok(())
}

fn check(args: PackageArgs) -> Result<(), Error> {
    let package = PitchPackage::new(&args.portfolio, &args.linkedin, &args.pitch)?;
    println!("Portfolio: {}", package.portfolio_url());
    println!("LinkedIn:  {}", package.linkedin_url());
    println!("Pitch:     {} characters", package.pitch_text().chars().count());
    Ok(())
}

async fn view(config: &AppConfig, link: &str) -> Result<(), Error> {
    let package = codec(config)?.decode_link(link)?;
    ::log::info!("Opening portfolio {}", package.portfolio_url());

    println!("Note: the portfolio is shown through a WebDriver server (e.g., ChromeDriver).");
    println!("Set WEBDRIVER_URL if not using the default {}", config.webdriver_url);
    let frame = WebDriverFrame::connect(&config.webdriver_url, &config.app_name).await?;

    let engine: Arc<dyn SpeechEngine> = Arc::new(CommandEngine::new(&config.speech_command));
    let mut viewer = Viewer::new(package)
        .with_embed_timeout(config.embed_timeout())
        .with_settle_delay(config.settle_delay())
        .open(frame, engine);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            state = viewer.next_state() => match state {
                Some(state) => {
                    render(&state);
                    if state.screen == Screen::Closed {
                        break;
                    }
                }
                None => break,
            },
            line = lines.next_line() => {
                let command = match line {
                    Ok(Some(line)) => match parse_command(&line) {
                        Some(command) => command,
                        None => {
                            println!("Commands: start, skip, dismiss, quit");
                            continue;
                        }
                    },
                    Ok(None) => ViewerCommand::Close,
                    Err(e) => {
                        ::log::warn!("Failed to read command: {}", e);
                        ViewerCommand::Close
                    }
                };
                viewer.send(command);
            }
        }
    }

    viewer.close().await;
    Ok(())
}

fn parse_command(line: &str) -> Option<ViewerCommand> {
    match line.trim().to_ascii_lowercase().as_str() {
        "start" | "s" | "play" => Some(ViewerCommand::Start),
        "skip" | "k" => Some(ViewerCommand::Skip),
        "dismiss" | "d" => Some(ViewerCommand::Dismiss),
        "quit" | "q" | "close" => Some(ViewerCommand::Close),
        _ => None,
    }
}

fn render(state: &ViewState) {
    match &state.screen {
        Screen::Loading => println!("Loading portfolio..."),
        Screen::Ready => println!("Portfolio loaded. Type `start` to hear the pitch."),
        Screen::Narrating => println!("Playing pitch... (`skip` to stop)"),
        Screen::Finished if state.prompt.is_none() => println!("Pitch finished."),
        Screen::Finished => {}
        Screen::LoadFailed { reason } => {
            println!("Failed to load portfolio ({reason}). Please check the URL.");
            println!("Start over with `pitch-connect share` to create a new link.");
        }
        Screen::EmbedBlocked { portfolio_url } => {
            println!("This portfolio can't be displayed here due to its security settings.");
            println!("Open it in a new tab instead: {portfolio_url}");
        }
        Screen::Closed => ::log::debug!("Viewer closed"),
    }

    if let Some(linkedin_url) = &state.prompt {
        println!("Let's connect! {linkedin_url}");
        println!("(`dismiss` to close, `start` to hear the pitch again)");
    }
}
