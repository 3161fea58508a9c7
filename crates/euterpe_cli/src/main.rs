use clap::Parser;
use euterpe_client::ApiClient;
use euterpe_core::{EuterpeConfig, FeedbackRating};
use euterpe_session::{FrameDirectory, SessionController, SessionHandle, SessionNotice};
use std::io::{self, Write};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the config file
    #[arg(short, long, default_value = "euterpe.toml")]
    config: String,

    /// Base URL of the prediction service (overrides the config file)
    #[arg(long, env = "EUTERPE_SERVICE_URL")]
    service_url: Option<String>,

    /// Directory of still frames to use as the capture device
    #[arg(long, env = "EUTERPE_FRAMES_DIR")]
    frames: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    // 1. Configuration
    let mut config = EuterpeConfig::load_or_default(&args.config);
    if let Some(url) = args.service_url {
        config.service.base_url = url;
    }
    if let Some(frames) = args.frames {
        config.capture.frames_dir = Some(frames);
    }
    let Some(frames_dir) = config.capture.frames_dir.clone() else {
        anyhow::bail!(
            "no capture source configured; set capture.frames_dir in {} or pass --frames",
            args.config
        );
    };

    // 2. Service client
    info!("Connecting to {}...", config.service.base_url);
    let client = ApiClient::new(&config.service)?;
    match client.health().await {
        Ok(health) => {
            info!(
                "Service is {}, catalog {}",
                health.status,
                if health.catalog_loaded {
                    "loaded"
                } else {
                    "not synced"
                }
            );
        }
        Err(e) => warn!("Service health check failed ({e}), continuing anyway"),
    }

    // 3. Session
    let device = FrameDirectory::new(&frames_dir);
    let (controller, handle, mut notices) =
        SessionController::new(client.clone(), Box::new(device), &config);
    let session = controller.spawn();

    let printer = tokio::spawn(async move {
        while let Some(notice) = notices.recv().await {
            print_notice(notice);
            print!("> ");
            let _ = io::stdout().flush();
        }
    });

    println!("Euterpe online. Frames from {frames_dir}. Type 'help' for commands.");
    print!("> ");
    io::stdout().flush()?;

    let stdin = io::stdin();
    let mut input = String::new();

    loop {
        input.clear();
        stdin.read_line(&mut input)?;
        let trimmed = input.trim();
        let (command, rest) = match trimmed.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim()),
            None => (trimmed, ""),
        };

        match command {
            "" => {}
            "quit" | "exit" => break,
            "help" => print_help(),
            "start" => handle.start_detection().await?,
            "stop" => handle.stop_detection().await?,
            "say" => {
                if rest.is_empty() {
                    println!("Usage: say <how you feel>");
                } else {
                    handle.submit_text(rest).await?;
                }
            }
            "like" => handle.submit_feedback(FeedbackRating::Like).await?,
            "dislike" => handle.submit_feedback(FeedbackRating::Dislike).await?,
            "skip" => handle.submit_feedback(FeedbackRating::Skip).await?,
            "now" => print_now(&handle),
            "history" => print_history(&handle).await,
            "summary" => print_summary(&handle).await,
            "stats" => print_stats(&client).await,
            "sync" => run_sync(&client).await,
            "health" => print_health(&client).await,
            other => println!("Unknown command '{other}'. Type 'help' for commands."),
        }

        print!("> ");
        io::stdout().flush()?;
    }

    drop(handle);
    let _ = session.await;
    let _ = printer.await;
    Ok(())
}

fn print_help() {
    println!("Commands:");
    println!("  start / stop      begin or pause emotion detection");
    println!("  say <text>        add a line of text to the next estimate");
    println!("  like / dislike    rate the current track");
    println!("  skip              rate and replace the current track");
    println!("  now               current estimate and track");
    println!("  history           recent estimates");
    println!("  summary           session totals");
    println!("  stats             catalog statistics");
    println!("  sync              fetch the playlist into the catalog");
    println!("  health            service health");
    println!("  quit              leave");
}

fn print_notice(notice: SessionNotice) {
    match notice {
        SessionNotice::NowPlaying(track) => {
            println!("\nNow playing: {}", track.describe());
            println!(
                "  valence {:.2}, energy {:.2}  {}",
                track.valence, track.energy, track.external_url
            );
        }
        SessionNotice::DeviceUnavailable(reason) => {
            println!("\nCapture device unavailable: {reason}");
        }
        SessionNotice::DeviceRecovered => println!("\nCapture device is back."),
        SessionNotice::TextAnalyzed(result) => {
            println!(
                "\nText reads {} ({:.0}% confident); it joins the next estimate.",
                result.emotion,
                result.confidence * 100.0
            );
        }
        SessionNotice::TextFailed(reason) => println!("\nText analysis failed: {reason}"),
        SessionNotice::RecommendationFailed(reason) => {
            println!("\nCould not fetch a recommendation: {reason}");
        }
        SessionNotice::CatalogNotReady => {
            println!("\nNo catalog yet. Run 'sync' to fetch the playlist first.");
        }
        SessionNotice::FeedbackLogged(rating) => println!("\nFeedback recorded: {rating}"),
        SessionNotice::FeedbackFailed(reason) => println!("\nFeedback not recorded: {reason}"),
    }
}

fn print_now(handle: &SessionHandle) {
    match handle.current_estimate() {
        Some(estimate) => {
            println!(
                "Feeling {} ({:.0}% confident)",
                estimate.emotion,
                estimate.confidence * 100.0
            );
            for (modality, confidence) in &estimate.per_modality {
                println!("  {modality}: {:.0}%", confidence * 100.0);
            }
        }
        None => println!("No estimate yet. 'start' begins detection."),
    }
    match handle.current_recommendation() {
        Some(track) => {
            println!("Playing: {}", track.describe());
            println!("  {}", track.external_url);
        }
        None => println!("Nothing playing."),
    }
}

async fn print_history(handle: &SessionHandle) {
    let snapshot = handle.history_snapshot().await;
    if snapshot.is_empty() {
        println!("No estimates recorded yet.");
        return;
    }
    let start = snapshot.len().saturating_sub(10);
    for entry in &snapshot[start..] {
        println!(
            "  {}  {} ({:.0}%)",
            entry.at.format("%H:%M:%S"),
            entry.estimate.emotion,
            entry.estimate.confidence * 100.0
        );
    }
    println!("{} entries total.", snapshot.len());
}

async fn print_summary(handle: &SessionHandle) {
    let summary = handle.history_summary().await;
    if summary.entries == 0 {
        println!("Nothing to summarize yet.");
        return;
    }
    println!(
        "{} estimates, mean confidence {:.0}%",
        summary.entries,
        summary.mean_confidence * 100.0
    );
    for (emotion, count) in &summary.counts {
        println!("  {emotion}: {count}");
    }
    if let Some(dominant) = summary.dominant {
        println!("Dominant mood: {dominant}");
    }
}

async fn print_stats(client: &ApiClient) {
    match client.playlist_stats().await {
        Ok(stats) if stats.cached => {
            println!(
                "{} songs, {:.1} hours, valence {:.2}, energy {:.2}",
                stats.total_songs,
                stats.total_duration_hours,
                stats.average_valence,
                stats.average_energy
            );
            for (emotion, count) in &stats.mood_distribution {
                println!("  {emotion}: {count}");
            }
        }
        Ok(_) => println!("Catalog not synced yet. Run 'sync' first."),
        Err(e) => println!("Stats unavailable: {e}"),
    }
}

async fn run_sync(client: &ApiClient) {
    println!("Syncing the playlist; this can take a while...");
    match client.sync_catalog().await {
        Ok(report) => {
            let count = report.songs_cached.unwrap_or(0);
            println!("Synced {count} songs.");
        }
        Err(e) => println!("Sync failed: {e}"),
    }
}

async fn print_health(client: &ApiClient) {
    match client.health().await {
        Ok(health) => {
            println!("Service: {}", health.status);
            println!(
                "  models: {}",
                if health.models_loaded {
                    "loaded"
                } else {
                    "missing"
                }
            );
            println!(
                "  catalog: {}",
                if health.catalog_loaded {
                    "loaded"
                } else {
                    "not synced"
                }
            );
        }
        Err(e) => println!("Service unreachable: {e}"),
    }
}
