//! Photo studio bootstrap
//!
//! Runs the resume step once, the way the mini-app does before showing any
//! view: inspect the launch URL, reconcile the pending purchase with the
//! server, and follow the resulting generation job to the end.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use photo_core::{
    BuyerId, ClientPreferences, DurableStore, PersistentIntentStore, PollingController,
    StudioConfig, SystemClock,
};
use photo_generation::{GenerationResumeCoordinator, GenerationTracker, ResumeOutcome};
use photo_runtime::{FileDurableStore, HttpStudioApi};

/// Resume an interrupted photo purchase.
#[derive(Parser, Debug)]
#[command(name = "photo-app", version, about, long_about = None)]
struct Args {
    /// URL the app was launched with (e.g. `https://app.example/?resume=1`)
    #[arg(long)]
    launch_url: String,

    /// Client state file (pending intent, buyer identity, preferences)
    #[arg(long, default_value = "photo-state.json")]
    state_file: PathBuf,

    /// Buyer identity of the established session; remembered for later launches
    #[arg(long)]
    buyer_id: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = StudioConfig::from_env()?;
    tracing::info!(api = %config.api_base_url, state = %args.state_file.display(), "Starting photo studio");

    let store: Arc<dyn DurableStore> = Arc::new(FileDurableStore::open(&args.state_file)?);
    let preferences = ClientPreferences::new(store.clone());
    let session_buyer = match args.buyer_id {
        Some(id) => {
            let id = BuyerId::new(id);
            preferences.set_buyer_id(&id)?;
            Some(id)
        }
        None => preferences.buyer_id()?,
    };

    let api = Arc::new(HttpStudioApi::from_config(&config)?);
    let intents = PersistentIntentStore::new(store, Arc::new(SystemClock));
    let polls = PollingController::new();
    let coordinator = GenerationResumeCoordinator::new(api, intents, polls.clone()).with_config(&config);

    let result = run(&coordinator, &preferences, &args.launch_url, session_buyer.as_ref()).await;
    polls.shutdown();
    result
}

async fn run(
    coordinator: &GenerationResumeCoordinator,
    preferences: &ClientPreferences,
    launch_url: &str,
    session_buyer: Option<&BuyerId>,
) -> anyhow::Result<()> {
    let report = match coordinator.run(launch_url, session_buyer).await {
        Ok(report) => report,
        Err(e) => {
            eprintln!("{}", e.user_message());
            return Err(e.into());
        }
    };
    println!("location: {}", report.cleaned_url);

    match report.outcome {
        ResumeOutcome::ColdStart if preferences.has_pro_credit()? => {
            println!("a paid generation is waiting for reference photos");
        }
        ResumeOutcome::ColdStart => println!("nothing to resume"),
        ResumeOutcome::RouteToUpload {
            avatar_id,
            pro_credit,
        } => match avatar_id {
            Some(id) => println!("upload reference photos for avatar {id} (credit kept: {pro_credit})"),
            None => println!("create an avatar and upload reference photos (credit kept: {pro_credit})"),
        },
        ResumeOutcome::Tracking(tracker) => follow(&tracker).await?,
    }
    Ok(())
}

async fn follow(tracker: &GenerationTracker) -> anyhow::Result<()> {
    let mut updates = tracker.subscribe();
    let progress = tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let snapshot = updates.borrow_and_update().clone();
            println!(
                "job {}: {}/{} photos, {} received",
                snapshot.job_id,
                snapshot.progress.completed,
                snapshot.progress.total,
                snapshot.assets.len()
            );
        }
    });

    let outcome = tokio::select! {
        outcome = tracker.wait() => outcome,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, stopping generation tracking");
            tracker.stop();
            tracker.wait().await
        }
    };
    progress.abort();

    match outcome.into_result() {
        Ok(job) => {
            for asset in &job.completed {
                println!("{}", asset.url);
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("{}", e.user_message());
            Err(e.into())
        }
    }
}
