mod artwork;
mod audio;
mod command;
mod config;
mod external;
mod fingerprint;
mod notify;
mod pipeline;
mod resolver;
mod retry;
mod run;
mod state;
mod tagging;
mod ytdlp;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use artwork::ThumbnailSource;
use audio::ExternalAudio;
use common::ForbiddenChars;
use config::{config_path_from_env, load_or_create_config, resolve_path, SyncConfig};
use external::{ExternalConfig, ExternalSource, OEMBED_BASE};
use fingerprint::Echoprint;
use notify::{DiscordNotifier, DiscordTarget, LogNotifier};
use pipeline::Notifier;
use reqwest::Client;
use resolver::{HttpLookup, Resolver};
use retry::RetryPolicy;
use state::{Collaborators, SyncSettings, SyncState};
use tagging::LoftyTagger;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracks::TrackStore;
use ytdlp::YtDlp;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config_path = config_path_from_env();
    let (config, created) = load_or_create_config(&config_path)?;
    if created {
        info!("Created default config at {:?}", config_path);
    } else {
        info!("Loaded config from {:?}", config_path);
    }

    let state = build_state(&config_path, &config)?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            cancel.cancel();
        });
    }

    if config.interval_secs == 0 {
        run::sync_and_report(&state, &cancel).await?;
        return Ok(());
    }

    let interval = Duration::from_secs(config.interval_secs);
    info!("Syncing every {:?}", interval);
    loop {
        if let Err(err) = run::sync_and_report(&state, &cancel).await {
            error!("Run failed; retrying at the next interval: {}", err);
        }
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
    Ok(())
}

fn build_state(
    config_path: &Path,
    config: &SyncConfig,
) -> Result<SyncState, Box<dyn std::error::Error>> {
    let timeout = Duration::from_secs(config.lookup_timeout_secs);
    let mut builder = Client::builder().user_agent(concat!(
        "playlist-archiver/",
        env!("CARGO_PKG_VERSION")
    ));
    if let Some(proxy) = config.proxy() {
        builder = builder.proxy(reqwest::Proxy::all(proxy)?);
    }
    let client = builder.build()?;

    let store = TrackStore::open(resolve_path(config_path, &config.tracks_file))?;

    let sources = config
        .metadata_sources
        .iter()
        .filter(|source| source.enabled)
        .map(|source| ExternalSource {
            provider: source.provider,
            base_url: non_empty(&source.url),
            user_agent: non_empty(&source.user_agent),
            timeout,
        })
        .collect();
    let lookup = HttpLookup::new(
        client.clone(),
        ExternalConfig {
            sources,
            oembed_base: OEMBED_BASE.to_string(),
            timeout,
        },
    );

    let notifier: Arc<dyn Notifier> = match DiscordTarget::from_config(&config.discord) {
        Some(target) => Arc::new(DiscordNotifier::new(client.clone(), target, timeout)),
        None => {
            warn!("No Discord webhook or bot configured; notifications go to the log");
            Arc::new(LogNotifier)
        }
    };

    let tools = Collaborators {
        fetcher: Arc::new(YtDlp::new(
            config.tools.yt_dlp.clone(),
            config.proxy().map(|proxy| proxy.to_string()),
        )),
        audio: Arc::new(ExternalAudio::new(
            config.normalizer,
            config.tools.mp3gain.clone(),
            config.tools.ffmpeg.clone(),
            config.tools.sox.clone(),
        )),
        fingerprinter: Arc::new(Echoprint::new(config.tools.fingerprint.clone())),
        artwork: Arc::new(ThumbnailSource::new(client.clone(), timeout)),
        notifier,
        tagger: Arc::new(LoftyTagger),
    };

    let archive_dir = resolve_path(config_path, &config.archive_dir);
    let index_path = if config.index_file.trim().is_empty() {
        archive_dir.join("playlist.m3u")
    } else {
        resolve_path(config_path, &config.index_file)
    };
    let settings = SyncSettings {
        playlist_id: config.playlist_id.clone(),
        work_dir: resolve_path(config_path, &config.work_dir),
        archive_dir,
        index_path,
        forbidden: ForbiddenChars::from(config.forbidden_chars.as_str()),
        compilation_suffix: config.compilation_suffix.clone(),
        download_workers: config.download_workers,
        process_workers: config.process_workers,
        fetch_retry: RetryPolicy::FETCH,
        lookup_retry: RetryPolicy::LOOKUP,
    };
    info!(
        "Archive {:?}, working directory {:?}, {} download / {} process workers",
        settings.archive_dir, settings.work_dir, settings.download_workers, settings.process_workers
    );

    let resolver = Resolver::new(store.clone(), Arc::new(lookup));
    Ok(SyncState {
        settings: Arc::new(settings),
        tools,
        store,
        resolver,
    })
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!("Failed to install terminate signal handler: {}", err);
                if let Err(err) = tokio::signal::ctrl_c().await {
                    warn!("Failed to listen for ctrl-c: {}", err);
                    std::future::pending::<()>().await;
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", err);
            std::future::pending::<()>().await;
        }
    }

    info!("Shutdown signal received.");
}
