use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};
use tracks::TrackStore;

use crate::external::{fetch_oembed, fetch_track, ExternalConfig, Provider, TrackInfo};
use crate::pipeline::MetadataLookup;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolutionSource {
    TrackStore,
    Provider(Provider),
    OEmbed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    Resolved {
        title: String,
        artist: Option<String>,
        source: ResolutionSource,
    },
    Unresolved,
}

impl Resolution {
    pub fn title(&self) -> Option<&str> {
        match self {
            Resolution::Resolved { title, .. } => Some(title),
            Resolution::Unresolved => None,
        }
    }

    pub fn artist(&self) -> Option<&str> {
        match self {
            Resolution::Resolved { artist, .. } => artist.as_deref(),
            Resolution::Unresolved => None,
        }
    }

    fn from_info(info: TrackInfo, source: ResolutionSource) -> Self {
        Resolution::Resolved {
            title: info.title,
            artist: info.artist,
            source,
        }
    }
}

/// Configured lookup sources in order, then oEmbed.
pub struct HttpLookup {
    client: Client,
    config: ExternalConfig,
}

impl HttpLookup {
    pub fn new(client: Client, config: ExternalConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl MetadataLookup for HttpLookup {
    async fn lookup(&self, id: &str) -> Result<Resolution, String> {
        let mut first_error = None;
        for source in &self.config.sources {
            match fetch_track(&self.client, source, id).await {
                Ok(Some(info)) => {
                    debug!("Resolved {} via {}", id, source.provider.label());
                    return Ok(Resolution::from_info(
                        info,
                        ResolutionSource::Provider(source.provider),
                    ));
                }
                Ok(None) => {}
                Err(err) => {
                    warn!("{} lookup for {} failed: {}", source.provider.label(), id, err);
                    first_error.get_or_insert(err);
                }
            }
        }

        match fetch_oembed(&self.client, &self.config, id).await {
            Ok(Some(info)) => Ok(Resolution::from_info(info, ResolutionSource::OEmbed)),
            Ok(None) => match first_error {
                Some(err) => Err(err),
                None => Ok(Resolution::Unresolved),
            },
            Err(err) => Err(first_error.unwrap_or(err)),
        }
    }
}

/// Best-effort title and artist for an item: the curated track record first,
/// then remote lookups.
#[derive(Clone)]
pub struct Resolver {
    store: TrackStore,
    lookup: Arc<dyn MetadataLookup>,
}

impl Resolver {
    pub fn new(store: TrackStore, lookup: Arc<dyn MetadataLookup>) -> Self {
        Self { store, lookup }
    }

    pub async fn resolve(&self, id: &str) -> Result<Resolution, String> {
        let store = self.store.clone();
        let key = id.to_string();
        let record = tokio::task::spawn_blocking(move || store.get(&key))
            .await
            .map_err(|err| err.to_string())?
            .map_err(|err| err.to_string())?;
        if let Some(record) = record {
            if let Some(title) = record.title() {
                return Ok(Resolution::Resolved {
                    title: title.to_string(),
                    artist: record.artist().map(|artist| artist.to_string()),
                    source: ResolutionSource::TrackStore,
                });
            }
        }
        self.lookup.lookup(id).await
    }
}
