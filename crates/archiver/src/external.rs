use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use common::origin_url;

pub const MUSICBRAINZ_BASE: &str = "https://musicbrainz.org";
pub const OEMBED_BASE: &str = "https://www.youtube.com/oembed";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    MusicBrainz,
    LookupService,
}

impl Provider {
    pub fn label(&self) -> &'static str {
        match self {
            Provider::MusicBrainz => "musicbrainz",
            Provider::LookupService => "lookup service",
        }
    }
}

#[derive(Clone, Debug)]
pub struct ExternalSource {
    pub provider: Provider,
    pub base_url: Option<String>,
    pub user_agent: Option<String>,
    pub timeout: Duration,
}

#[derive(Clone, Debug)]
pub struct ExternalConfig {
    pub sources: Vec<ExternalSource>,
    pub oembed_base: String,
    pub timeout: Duration,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackInfo {
    pub title: String,
    pub artist: Option<String>,
}

/// Asks one configured source about the item. `Ok(None)` means the source
/// answered but knows nothing useful.
pub async fn fetch_track(
    client: &Client,
    source: &ExternalSource,
    id: &str,
) -> Result<Option<TrackInfo>, String> {
    match source.provider {
        Provider::MusicBrainz => fetch_musicbrainz_track(client, source, id).await,
        Provider::LookupService => fetch_lookup_service_track(client, source, id).await,
    }
}

#[derive(Deserialize)]
struct OEmbedResponse {
    title: Option<String>,
    author_name: Option<String>,
}

/// Title and channel name from the oEmbed endpoint. Any non-200 answer is
/// treated as "not found".
pub async fn fetch_oembed(
    client: &Client,
    config: &ExternalConfig,
    id: &str,
) -> Result<Option<TrackInfo>, String> {
    let url = format!(
        "{}?url={}&format=json",
        config.oembed_base.trim_end_matches('/'),
        url_escape(&format!("https://www.youtube.com/watch?v={}", id))
    );
    let response = client
        .get(&url)
        .timeout(config.timeout)
        .send()
        .await
        .map_err(|err| err.to_string())?;
    if response.status() != StatusCode::OK {
        return Ok(None);
    }
    let payload = response
        .json::<OEmbedResponse>()
        .await
        .map_err(|err| err.to_string())?;
    Ok(clean_text(payload.title).map(|title| TrackInfo {
        title,
        artist: clean_text(payload.author_name),
    }))
}

#[derive(Deserialize)]
struct LookupServiceResponse {
    title: Option<String>,
    author: Option<String>,
}

async fn fetch_lookup_service_track(
    client: &Client,
    source: &ExternalSource,
    id: &str,
) -> Result<Option<TrackInfo>, String> {
    let base = match source.base_url.as_deref().map(str::trim) {
        Some(base) if !base.is_empty() => base,
        _ => return Ok(None),
    };
    let url = format!("{}?url={}", base, url_escape(&origin_url(id)));
    let mut request = client.get(&url).timeout(source.timeout);
    if let Some(user_agent) = source.user_agent.as_deref().map(str::trim) {
        if !user_agent.is_empty() {
            request = request.header("User-Agent", user_agent);
        }
    }
    let response = request.send().await.map_err(|err| err.to_string())?;
    if response.status() == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    if !response.status().is_success() {
        return Err(format!("http {}", response.status()));
    }
    let payload = response
        .json::<LookupServiceResponse>()
        .await
        .map_err(|err| err.to_string())?;
    Ok(clean_text(payload.title).map(|title| TrackInfo {
        title,
        artist: clean_text(payload.author),
    }))
}

#[derive(Deserialize)]
struct MusicBrainzUrlList {
    #[serde(default)]
    urls: Vec<MusicBrainzUrlMatch>,
}

#[derive(Deserialize)]
struct MusicBrainzUrlMatch {
    resource: Option<String>,
    #[serde(rename = "relation-list", default)]
    relation_list: Vec<MusicBrainzRelationList>,
}

#[derive(Deserialize)]
struct MusicBrainzRelationList {
    #[serde(default)]
    relations: Vec<MusicBrainzRelation>,
}

#[derive(Deserialize)]
struct MusicBrainzRelation {
    release: Option<MusicBrainzEntity>,
}

#[derive(Deserialize)]
struct MusicBrainzEntity {
    id: String,
}

#[derive(Deserialize)]
struct MusicBrainzRelease {
    title: Option<String>,
    #[serde(rename = "artist-credit", default)]
    artist_credit: Vec<MusicBrainzArtistCredit>,
}

#[derive(Deserialize)]
struct MusicBrainzArtistCredit {
    name: Option<String>,
    artist: Option<MusicBrainzArtist>,
}

#[derive(Deserialize)]
struct MusicBrainzArtist {
    name: Option<String>,
}

fn video_url_variants(id: &str) -> [String; 3] {
    [
        format!("https://www.youtube.com/watch?v={}", id),
        origin_url(id),
        format!("https://music.youtube.com/watch?v={}", id),
    ]
}

async fn fetch_musicbrainz_track(
    client: &Client,
    source: &ExternalSource,
    id: &str,
) -> Result<Option<TrackInfo>, String> {
    let user_agent = source.user_agent.as_deref().unwrap_or("").trim();
    if user_agent.is_empty() {
        return Ok(None);
    }
    let base = source
        .base_url
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(MUSICBRAINZ_BASE)
        .trim_end_matches('/');

    let mut release_id = None;
    for variant in video_url_variants(id) {
        let url = format!(
            "{}/ws/2/url?query={}&fmt=json",
            base,
            url_escape(&format!("\"{}\"", variant))
        );
        let response = client
            .get(&url)
            .timeout(source.timeout)
            .header("User-Agent", user_agent)
            .send()
            .await
            .map_err(|err| err.to_string())?;
        if !response.status().is_success() {
            return Err(format!("http {}", response.status()));
        }
        let payload = response
            .json::<MusicBrainzUrlList>()
            .await
            .map_err(|err| err.to_string())?;
        if let Some(found) = release_for_resource(&payload, &variant) {
            release_id = Some(found);
            break;
        }
    }

    let release_id = match release_id {
        Some(release_id) => release_id,
        None => return Ok(None),
    };
    let url = format!(
        "{}/ws/2/release/{}?inc=artists&fmt=json",
        base,
        url_escape(&release_id)
    );
    let response = client
        .get(&url)
        .timeout(source.timeout)
        .header("User-Agent", user_agent)
        .send()
        .await
        .map_err(|err| err.to_string())?;
    if !response.status().is_success() {
        return Err(format!("http {}", response.status()));
    }
    let release = response
        .json::<MusicBrainzRelease>()
        .await
        .map_err(|err| err.to_string())?;
    Ok(track_from_release(release))
}

fn release_for_resource(payload: &MusicBrainzUrlList, resource: &str) -> Option<String> {
    let url_match = payload.urls.first()?;
    if url_match.resource.as_deref() != Some(resource) {
        return None;
    }
    url_match
        .relation_list
        .iter()
        .flat_map(|list| list.relations.iter())
        .find_map(|relation| relation.release.as_ref().map(|release| release.id.clone()))
}

fn track_from_release(release: MusicBrainzRelease) -> Option<TrackInfo> {
    let title = clean_text(release.title)?;
    let artist = release.artist_credit.into_iter().next().and_then(|credit| {
        clean_text(credit.artist.and_then(|artist| artist.name)).or_else(|| clean_text(credit.name))
    });
    Some(TrackInfo { title, artist })
}

pub fn clean_text(value: Option<String>) -> Option<String> {
    let value = value?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn url_escape(input: &str) -> String {
    let mut out = String::new();
    for byte in input.as_bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(*byte as char)
            }
            b' ' => out.push_str("%20"),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_reserved_bytes() {
        assert_eq!(url_escape("a b"), "a%20b");
        assert_eq!(
            url_escape("https://youtu.be/x"),
            "https%3A%2F%2Fyoutu.be%2Fx"
        );
        assert_eq!(url_escape("\"q\""), "%22q%22");
    }

    #[test]
    fn finds_release_for_exact_resource() {
        let raw = r#"{
            "created": "2024-01-01T00:00:00Z",
            "count": 1,
            "urls": [{
                "id": "u1",
                "resource": "https://youtu.be/abc",
                "relation-list": [
                    {"relations": [{"type": "streaming"}, {"release": {"id": "rel-1"}}]}
                ]
            }]
        }"#;
        let payload: MusicBrainzUrlList = serde_json::from_str(raw).unwrap();
        assert_eq!(
            release_for_resource(&payload, "https://youtu.be/abc"),
            Some("rel-1".to_string())
        );
        assert_eq!(release_for_resource(&payload, "https://youtu.be/other"), None);
    }

    #[test]
    fn empty_search_has_no_release() {
        let payload: MusicBrainzUrlList = serde_json::from_str(r#"{"urls": []}"#).unwrap();
        assert_eq!(release_for_resource(&payload, "https://youtu.be/abc"), None);
    }

    #[test]
    fn release_takes_first_credited_artist() {
        let raw = r#"{
            "title": " Song ",
            "artist-credit": [
                {"name": "Credit", "artist": {"name": "Main"}},
                {"name": "Second", "artist": {"name": "Other"}}
            ]
        }"#;
        let release: MusicBrainzRelease = serde_json::from_str(raw).unwrap();
        assert_eq!(
            track_from_release(release),
            Some(TrackInfo {
                title: "Song".to_string(),
                artist: Some("Main".to_string()),
            })
        );
    }

    #[test]
    fn release_without_title_is_ignored() {
        let release: MusicBrainzRelease = serde_json::from_str(r#"{"title": ""}"#).unwrap();
        assert!(track_from_release(release).is_none());
    }

    #[test]
    fn lists_video_url_variants() {
        let variants = video_url_variants("abc");
        assert_eq!(variants[0], "https://www.youtube.com/watch?v=abc");
        assert_eq!(variants[1], "https://youtu.be/abc");
        assert_eq!(variants[2], "https://music.youtube.com/watch?v=abc");
    }
}
