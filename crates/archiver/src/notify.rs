use std::time::Duration;

use async_trait::async_trait;
use common::{origin_url, TrackRecord};
use reqwest::Client;
use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::info;

use crate::config::DiscordConfig;
use crate::pipeline::Notifier;
use crate::state::RunReport;

pub const COLOR_SUCCESS: u32 = 0x00ff00;
pub const COLOR_ERROR: u32 = 0xff0000;
pub const COLOR_INFO: u32 = 0x3498db;

const DISCORD_API: &str = "https://discord.com/api";

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Notification {
    pub content: String,
    pub embed: Embed,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Embed {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub color: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

impl Notification {
    pub fn published(id: &str, record: &TrackRecord, file_name: &str) -> Self {
        let mut fields = Vec::new();
        for (name, value) in [
            ("Title", record.title()),
            ("Artist", record.artist()),
            ("Album", record.album.as_deref()),
            ("Album artist", record.album_artist.as_deref()),
        ] {
            if let Some(value) = value.filter(|value| !value.trim().is_empty()) {
                fields.push(EmbedField {
                    name: name.to_string(),
                    value: value.to_string(),
                    inline: true,
                });
            }
        }
        let title = match record.title_and_artist() {
            Some((title, artist)) => format!("{} - {}", title, artist),
            None => format!("Downloaded {}", id),
        };
        let description = if record.title_and_artist().is_some() {
            None
        } else {
            Some("Track metadata is not curated yet.".to_string())
        };
        Self {
            content: format!("Archived `{}`", file_name),
            embed: Embed {
                title,
                description,
                url: Some(origin_url(id)),
                color: COLOR_SUCCESS,
                fields,
                timestamp: now_rfc3339(),
            },
        }
    }

    pub fn run_failed(message: &str) -> Self {
        Self {
            content: "Playlist sync failed".to_string(),
            embed: Embed {
                title: "Error".to_string(),
                description: Some(message.to_string()),
                url: None,
                color: COLOR_ERROR,
                fields: Vec::new(),
                timestamp: now_rfc3339(),
            },
        }
    }

    pub fn summary(report: &RunReport) -> Self {
        let fields = vec![
            count_field("Playlist", report.playlist_len),
            count_field("Downloaded", report.downloaded),
            count_field("Published", report.published.len()),
            count_field("Unchanged", report.unchanged.len()),
            count_field("Failed", report.download_failures.len() + report.item_failures.len()),
            count_field("Removed", report.pruned.len()),
        ];
        Self {
            content: "Playlist sync finished".to_string(),
            embed: Embed {
                title: "Sync summary".to_string(),
                description: None,
                url: None,
                color: COLOR_INFO,
                fields,
                timestamp: now_rfc3339(),
            },
        }
    }
}

fn count_field(name: &str, value: usize) -> EmbedField {
    EmbedField {
        name: name.to_string(),
        value: value.to_string(),
        inline: true,
    }
}

fn now_rfc3339() -> Option<String> {
    OffsetDateTime::now_utc().format(&Rfc3339).ok()
}

#[derive(Serialize)]
struct DiscordMessage<'a> {
    content: &'a str,
    embeds: [&'a Embed; 1],
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DiscordTarget {
    Webhook(String),
    Bot { token: String, channel_id: String },
}

impl DiscordTarget {
    /// Webhook when configured, else bot token plus channel.
    pub fn from_config(config: &DiscordConfig) -> Option<Self> {
        let webhook = config.webhook_url.trim();
        if !webhook.is_empty() {
            return Some(DiscordTarget::Webhook(webhook.to_string()));
        }
        let token = config.token.trim();
        let channel_id = config.channel_id.trim();
        if !token.is_empty() && !channel_id.is_empty() {
            return Some(DiscordTarget::Bot {
                token: token.to_string(),
                channel_id: channel_id.to_string(),
            });
        }
        None
    }
}

pub struct DiscordNotifier {
    client: Client,
    target: DiscordTarget,
    timeout: Duration,
}

impl DiscordNotifier {
    pub fn new(client: Client, target: DiscordTarget, timeout: Duration) -> Self {
        Self {
            client,
            target,
            timeout,
        }
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), String> {
        let payload = DiscordMessage {
            content: &notification.content,
            embeds: [&notification.embed],
        };
        let request = match &self.target {
            DiscordTarget::Webhook(url) => self.client.post(url),
            DiscordTarget::Bot { token, channel_id } => self
                .client
                .post(format!("{}/channels/{}/messages", DISCORD_API, channel_id))
                .header("Authorization", format!("Bot {}", token)),
        };
        let response = request
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await
            .map_err(|err| err.to_string())?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(format!("discord http {}", response.status()))
        }
    }
}

/// Used when no sink is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), String> {
        info!(
            "{}: {}",
            notification.content,
            notification
                .embed
                .description
                .as_deref()
                .unwrap_or(&notification.embed.title)
        );
        Ok(())
    }
}
