//! External data adapters: video-channel lookup and bio generation.
//! Both are reqwest clients behind traits so the store and routes can be
//! tested against wiremock servers.

use async_trait::async_trait;
use serde::Deserialize;
use utoipa::ToSchema;

#[derive(thiserror::Error, Debug)]
pub enum AdapterError {
    #[error("lookup failed: {0}")]
    LookupFailed(String),
    #[error("adapter not configured")]
    NotConfigured,
}

/// Normalized channel shape consumed by the store. Name/handle/counts are
/// always filled; the optional fields get caller-side fallbacks.
#[derive(Debug, Clone)]
pub struct ChannelData {
    pub channel_name: String,
    pub handle: String,
    pub channel_url: String,
    pub subscribers: String,
    pub videos_count: String,
    pub total_views: String,
    pub description: Option<String>,
    pub logo_url: Option<String>,
    pub banner_url: Option<String>,
    pub location: Option<String>,
}

#[async_trait]
pub trait ChannelLookup: Send + Sync {
    async fn lookup(&self, input: &str) -> Result<ChannelData, AdapterError>;
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct BioRequest {
    pub name: String,
    pub role: String,
    #[serde(default)]
    pub keywords: String,
    #[serde(default)]
    pub tone: Option<String>,
}

#[async_trait]
pub trait BioGenerator: Send + Sync {
    async fn generate(&self, req: &BioRequest) -> Result<String, AdapterError>;
}

/// Fallback sentence used whenever bio generation fails or is unconfigured.
pub const FALLBACK_BIO: &str =
    "Creative professional passionate about building great experiences.";

// ---------------- YouTube Data API v3 lookup ----------------

pub struct YouTubeLookup {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

impl YouTubeLookup {
    pub fn from_env() -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: std::env::var("YOUTUBE_API_KEY").ok(),
            base_url: std::env::var("YOUTUBE_API_BASE")
                .unwrap_or_else(|_| "https://www.googleapis.com/youtube/v3".to_string()),
        }
    }

    /// Test constructor pointing at a mock server.
    pub fn with_base(api_key: &str, base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: Some(api_key.to_string()),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Pull a channel id (or a handle to search for) out of the accepted
    /// input shapes: `@handle`, `…/channel/UC…`, a bare `UC…` id, or the
    /// legacy `/c/name` and `/user/name` URLs.
    fn parse_input(input: &str) -> ChannelRef {
        if let Some(rest) = input.split('@').nth(1) {
            let handle: String = rest.split(['?', '/']).next().unwrap_or("").to_string();
            if !handle.is_empty() {
                return ChannelRef::Handle(handle);
            }
        }
        if let Some(rest) = input.split("/channel/").nth(1) {
            let id: String = rest.split(['?', '/']).next().unwrap_or("").to_string();
            if !id.is_empty() {
                return ChannelRef::Id(id);
            }
        }
        if input.starts_with("UC") && input.len() == 24 && input.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            return ChannelRef::Id(input.to_string());
        }
        for marker in ["/c/", "/user/"] {
            if let Some(rest) = input.split(marker).nth(1) {
                let name: String = rest.split(['?', '/']).next().unwrap_or("").to_string();
                if !name.is_empty() {
                    return ChannelRef::Handle(name);
                }
            }
        }
        ChannelRef::Unknown
    }

    async fn resolve_channel_id(&self, key: &str, handle: &str) -> Result<String, AdapterError> {
        let url = format!(
            "{}/search?part=snippet&type=channel&q={}&key={}",
            self.base_url,
            urlencoding::encode(&format!("@{handle}")),
            key
        );
        let resp: SearchResponse = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AdapterError::LookupFailed(e.to_string()))?
            .json()
            .await
            .map_err(|e| AdapterError::LookupFailed(e.to_string()))?;
        resp.items
            .into_iter()
            .next()
            .map(|i| i.snippet.channel_id)
            .ok_or_else(|| AdapterError::LookupFailed(format!("no channel for handle @{handle}")))
    }
}

enum ChannelRef {
    Id(String),
    Handle(String),
    Unknown,
}

fn format_count(raw: &str) -> String {
    let n: u64 = raw.parse().unwrap_or(0);
    if n >= 1_000_000 {
        format!("{:.1}M", n as f64 / 1_000_000.0)
    } else if n >= 1_000 {
        format!("{:.1}K", n as f64 / 1_000.0)
    } else {
        n.to_string()
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Deserialize)]
struct SearchItem {
    snippet: SearchSnippet,
}

#[derive(Deserialize)]
struct SearchSnippet {
    #[serde(rename = "channelId")]
    channel_id: String,
}

#[derive(Deserialize)]
struct ChannelsResponse {
    #[serde(default)]
    items: Vec<ChannelItem>,
}

#[derive(Deserialize)]
struct ChannelItem {
    snippet: ChannelSnippet,
    #[serde(default)]
    statistics: ChannelStatistics,
    #[serde(rename = "brandingSettings", default)]
    branding: BrandingSettings,
}

#[derive(Deserialize)]
struct ChannelSnippet {
    title: String,
    #[serde(default)]
    description: String,
    #[serde(rename = "customUrl")]
    custom_url: Option<String>,
    #[serde(default)]
    thumbnails: Thumbnails,
    country: Option<String>,
}

#[derive(Deserialize, Default)]
struct Thumbnails {
    high: Option<Thumbnail>,
    medium: Option<Thumbnail>,
    default: Option<Thumbnail>,
}

#[derive(Deserialize)]
struct Thumbnail {
    url: String,
}

#[derive(Deserialize, Default)]
struct ChannelStatistics {
    #[serde(rename = "subscriberCount")]
    subscriber_count: Option<String>,
    #[serde(rename = "videoCount")]
    video_count: Option<String>,
    #[serde(rename = "viewCount")]
    view_count: Option<String>,
}

#[derive(Deserialize, Default)]
struct BrandingSettings {
    image: Option<BrandingImage>,
}

#[derive(Deserialize)]
struct BrandingImage {
    #[serde(rename = "bannerExternalUrl")]
    banner_external_url: Option<String>,
}

#[async_trait]
impl ChannelLookup for YouTubeLookup {
    async fn lookup(&self, input: &str) -> Result<ChannelData, AdapterError> {
        let key = self.api_key.as_deref().ok_or(AdapterError::NotConfigured)?;

        let (channel_id, known_handle) = match Self::parse_input(input) {
            ChannelRef::Id(id) => (id, None),
            ChannelRef::Handle(h) => {
                let id = self.resolve_channel_id(key, &h).await?;
                (id, Some(h))
            }
            ChannelRef::Unknown => {
                return Err(AdapterError::LookupFailed(
                    "could not extract a channel id or handle from the input".into(),
                ))
            }
        };

        let url = format!(
            "{}/channels?part=snippet,statistics,brandingSettings&id={}&key={}",
            self.base_url, channel_id, key
        );
        let resp: ChannelsResponse = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AdapterError::LookupFailed(e.to_string()))?
            .json()
            .await
            .map_err(|e| AdapterError::LookupFailed(e.to_string()))?;
        let item = resp
            .items
            .into_iter()
            .next()
            .ok_or_else(|| AdapterError::LookupFailed("channel not found".into()))?;

        let handle = match known_handle {
            Some(h) => format!("@{h}"),
            None => match item.snippet.custom_url {
                Some(u) if u.starts_with('@') => u,
                Some(u) => format!("@{u}"),
                None => format!("@{}", item.snippet.title.replace(' ', "")),
            },
        };
        let logo_url = item
            .snippet
            .thumbnails
            .high
            .or(item.snippet.thumbnails.medium)
            .or(item.snippet.thumbnails.default)
            .map(|t| t.url);
        let description = if item.snippet.description.is_empty() {
            None
        } else {
            Some(item.snippet.description)
        };

        Ok(ChannelData {
            channel_name: item.snippet.title,
            handle,
            channel_url: format!("https://youtube.com/channel/{channel_id}"),
            subscribers: format_count(item.statistics.subscriber_count.as_deref().unwrap_or("0")),
            videos_count: item.statistics.video_count.unwrap_or_else(|| "0".into()),
            total_views: format_count(item.statistics.view_count.as_deref().unwrap_or("0")),
            description,
            logo_url,
            banner_url: item.branding.image.and_then(|i| i.banner_external_url),
            location: item.snippet.country,
        })
    }
}

// ---------------- Generative-text bio adapter ----------------

pub struct GenTextBio {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
}

impl GenTextBio {
    pub fn from_env() -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: std::env::var("GENAI_API_KEY").ok(),
            base_url: std::env::var("GENAI_API_BASE")
                .unwrap_or_else(|_| "https://generativelanguage.googleapis.com".to_string()),
            model: std::env::var("GENAI_MODEL").unwrap_or_else(|_| "gemini-2.5-flash".to_string()),
        }
    }

    pub fn with_base(api_key: &str, base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: Some(api_key.to_string()),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: "gemini-2.5-flash".to_string(),
        }
    }
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

#[async_trait]
impl BioGenerator for GenTextBio {
    async fn generate(&self, req: &BioRequest) -> Result<String, AdapterError> {
        let key = self.api_key.as_deref().ok_or(AdapterError::NotConfigured)?;
        let tone = req.tone.as_deref().unwrap_or("professional");
        let keywords = if req.keywords.is_empty() { "general professional skills" } else { &req.keywords };
        let prompt = format!(
            "Write a short, {tone} bio for a digital business card.\nName: {}\nRole: {}\nKeywords/Topics/Skills: {keywords}\n\nKeep it under 160 characters if possible. No hashtags. Write in first person.",
            req.name, req.role
        );
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, self.model, key
        );
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });
        let resp: GenerateResponse = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AdapterError::LookupFailed(e.to_string()))?
            .json()
            .await
            .map_err(|e| AdapterError::LookupFailed(e.to_string()))?;
        let text = resp
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AdapterError::LookupFailed("empty generation response".into()))?;
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_handle_inputs() {
        match YouTubeLookup::parse_input("https://youtube.com/@somecreator?tab=videos") {
            ChannelRef::Handle(h) => assert_eq!(h, "somecreator"),
            _ => panic!("expected handle"),
        }
    }

    #[test]
    fn parses_channel_id_url() {
        match YouTubeLookup::parse_input("https://youtube.com/channel/UCabcdefghijklmnopqrstuv/featured") {
            ChannelRef::Id(id) => assert_eq!(id, "UCabcdefghijklmnopqrstuv"),
            _ => panic!("expected id"),
        }
    }

    #[test]
    fn parses_bare_channel_id() {
        match YouTubeLookup::parse_input("UCabcdefghijklmnopqrstuv") {
            ChannelRef::Id(id) => assert_eq!(id, "UCabcdefghijklmnopqrstuv"),
            _ => panic!("expected id"),
        }
    }

    #[test]
    fn rejects_unparseable_input() {
        assert!(matches!(YouTubeLookup::parse_input("not a channel"), ChannelRef::Unknown));
    }

    #[test]
    fn count_formatting() {
        assert_eq!(format_count("999"), "999");
        assert_eq!(format_count("1500"), "1.5K");
        assert_eq!(format_count("2300000"), "2.3M");
        assert_eq!(format_count("garbage"), "0");
    }
}
