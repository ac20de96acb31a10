use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub type Id = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Free,
    Pro,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: Id,
    pub email: String,
    pub name: String,
    pub avatar_url: Option<String>,
    pub plan: Plan,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub avatar_url: Option<String>,
}

/// Closed set of link platforms. Unknown strings are rejected at the
/// serde boundary instead of being defaulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Instagram,
    Twitter,
    Facebook,
    Linkedin,
    Github,
    Youtube,
    Whatsapp,
    Email,
    Website,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Instagram => "instagram",
            Platform::Twitter => "twitter",
            Platform::Facebook => "facebook",
            Platform::Linkedin => "linkedin",
            Platform::Github => "github",
            Platform::Youtube => "youtube",
            Platform::Whatsapp => "whatsapp",
            Platform::Email => "email",
            Platform::Website => "website",
        }
    }

    /// Display label for the public card view.
    pub fn label(&self) -> &'static str {
        match self {
            Platform::Instagram => "Instagram",
            Platform::Twitter => "Twitter",
            Platform::Facebook => "Facebook",
            Platform::Linkedin => "LinkedIn",
            Platform::Github => "GitHub",
            Platform::Youtube => "YouTube",
            Platform::Whatsapp => "WhatsApp",
            Platform::Email => "Email",
            Platform::Website => "Website",
        }
    }
}

impl std::str::FromStr for Platform {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "instagram" => Ok(Platform::Instagram),
            "twitter" => Ok(Platform::Twitter),
            "facebook" => Ok(Platform::Facebook),
            "linkedin" => Ok(Platform::Linkedin),
            "github" => Ok(Platform::Github),
            "youtube" => Ok(Platform::Youtube),
            "whatsapp" => Ok(Platform::Whatsapp),
            "email" => Ok(Platform::Email),
            "website" => Ok(Platform::Website),
            other => Err(format!("unknown platform: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    Classic,
    Modern,
    Minimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Theme {
    pub primary_color: String,
    pub background_color: String,
    pub font_family: String,
    pub layout: Layout,
}

impl Default for Theme {
    fn default() -> Self {
        Theme {
            primary_color: "#000000".into(),
            background_color: "#FFFFFF".into(),
            font_family: "Inter".into(),
            layout: Layout::Modern,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DomainStatus {
    None,
    Pending,
    Active,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Card {
    pub id: Id,
    pub user_id: Id,
    pub display_name: String,
    pub title: String,
    pub bio: String,
    pub company: String,
    pub location: String,
    pub email: String,
    pub phone: String,
    pub avatar_url: String,
    pub cover_url: String,
    pub theme: Theme,
    pub custom_domain: Option<String>,
    pub custom_domain_status: DomainStatus,
    pub nfc_active: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewCard {
    pub user_id: Id,
    pub display_name: String,
    pub title: String,
    pub bio: String,
    pub company: String,
    pub location: String,
    pub email: String,
    pub phone: String,
    pub avatar_url: String,
    pub cover_url: String,
    pub theme: Theme,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateCard {
    pub display_name: Option<String>,
    pub title: Option<String>,
    pub bio: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub avatar_url: Option<String>,
    pub cover_url: Option<String>,
    pub theme: Option<Theme>,
    pub nfc_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Link {
    pub id: Id,
    pub card_id: Id,
    pub platform: Platform,
    pub url: String,
    pub label: Option<String>,
    pub position: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewLink {
    pub card_id: Id,
    pub platform: Platform,
    pub url: String,
    pub label: Option<String>,
    pub position: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CreatorTheme {
    Red,
    Dark,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CreatorSettings {
    pub theme: CreatorTheme,
    pub show_subscribers: bool,
    pub show_videos: bool,
}

impl Default for CreatorSettings {
    fn default() -> Self {
        CreatorSettings { theme: CreatorTheme::Dark, show_subscribers: true, show_videos: true }
    }
}

/// Secondary card summarizing a video channel's public stats. The count
/// fields are display strings ("1.2M"), not guaranteed numeric.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreatorCard {
    pub id: Id,
    pub user_id: Id,
    pub channel_name: String,
    pub handle: String,
    pub channel_url: String,
    pub subscribers: String,
    pub videos_count: String,
    pub total_views: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub logo_url: String,
    pub banner_url: Option<String>,
    pub nfc_active: bool,
    pub settings: CreatorSettings,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewCreatorCard {
    pub user_id: Id,
    pub channel_name: String,
    pub handle: String,
    pub channel_url: String,
    pub subscribers: String,
    pub videos_count: String,
    pub total_views: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub logo_url: String,
    pub banner_url: Option<String>,
    pub settings: CreatorSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateCreatorCard {
    pub description: Option<String>,
    pub nfc_active: Option<bool>,
    pub settings: Option<CreatorSettings>,
}

/// Append-only profile view record. `ip_hash` is a one-way hash of the
/// visitor IP; the raw address is never stored.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ViewEvent {
    pub card_id: Id,
    pub ip_hash: Option<String>,
    pub user_agent: Option<String>,
    pub referer: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub viewed_at: DateTime<Utc>,
}

/// Append-only link click record.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ClickEvent {
    pub card_id: Id,
    pub link_id: Option<Id>,
    pub platform: Platform,
    pub ip_hash: Option<String>,
    pub link_url: Option<String>,
    pub clicked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ContactSubmission {
    pub id: Id,
    pub card_id: Id,
    pub sender_name: String,
    pub sender_email: String,
    pub sender_phone: Option<String>,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewContact {
    pub card_id: Id,
    pub sender_name: String,
    pub sender_email: String,
    pub sender_phone: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Template {
    pub id: Id,
    pub name: String,
    pub category: String,
    pub theme: Theme,
    pub is_active: bool,
    pub usage_count: i64,
}
