//! Signup webhook support: HMAC-SHA256 signature verification over the raw
//! request body, and the pluggable welcome-mail providers the handler
//! dispatches to. Mail failures never fail the webhook response.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::sync::Arc;

type HmacSha256 = Hmac<Sha256>;

/// Constant-time check of a hex-encoded HMAC-SHA256 signature.
pub fn verify_signature(secret: &[u8], body: &[u8], signature_hex: &str) -> bool {
    let Ok(sig) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&sig).is_ok()
}

pub fn sign(secret: &[u8], body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("hmac accepts any key length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

#[derive(Debug, Deserialize)]
pub struct SignupEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub record: Option<SignupRecord>,
}

#[derive(Debug, Deserialize)]
pub struct SignupRecord {
    pub email: Option<String>,
    #[serde(default)]
    pub raw_user_meta_data: serde_json::Value,
    #[serde(default)]
    pub raw_app_meta_data: serde_json::Value,
}

impl SignupRecord {
    /// Display name fallback chain: metadata name, then full_name, then the
    /// local part of the email, then "User".
    pub fn display_name(&self) -> String {
        for key in ["name", "full_name"] {
            if let Some(name) = self.raw_user_meta_data.get(key).and_then(|v| v.as_str()) {
                if !name.is_empty() {
                    return name.to_string();
                }
            }
        }
        self.email
            .as_deref()
            .and_then(|e| e.split('@').next())
            .filter(|s| !s.is_empty())
            .unwrap_or("User")
            .to_string()
    }

    pub fn provider(&self) -> String {
        self.raw_app_meta_data
            .get("provider")
            .and_then(|v| v.as_str())
            .unwrap_or("email")
            .to_string()
    }
}

#[derive(thiserror::Error, Debug)]
pub enum MailError {
    #[error("send failed: {0}")]
    Send(String),
    #[error("provider rejected: status {0}")]
    Rejected(u16),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_welcome(&self, to: &str, name: &str, provider: &str) -> Result<(), MailError>;
}

pub fn welcome_email_html(name: &str, auth_provider: &str) -> String {
    format!(
        "<!DOCTYPE html>\
         <html><body>\
         <h1>Welcome to Tapdeck!</h1>\
         <p>Hi {name},</p>\
         <p>Welcome aboard! Your account has been successfully created (signed up via {auth_provider}).</p>\
         <p>You can now create your digital business cards and share them with the world:</p>\
         <ul>\
         <li>Create your first business card</li>\
         <li>Customize your profile</li>\
         <li>Share your unique link</li>\
         <li>Track analytics</li>\
         </ul>\
         <p>Best regards,<br>The Tapdeck Team</p>\
         </body></html>"
    )
}

const WELCOME_SUBJECT: &str = "Welcome to Tapdeck!";

// ---------------- Resend ----------------

pub struct ResendMailer {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    from: String,
}

impl ResendMailer {
    pub fn new(api_key: String, from: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: "https://api.resend.com".to_string(),
            from,
        }
    }

    pub fn with_base(api_key: &str, from: &str, base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            from: from.to_string(),
        }
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    async fn send_welcome(&self, to: &str, name: &str, provider: &str) -> Result<(), MailError> {
        let body = serde_json::json!({
            "from": self.from,
            "to": to,
            "subject": WELCOME_SUBJECT,
            "html": welcome_email_html(name, provider),
        });
        let resp = self
            .client
            .post(format!("{}/emails", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| MailError::Send(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(MailError::Rejected(resp.status().as_u16()));
        }
        Ok(())
    }
}

// ---------------- SendGrid ----------------

pub struct SendGridMailer {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    from: String,
}

impl SendGridMailer {
    pub fn new(api_key: String, from: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: "https://api.sendgrid.com".to_string(),
            from,
        }
    }
}

#[async_trait]
impl Mailer for SendGridMailer {
    async fn send_welcome(&self, to: &str, name: &str, provider: &str) -> Result<(), MailError> {
        let body = serde_json::json!({
            "personalizations": [{ "to": [{ "email": to }] }],
            "from": { "email": self.from },
            "subject": WELCOME_SUBJECT,
            "content": [{ "type": "text/html", "value": welcome_email_html(name, provider) }],
        });
        let resp = self
            .client
            .post(format!("{}/v3/mail/send", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| MailError::Send(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(MailError::Rejected(resp.status().as_u16()));
        }
        Ok(())
    }
}

/// First configured provider wins: Resend, then SendGrid, else none.
pub fn build_mailer() -> Option<Arc<dyn Mailer>> {
    let from = std::env::var("MAIL_FROM")
        .unwrap_or_else(|_| "Tapdeck <onboarding@tapdeck.example>".to_string());
    if let Ok(key) = std::env::var("RESEND_API_KEY") {
        return Some(Arc::new(ResendMailer::new(key, from)));
    }
    if let Ok(key) = std::env::var("SENDGRID_API_KEY") {
        return Some(Arc::new(SendGridMailer::new(key, from)));
    }
    None
}
