//! Custom-domain verification. Ownership is proven by a DNS TXT record
//! (`_tapdeck.<domain>` containing `tapdeck-verify=<card id>`), looked up
//! through a DNS-over-HTTPS resolver.

use async_trait::async_trait;
use serde::Deserialize;

use crate::models::Id;

#[derive(thiserror::Error, Debug)]
pub enum ResolveError {
    #[error("dns query failed: {0}")]
    Query(String),
}

#[async_trait]
pub trait DomainResolver: Send + Sync {
    /// TXT record values for `name`, with surrounding quotes stripped.
    async fn txt_records(&self, name: &str) -> Result<Vec<String>, ResolveError>;
}

/// Record name the owner must create under their domain.
pub fn challenge_name(domain: &str) -> String {
    format!("_tapdeck.{domain}")
}

/// Expected TXT value for a card.
pub fn expected_txt(card_id: Id) -> String {
    format!("tapdeck-verify={card_id}")
}

/// Syntactic domain check: dot-separated alphanumeric labels (hyphens
/// allowed inside a label), at least one dot, alphabetic TLD of length ≥2.
pub fn valid_domain(domain: &str) -> bool {
    if domain.len() > 253 || !domain.contains('.') {
        return false;
    }
    let labels: Vec<&str> = domain.split('.').collect();
    let tld = labels[labels.len() - 1];
    if tld.len() < 2 || !tld.chars().all(|c| c.is_ascii_alphabetic()) {
        return false;
    }
    labels.iter().all(|label| {
        !label.is_empty()
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}

/// DNS-over-HTTPS resolver (Cloudflare/Google JSON wire format).
pub struct DohResolver {
    client: reqwest::Client,
    endpoint: String,
}

impl DohResolver {
    pub fn from_env() -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: std::env::var("DOH_ENDPOINT")
                .unwrap_or_else(|_| "https://cloudflare-dns.com/dns-query".to_string()),
        }
    }

    pub fn with_endpoint(endpoint: &str) -> Self {
        Self { client: reqwest::Client::new(), endpoint: endpoint.to_string() }
    }
}

#[derive(Deserialize)]
struct DohResponse {
    #[serde(rename = "Answer", default)]
    answer: Vec<DohAnswer>,
}

#[derive(Deserialize)]
struct DohAnswer {
    data: String,
}

#[async_trait]
impl DomainResolver for DohResolver {
    async fn txt_records(&self, name: &str) -> Result<Vec<String>, ResolveError> {
        let url = format!("{}?name={}&type=TXT", self.endpoint, urlencoding::encode(name));
        let resp: DohResponse = self
            .client
            .get(&url)
            .header("accept", "application/dns-json")
            .send()
            .await
            .map_err(|e| ResolveError::Query(e.to_string()))?
            .json()
            .await
            .map_err(|e| ResolveError::Query(e.to_string()))?;
        Ok(resp
            .answer
            .into_iter()
            .map(|a| a.data.trim_matches('"').to_string())
            .collect())
    }
}
