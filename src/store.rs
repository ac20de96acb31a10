//! In-memory state container for one signed-in user: the active card, the
//! full card list (with links), and the optional creator card. Mutations
//! update memory optimistically, persist through the repository, and roll
//! back the optimistic change if the persist fails, so memory never stays
//! ahead of storage.
//!
//! The container is single-writer: callers that share one across tasks
//! must serialize access (the HTTP layer wraps each store in a mutex,
//! which also serializes racy operations like creator-card generation).

use std::sync::Arc;

use crate::adapters::{AdapterError, ChannelData, ChannelLookup};
use crate::domain::{challenge_name, expected_txt, valid_domain, DomainResolver};
use crate::models::*;
use crate::repo::{Repo, RepoError};

pub const DEFAULT_AVATAR_URL: &str =
    "https://images.unsplash.com/photo-1507003211169-0a1dd7228f2d?q=80&w=1000&auto=format&fit=crop";
pub const DEFAULT_COVER_URL: &str =
    "https://images.unsplash.com/photo-1497366216548-37526070297c?q=80&w=1000&auto=format&fit=crop";

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("unknown card")]
    UnknownCard,
    #[error("unknown link")]
    UnknownLink,
    #[error("cannot delete the last card")]
    LastCard,
    #[error("card name must not be empty")]
    EmptyName,
    #[error("no creator card")]
    NoCreatorCard,
    #[error("creator card generation already in progress")]
    LookupInFlight,
    #[error("no custom domain connected")]
    NoDomain,
    #[error("invalid domain")]
    InvalidDomain,
    #[error("channel lookup: {0}")]
    Lookup(#[from] AdapterError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A card together with its ordered links.
#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub struct CardSnapshot {
    #[serde(flatten)]
    pub card: Card,
    pub links: Vec<Link>,
}

pub struct AppStore {
    repo: Arc<dyn Repo>,
    user: User,
    cards: Vec<CardSnapshot>,
    active_id: Id,
    creator: Option<CreatorCard>,
}

fn default_new_card(user: &User, display_name: String) -> NewCard {
    NewCard {
        user_id: user.id,
        display_name,
        title: String::new(),
        bio: String::new(),
        company: String::new(),
        location: String::new(),
        email: user.email.clone(),
        phone: String::new(),
        avatar_url: DEFAULT_AVATAR_URL.to_string(),
        cover_url: DEFAULT_COVER_URL.to_string(),
        theme: Theme::default(),
    }
}

fn apply_card_update(card: &mut Card, upd: &UpdateCard) {
    if let Some(v) = &upd.display_name { card.display_name = v.clone(); }
    if let Some(v) = &upd.title { card.title = v.clone(); }
    if let Some(v) = &upd.bio { card.bio = v.clone(); }
    if let Some(v) = &upd.company { card.company = v.clone(); }
    if let Some(v) = &upd.location { card.location = v.clone(); }
    if let Some(v) = &upd.email { card.email = v.clone(); }
    if let Some(v) = &upd.phone { card.phone = v.clone(); }
    if let Some(v) = &upd.avatar_url { card.avatar_url = v.clone(); }
    if let Some(v) = &upd.cover_url { card.cover_url = v.clone(); }
    if let Some(v) = &upd.theme { card.theme = v.clone(); }
    if let Some(v) = upd.nfc_active { card.nfc_active = v; }
}

impl AppStore {
    /// Load (or bootstrap) everything for a signed-in user: upsert the user
    /// row, fetch cards and links, auto-create exactly one default card for
    /// a brand-new user, and pick up the first creator card if any.
    pub async fn load(repo: Arc<dyn Repo>, new_user: NewUser) -> StoreResult<Self> {
        let user = repo.upsert_user(new_user).await?;
        let mut cards = repo.list_cards(user.id).await?;
        if cards.is_empty() {
            let card = repo
                .create_card(default_new_card(&user, user.name.clone()))
                .await?;
            cards.push(card);
        }
        let mut snapshots = Vec::with_capacity(cards.len());
        for card in cards {
            let links = repo.list_links(card.id).await?;
            snapshots.push(CardSnapshot { card, links });
        }
        let active_id = snapshots[0].card.id;
        let creator = repo.list_creator_cards(user.id).await?.into_iter().next();
        Ok(AppStore { repo, user, cards: snapshots, active_id, creator })
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn cards(&self) -> &[CardSnapshot] {
        &self.cards
    }

    pub fn creator_card(&self) -> Option<&CreatorCard> {
        self.creator.as_ref()
    }

    pub fn active_card(&self) -> &CardSnapshot {
        // active_id always points into cards; every mutation maintains that.
        self.cards
            .iter()
            .find(|s| s.card.id == self.active_id)
            .unwrap_or(&self.cards[0])
    }

    fn active_index(&self) -> usize {
        self.cards
            .iter()
            .position(|s| s.card.id == self.active_id)
            .unwrap_or(0)
    }

    fn index_of(&self, card_id: Id) -> StoreResult<usize> {
        self.cards
            .iter()
            .position(|s| s.card.id == card_id)
            .ok_or(StoreError::UnknownCard)
    }

    /// Read-only lookup, used by handlers that need an ownership check
    /// without moving the active selection.
    pub fn card(&self, card_id: Id) -> StoreResult<&CardSnapshot> {
        let idx = self.index_of(card_id)?;
        Ok(&self.cards[idx])
    }

    /// Pure selection; no persistence side effect. Unknown ids are an
    /// error rather than a silent no-op. Idempotent for known ids.
    pub fn switch_active_card(&mut self, card_id: Id) -> StoreResult<&CardSnapshot> {
        let idx = self.index_of(card_id)?;
        self.active_id = card_id;
        Ok(&self.cards[idx])
    }

    /// Merge a partial update into the active card and persist it. On
    /// persistence failure the in-memory card reverts to its previous
    /// value and the error propagates.
    pub async fn update_card(&mut self, upd: UpdateCard) -> StoreResult<Card> {
        let idx = self.active_index();
        let before = self.cards[idx].card.clone();
        apply_card_update(&mut self.cards[idx].card, &upd);
        match self.repo.update_card(before.id, upd).await {
            Ok(saved) => {
                self.cards[idx].card = saved.clone();
                Ok(saved)
            }
            Err(e) => {
                self.cards[idx].card = before;
                Err(e.into())
            }
        }
    }

    /// Append a link to the active card. The repository assigns the id, so
    /// this persists first and only then updates memory.
    pub async fn add_link(
        &mut self,
        platform: Platform,
        url: String,
        label: Option<String>,
    ) -> StoreResult<Link> {
        let idx = self.active_index();
        let position = self.cards[idx]
            .links
            .iter()
            .map(|l| l.position)
            .max()
            .map_or(0, |p| p + 1);
        let link = self
            .repo
            .add_link(NewLink {
                card_id: self.cards[idx].card.id,
                platform,
                url,
                label,
                position,
            })
            .await?;
        self.cards[idx].links.push(link.clone());
        Ok(link)
    }

    /// Remove a link from the active card. Positions of the remaining
    /// links are not re-normalized; order is a sort key, not a dense index.
    pub async fn remove_link(&mut self, link_id: Id) -> StoreResult<()> {
        let idx = self.active_index();
        let pos = self.cards[idx]
            .links
            .iter()
            .position(|l| l.id == link_id)
            .ok_or(StoreError::UnknownLink)?;
        let removed = self.cards[idx].links.remove(pos);
        if let Err(e) = self.repo.delete_link(link_id).await {
            self.cards[idx].links.insert(pos, removed);
            return Err(e.into());
        }
        Ok(())
    }

    /// Create a fresh default card and make it active. Nothing is kept
    /// locally when the remote create fails.
    pub async fn create_card(&mut self, name: &str) -> StoreResult<Card> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::EmptyName);
        }
        let card = self
            .repo
            .create_card(default_new_card(&self.user, name.to_string()))
            .await?;
        self.active_id = card.id;
        self.cards.push(CardSnapshot { card: card.clone(), links: Vec::new() });
        Ok(card)
    }

    /// Soft-delete a card. Refused while only one card remains, whatever
    /// id was passed. If the deleted card was active, the first remaining
    /// card becomes active.
    pub async fn delete_card(&mut self, card_id: Id) -> StoreResult<()> {
        if self.cards.len() <= 1 {
            return Err(StoreError::LastCard);
        }
        let idx = self.index_of(card_id)?;
        self.repo.soft_delete_card(card_id).await?;
        self.cards.remove(idx);
        if self.active_id == card_id {
            self.active_id = self.cards[0].card.id;
        }
        Ok(())
    }

    /// Repo-side copy of a card and its links; the copy becomes active.
    pub async fn duplicate_card(&mut self, card_id: Id) -> StoreResult<Card> {
        self.index_of(card_id)?;
        let copy = self.repo.duplicate_card(card_id).await?;
        let links = self.repo.list_links(copy.id).await?;
        self.active_id = copy.id;
        self.cards.push(CardSnapshot { card: copy.clone(), links });
        Ok(copy)
    }

    /// Build a creator card from a channel lookup, with fallbacks for the
    /// optional fields: logo falls back to the active card's avatar,
    /// description to a canned welcome line, location to "Global".
    /// At most one creator card exists per user; regenerating replaces
    /// the existing one.
    pub async fn generate_creator_card(
        &mut self,
        input: &str,
        lookup: &dyn ChannelLookup,
    ) -> StoreResult<CreatorCard> {
        let data: ChannelData = lookup.lookup(input).await?;
        let fallback_logo = self.active_card().card.avatar_url.clone();
        let description = data.description.unwrap_or_else(|| {
            format!("Welcome to {}! Subscribe for amazing content.", data.channel_name)
        });
        let new = NewCreatorCard {
            user_id: self.user.id,
            channel_name: data.channel_name,
            handle: data.handle,
            channel_url: data.channel_url,
            subscribers: data.subscribers,
            videos_count: data.videos_count,
            total_views: Some(data.total_views),
            description: Some(description),
            location: Some(data.location.unwrap_or_else(|| "Global".to_string())),
            logo_url: data.logo_url.unwrap_or(fallback_logo),
            banner_url: data.banner_url,
            settings: CreatorSettings::default(),
        };
        if let Some(old) = self.creator.take() {
            if let Err(e) = self.repo.delete_creator_card(old.id).await {
                self.creator = Some(old);
                return Err(e.into());
            }
        }
        let saved = self.repo.create_creator_card(new).await?;
        self.creator = Some(saved.clone());
        Ok(saved)
    }

    /// Same optimistic-merge-and-rollback pattern as `update_card`.
    pub async fn update_creator_settings(
        &mut self,
        upd: UpdateCreatorCard,
    ) -> StoreResult<CreatorCard> {
        let current = self.creator.as_mut().ok_or(StoreError::NoCreatorCard)?;
        let before = current.clone();
        if let Some(v) = &upd.description { current.description = Some(v.clone()); }
        if let Some(v) = upd.nfc_active { current.nfc_active = v; }
        if let Some(v) = &upd.settings { current.settings = v.clone(); }
        match self.repo.update_creator_card(before.id, upd).await {
            Ok(saved) => {
                self.creator = Some(saved.clone());
                Ok(saved)
            }
            Err(e) => {
                self.creator = Some(before);
                Err(e.into())
            }
        }
    }

    pub async fn remove_creator_card(&mut self) -> StoreResult<()> {
        let id = self.creator.as_ref().ok_or(StoreError::NoCreatorCard)?.id;
        self.repo.delete_creator_card(id).await?;
        self.creator = None;
        Ok(())
    }

    /// Attach a custom domain to the active card with `pending` status.
    /// A domain already attached to a different card is a conflict and
    /// leaves local state untouched.
    pub async fn connect_domain(&mut self, domain: &str) -> StoreResult<Card> {
        let domain = domain.trim().to_ascii_lowercase();
        if !valid_domain(&domain) {
            return Err(StoreError::InvalidDomain);
        }
        let idx = self.active_index();
        let card = self.repo.set_domain(self.cards[idx].card.id, &domain).await?;
        self.cards[idx].card = card.clone();
        Ok(card)
    }

    /// Check the domain's TXT challenge record and move the status to
    /// `active` or `error`. `active` is terminal; re-verify is allowed
    /// from `pending` and `error`.
    pub async fn verify_domain(&mut self, resolver: &dyn DomainResolver) -> StoreResult<Card> {
        let idx = self.active_index();
        let card = &self.cards[idx].card;
        let domain = card.custom_domain.clone().ok_or(StoreError::NoDomain)?;
        if card.custom_domain_status == DomainStatus::Active {
            return Ok(card.clone());
        }
        let card_id = card.id;
        let verified = match resolver.txt_records(&challenge_name(&domain)).await {
            Ok(records) => records.iter().any(|r| *r == expected_txt(card_id)),
            Err(e) => {
                tracing::warn!(domain = %domain, "txt lookup failed: {e}");
                false
            }
        };
        let status = if verified { DomainStatus::Active } else { DomainStatus::Error };
        let saved = self.repo.set_domain_status(card_id, status).await?;
        self.cards[idx].card = saved.clone();
        Ok(saved)
    }

    pub async fn remove_domain(&mut self) -> StoreResult<Card> {
        let idx = self.active_index();
        let card = self.repo.clear_domain(self.cards[idx].card.id).await?;
        self.cards[idx].card = card.clone();
        Ok(card)
    }
}
