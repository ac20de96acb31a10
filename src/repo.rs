use chrono::{DateTime, Utc};

use crate::models::*;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")]
    NotFound,
    /// Constraint violation: duplicate custom domain, last-card delete, …
    #[error("conflict")]
    Conflict,
    #[error("transport: {0}")]
    Transport(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

use async_trait::async_trait;

#[async_trait]
pub trait UserRepo: Send + Sync {
    /// Create-or-update keyed by email; called on first authentication.
    async fn upsert_user(&self, new: NewUser) -> RepoResult<User>;
    async fn get_user(&self, id: Id) -> RepoResult<User>;
    async fn list_users(&self) -> RepoResult<Vec<User>>;
}

#[async_trait]
pub trait CardRepo: Send + Sync {
    /// Active cards only, newest first.
    async fn list_cards(&self, user_id: Id) -> RepoResult<Vec<Card>>;
    async fn get_card(&self, id: Id) -> RepoResult<Card>;
    async fn create_card(&self, new: NewCard) -> RepoResult<Card>;
    async fn update_card(&self, id: Id, upd: UpdateCard) -> RepoResult<Card>;
    /// Soft delete; refuses with `Conflict` when it would remove the
    /// owner's last active card.
    async fn soft_delete_card(&self, id: Id) -> RepoResult<()>;
    /// Copy a card and its links; the copy gets a "(Copy)" name suffix
    /// and no custom domain.
    async fn duplicate_card(&self, id: Id) -> RepoResult<Card>;
    /// Attach a domain with `pending` status. `Conflict` when the domain
    /// is already attached to a different card.
    async fn set_domain(&self, card_id: Id, domain: &str) -> RepoResult<Card>;
    async fn set_domain_status(&self, card_id: Id, status: DomainStatus) -> RepoResult<Card>;
    async fn clear_domain(&self, card_id: Id) -> RepoResult<Card>;
}

#[async_trait]
pub trait LinkRepo: Send + Sync {
    /// Ordered by `position` ascending.
    async fn list_links(&self, card_id: Id) -> RepoResult<Vec<Link>>;
    async fn add_link(&self, new: NewLink) -> RepoResult<Link>;
    async fn delete_link(&self, id: Id) -> RepoResult<()>;
}

#[async_trait]
pub trait CreatorCardRepo: Send + Sync {
    async fn list_creator_cards(&self, user_id: Id) -> RepoResult<Vec<CreatorCard>>;
    async fn get_creator_card(&self, id: Id) -> RepoResult<CreatorCard>;
    async fn create_creator_card(&self, new: NewCreatorCard) -> RepoResult<CreatorCard>;
    async fn update_creator_card(&self, id: Id, upd: UpdateCreatorCard) -> RepoResult<CreatorCard>;
    async fn delete_creator_card(&self, id: Id) -> RepoResult<()>;
}

#[async_trait]
pub trait EventRepo: Send + Sync {
    async fn record_view(&self, event: ViewEvent) -> RepoResult<()>;
    async fn record_click(&self, event: ClickEvent) -> RepoResult<()>;
    async fn views_between(
        &self,
        card_id: Id,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> RepoResult<Vec<ViewEvent>>;
    async fn clicks_between(
        &self,
        card_id: Id,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> RepoResult<Vec<ClickEvent>>;
    async fn total_views(&self, card_id: Id) -> RepoResult<u64>;
    async fn total_clicks(&self, card_id: Id) -> RepoResult<u64>;
}

#[async_trait]
pub trait ContactRepo: Send + Sync {
    async fn create_submission(&self, new: NewContact) -> RepoResult<ContactSubmission>;
    /// Newest first; owner-readable only (enforced by the caller).
    async fn list_submissions(&self, card_id: Id) -> RepoResult<Vec<ContactSubmission>>;
}

#[async_trait]
pub trait TemplateRepo: Send + Sync {
    /// Active templates, most used first.
    async fn list_templates(&self) -> RepoResult<Vec<Template>>;
}

pub trait Repo:
    UserRepo + CardRepo + LinkRepo + CreatorCardRepo + EventRepo + ContactRepo + TemplateRepo
{
}

impl<T> Repo for T where
    T: UserRepo + CardRepo + LinkRepo + CreatorCardRepo + EventRepo + ContactRepo + TemplateRepo
{
}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, RwLock};

    const SNAPSHOT_PATH: &str = "data/state.json";

    #[derive(Default, Serialize, Deserialize)]
    struct State {
        users: HashMap<Id, User>,
        cards: HashMap<Id, Card>,
        links: HashMap<Id, Link>,
        creator_cards: HashMap<Id, CreatorCard>,
        views: Vec<ViewEvent>,
        clicks: Vec<ClickEvent>,
        contacts: HashMap<Id, ContactSubmission>,
        templates: Vec<Template>,
        next_id: Id,
    }

    impl State {
        // Starting state for a fresh deployment: empty tables plus the
        // built-in template gallery.
        fn seeded() -> Self {
            let mut s = State::default();
            let mk = |id: Id, name: &str, category: &str, primary: &str, bg: &str, layout: Layout, usage: i64| Template {
                id,
                name: name.into(),
                category: category.into(),
                theme: Theme {
                    primary_color: primary.into(),
                    background_color: bg.into(),
                    font_family: "Inter".into(),
                    layout,
                },
                is_active: true,
                usage_count: usage,
            };
            s.templates = vec![
                mk(1, "Monochrome", "business", "#000000", "#FFFFFF", Layout::Modern, 412),
                mk(2, "Slate", "business", "#1E293B", "#F8FAFC", Layout::Classic, 377),
                mk(3, "Signal", "creative", "#DC2626", "#FFFFFF", Layout::Minimal, 205),
            ];
            s.next_id = 1000;
            s
        }
    }

    #[derive(Clone)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
        snapshot_path: Arc<PathBuf>,
    }

    impl InMemRepo {
        fn data_dir() -> PathBuf {
            std::env::var("TAPDECK_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data"))
        }

        fn snapshot_path() -> PathBuf {
            if std::env::var("TAPDECK_DATA_DIR").is_ok() {
                let mut p = Self::data_dir();
                p.push("state.json");
                p
            } else {
                PathBuf::from(SNAPSHOT_PATH)
            }
        }

        fn load_state_from(path: &Path) -> State {
            match std::fs::read(path) {
                Ok(bytes) => match serde_json::from_slice::<State>(&bytes) {
                    Ok(s) => {
                        tracing::info!("loaded snapshot '{}'", path.display());
                        s
                    }
                    Err(e) => {
                        tracing::warn!("failed to parse snapshot '{}': {e}; starting empty", path.display());
                        State::seeded()
                    }
                },
                Err(_) => State::seeded(),
            }
        }

        fn persist(&self) {
            let path = self.snapshot_path.clone();
            if let Ok(s) = serde_json::to_vec_pretty(&*self.state.read().unwrap()) {
                if let Some(dir) = path.parent() {
                    let _ = std::fs::create_dir_all(dir);
                }
                if let Err(e) = std::fs::write(&*path, s) {
                    tracing::warn!("failed to write snapshot '{}': {e}", path.display());
                }
            }
        }

        pub fn new() -> Self {
            let snapshot_path = Self::snapshot_path();
            let state = Self::load_state_from(&snapshot_path);
            Self {
                state: Arc::new(RwLock::new(state)),
                snapshot_path: Arc::new(snapshot_path),
            }
        }

        fn next_id(state: &mut State) -> Id {
            state.next_id += 1;
            state.next_id
        }
    }

    impl Default for InMemRepo {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl UserRepo for InMemRepo {
        async fn upsert_user(&self, new: NewUser) -> RepoResult<User> {
            let mut s = self.state.write().unwrap();
            if let Some(existing) = s.users.values_mut().find(|u| u.email == new.email) {
                existing.name = new.name;
                if new.avatar_url.is_some() {
                    existing.avatar_url = new.avatar_url;
                }
                let user = existing.clone();
                drop(s);
                self.persist();
                return Ok(user);
            }
            let id = Self::next_id(&mut s);
            let user = User {
                id,
                email: new.email,
                name: new.name,
                avatar_url: new.avatar_url,
                plan: Plan::Pro,
                created_at: Utc::now(),
            };
            s.users.insert(id, user.clone());
            drop(s);
            self.persist();
            Ok(user)
        }

        async fn get_user(&self, id: Id) -> RepoResult<User> {
            let s = self.state.read().unwrap();
            s.users.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn list_users(&self) -> RepoResult<Vec<User>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s.users.values().cloned().collect();
            v.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            Ok(v)
        }
    }

    #[async_trait]
    impl CardRepo for InMemRepo {
        async fn list_cards(&self, user_id: Id) -> RepoResult<Vec<Card>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s
                .cards
                .values()
                .filter(|c| c.user_id == user_id && c.is_active)
                .cloned()
                .collect();
            v.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(v)
        }

        async fn get_card(&self, id: Id) -> RepoResult<Card> {
            let s = self.state.read().unwrap();
            s.cards.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn create_card(&self, new: NewCard) -> RepoResult<Card> {
            let mut s = self.state.write().unwrap();
            if !s.users.contains_key(&new.user_id) {
                return Err(RepoError::NotFound);
            }
            let id = Self::next_id(&mut s);
            let card = Card {
                id,
                user_id: new.user_id,
                display_name: new.display_name,
                title: new.title,
                bio: new.bio,
                company: new.company,
                location: new.location,
                email: new.email,
                phone: new.phone,
                avatar_url: new.avatar_url,
                cover_url: new.cover_url,
                theme: new.theme,
                custom_domain: None,
                custom_domain_status: DomainStatus::None,
                nfc_active: false,
                is_active: true,
                created_at: Utc::now(),
            };
            s.cards.insert(id, card.clone());
            drop(s);
            self.persist();
            Ok(card)
        }

        async fn update_card(&self, id: Id, upd: UpdateCard) -> RepoResult<Card> {
            let mut s = self.state.write().unwrap();
            let card = s.cards.get_mut(&id).ok_or(RepoError::NotFound)?;
            if let Some(v) = upd.display_name { card.display_name = v; }
            if let Some(v) = upd.title { card.title = v; }
            if let Some(v) = upd.bio { card.bio = v; }
            if let Some(v) = upd.company { card.company = v; }
            if let Some(v) = upd.location { card.location = v; }
            if let Some(v) = upd.email { card.email = v; }
            if let Some(v) = upd.phone { card.phone = v; }
            if let Some(v) = upd.avatar_url { card.avatar_url = v; }
            if let Some(v) = upd.cover_url { card.cover_url = v; }
            if let Some(v) = upd.theme { card.theme = v; }
            if let Some(v) = upd.nfc_active { card.nfc_active = v; }
            let updated = card.clone();
            drop(s);
            self.persist();
            Ok(updated)
        }

        async fn soft_delete_card(&self, id: Id) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            let user_id = s.cards.get(&id).filter(|c| c.is_active).map(|c| c.user_id).ok_or(RepoError::NotFound)?;
            let active = s.cards.values().filter(|c| c.user_id == user_id && c.is_active).count();
            if active <= 1 {
                return Err(RepoError::Conflict);
            }
            if let Some(card) = s.cards.get_mut(&id) {
                card.is_active = false;
            }
            drop(s);
            self.persist();
            Ok(())
        }

        async fn duplicate_card(&self, id: Id) -> RepoResult<Card> {
            let mut s = self.state.write().unwrap();
            let original = s.cards.get(&id).cloned().ok_or(RepoError::NotFound)?;
            let new_id = Self::next_id(&mut s);
            let copy = Card {
                id: new_id,
                display_name: format!("{} (Copy)", original.display_name),
                custom_domain: None,
                custom_domain_status: DomainStatus::None,
                nfc_active: false,
                is_active: true,
                created_at: Utc::now(),
                ..original
            };
            s.cards.insert(new_id, copy.clone());
            let links: Vec<Link> = s.links.values().filter(|l| l.card_id == id).cloned().collect();
            for link in links {
                let link_id = Self::next_id(&mut s);
                s.links.insert(link_id, Link { id: link_id, card_id: new_id, ..link });
            }
            drop(s);
            self.persist();
            Ok(copy)
        }

        async fn set_domain(&self, card_id: Id, domain: &str) -> RepoResult<Card> {
            let mut s = self.state.write().unwrap();
            if s.cards
                .values()
                .any(|c| c.id != card_id && c.custom_domain.as_deref() == Some(domain))
            {
                return Err(RepoError::Conflict);
            }
            let card = s.cards.get_mut(&card_id).ok_or(RepoError::NotFound)?;
            card.custom_domain = Some(domain.to_string());
            card.custom_domain_status = DomainStatus::Pending;
            let updated = card.clone();
            drop(s);
            self.persist();
            Ok(updated)
        }

        async fn set_domain_status(&self, card_id: Id, status: DomainStatus) -> RepoResult<Card> {
            let mut s = self.state.write().unwrap();
            let card = s.cards.get_mut(&card_id).ok_or(RepoError::NotFound)?;
            card.custom_domain_status = status;
            let updated = card.clone();
            drop(s);
            self.persist();
            Ok(updated)
        }

        async fn clear_domain(&self, card_id: Id) -> RepoResult<Card> {
            let mut s = self.state.write().unwrap();
            let card = s.cards.get_mut(&card_id).ok_or(RepoError::NotFound)?;
            card.custom_domain = None;
            card.custom_domain_status = DomainStatus::None;
            let updated = card.clone();
            drop(s);
            self.persist();
            Ok(updated)
        }
    }

    #[async_trait]
    impl LinkRepo for InMemRepo {
        async fn list_links(&self, card_id: Id) -> RepoResult<Vec<Link>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s.links.values().filter(|l| l.card_id == card_id).cloned().collect();
            v.sort_by_key(|l| l.position);
            Ok(v)
        }

        async fn add_link(&self, new: NewLink) -> RepoResult<Link> {
            let mut s = self.state.write().unwrap();
            if !s.cards.contains_key(&new.card_id) {
                return Err(RepoError::NotFound);
            }
            let id = Self::next_id(&mut s);
            let link = Link {
                id,
                card_id: new.card_id,
                platform: new.platform,
                url: new.url,
                label: new.label,
                position: new.position,
            };
            s.links.insert(id, link.clone());
            drop(s);
            self.persist();
            Ok(link)
        }

        async fn delete_link(&self, id: Id) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            s.links.remove(&id).ok_or(RepoError::NotFound)?;
            drop(s);
            self.persist();
            Ok(())
        }
    }

    #[async_trait]
    impl CreatorCardRepo for InMemRepo {
        async fn list_creator_cards(&self, user_id: Id) -> RepoResult<Vec<CreatorCard>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s
                .creator_cards
                .values()
                .filter(|c| c.user_id == user_id)
                .cloned()
                .collect();
            v.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(v)
        }

        async fn get_creator_card(&self, id: Id) -> RepoResult<CreatorCard> {
            let s = self.state.read().unwrap();
            s.creator_cards.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn create_creator_card(&self, new: NewCreatorCard) -> RepoResult<CreatorCard> {
            let mut s = self.state.write().unwrap();
            if !s.users.contains_key(&new.user_id) {
                return Err(RepoError::NotFound);
            }
            let id = Self::next_id(&mut s);
            let card = CreatorCard {
                id,
                user_id: new.user_id,
                channel_name: new.channel_name,
                handle: new.handle,
                channel_url: new.channel_url,
                subscribers: new.subscribers,
                videos_count: new.videos_count,
                total_views: new.total_views,
                description: new.description,
                location: new.location,
                logo_url: new.logo_url,
                banner_url: new.banner_url,
                nfc_active: false,
                settings: new.settings,
                created_at: Utc::now(),
            };
            s.creator_cards.insert(id, card.clone());
            drop(s);
            self.persist();
            Ok(card)
        }

        async fn update_creator_card(&self, id: Id, upd: UpdateCreatorCard) -> RepoResult<CreatorCard> {
            let mut s = self.state.write().unwrap();
            let card = s.creator_cards.get_mut(&id).ok_or(RepoError::NotFound)?;
            if let Some(v) = upd.description { card.description = Some(v); }
            if let Some(v) = upd.nfc_active { card.nfc_active = v; }
            if let Some(v) = upd.settings { card.settings = v; }
            let updated = card.clone();
            drop(s);
            self.persist();
            Ok(updated)
        }

        async fn delete_creator_card(&self, id: Id) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            s.creator_cards.remove(&id).ok_or(RepoError::NotFound)?;
            drop(s);
            self.persist();
            Ok(())
        }
    }

    #[async_trait]
    impl EventRepo for InMemRepo {
        async fn record_view(&self, event: ViewEvent) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            // events are only kept for cards that still exist and are live
            if !s.cards.get(&event.card_id).map_or(false, |c| c.is_active) {
                return Err(RepoError::NotFound);
            }
            s.views.push(event);
            drop(s);
            self.persist();
            Ok(())
        }

        async fn record_click(&self, event: ClickEvent) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            if !s.cards.get(&event.card_id).map_or(false, |c| c.is_active) {
                return Err(RepoError::NotFound);
            }
            s.clicks.push(event);
            drop(s);
            self.persist();
            Ok(())
        }

        async fn views_between(
            &self,
            card_id: Id,
            from: DateTime<Utc>,
            to: DateTime<Utc>,
        ) -> RepoResult<Vec<ViewEvent>> {
            let s = self.state.read().unwrap();
            Ok(s.views
                .iter()
                .filter(|v| v.card_id == card_id && v.viewed_at >= from && v.viewed_at < to)
                .cloned()
                .collect())
        }

        async fn clicks_between(
            &self,
            card_id: Id,
            from: DateTime<Utc>,
            to: DateTime<Utc>,
        ) -> RepoResult<Vec<ClickEvent>> {
            let s = self.state.read().unwrap();
            Ok(s.clicks
                .iter()
                .filter(|c| c.card_id == card_id && c.clicked_at >= from && c.clicked_at < to)
                .cloned()
                .collect())
        }

        async fn total_views(&self, card_id: Id) -> RepoResult<u64> {
            let s = self.state.read().unwrap();
            Ok(s.views.iter().filter(|v| v.card_id == card_id).count() as u64)
        }

        async fn total_clicks(&self, card_id: Id) -> RepoResult<u64> {
            let s = self.state.read().unwrap();
            Ok(s.clicks.iter().filter(|c| c.card_id == card_id).count() as u64)
        }
    }

    #[async_trait]
    impl ContactRepo for InMemRepo {
        async fn create_submission(&self, new: NewContact) -> RepoResult<ContactSubmission> {
            let mut s = self.state.write().unwrap();
            if !s.cards.contains_key(&new.card_id) {
                return Err(RepoError::NotFound);
            }
            let id = Self::next_id(&mut s);
            let sub = ContactSubmission {
                id,
                card_id: new.card_id,
                sender_name: new.sender_name,
                sender_email: new.sender_email,
                sender_phone: new.sender_phone,
                message: new.message,
                created_at: Utc::now(),
            };
            s.contacts.insert(id, sub.clone());
            drop(s);
            self.persist();
            Ok(sub)
        }

        async fn list_submissions(&self, card_id: Id) -> RepoResult<Vec<ContactSubmission>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s
                .contacts
                .values()
                .filter(|c| c.card_id == card_id)
                .cloned()
                .collect();
            v.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(v)
        }
    }

    #[async_trait]
    impl TemplateRepo for InMemRepo {
        async fn list_templates(&self) -> RepoResult<Vec<Template>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s.templates.iter().filter(|t| t.is_active).cloned().collect();
            v.sort_by(|a, b| b.usage_count.cmp(&a.usage_count));
            Ok(v)
        }
    }
}

// Postgres implementation (feature = "postgres-store")
#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use sqlx::{Pool, Postgres};
    use std::str::FromStr;

    #[derive(Clone)]
    pub struct PgRepo {
        pool: Pool<Postgres>,
    }

    impl PgRepo {
        pub fn new(pool: Pool<Postgres>) -> Self {
            Self { pool }
        }
    }

    fn map_db(e: sqlx::Error) -> RepoError {
        match &e {
            sqlx::Error::RowNotFound => RepoError::NotFound,
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => RepoError::Conflict,
            _ => RepoError::Transport(e.to_string()),
        }
    }

    fn status_str(s: DomainStatus) -> &'static str {
        match s {
            DomainStatus::None => "none",
            DomainStatus::Pending => "pending",
            DomainStatus::Active => "active",
            DomainStatus::Error => "error",
        }
    }

    fn parse_status(s: &str) -> DomainStatus {
        match s {
            "pending" => DomainStatus::Pending,
            "active" => DomainStatus::Active,
            "error" => DomainStatus::Error,
            _ => DomainStatus::None,
        }
    }

    fn layout_str(l: Layout) -> &'static str {
        match l {
            Layout::Classic => "classic",
            Layout::Modern => "modern",
            Layout::Minimal => "minimal",
        }
    }

    fn parse_layout(s: &str) -> Layout {
        match s {
            "classic" => Layout::Classic,
            "minimal" => Layout::Minimal,
            _ => Layout::Modern,
        }
    }

    #[derive(sqlx::FromRow)]
    struct UserRow {
        id: Id,
        email: String,
        name: String,
        avatar_url: Option<String>,
        plan: String,
        created_at: DateTime<Utc>,
    }

    impl From<UserRow> for User {
        fn from(r: UserRow) -> Self {
            User {
                id: r.id,
                email: r.email,
                name: r.name,
                avatar_url: r.avatar_url,
                plan: if r.plan == "free" { Plan::Free } else { Plan::Pro },
                created_at: r.created_at,
            }
        }
    }

    #[derive(sqlx::FromRow)]
    struct CardRow {
        id: Id,
        user_id: Id,
        display_name: String,
        title: String,
        bio: String,
        company: String,
        location: String,
        email: String,
        phone: String,
        avatar_url: String,
        cover_url: String,
        theme_primary_color: String,
        theme_background_color: String,
        theme_font_family: String,
        theme_layout: String,
        custom_domain: Option<String>,
        custom_domain_status: String,
        nfc_active: bool,
        is_active: bool,
        created_at: DateTime<Utc>,
    }

    impl From<CardRow> for Card {
        fn from(r: CardRow) -> Self {
            Card {
                id: r.id,
                user_id: r.user_id,
                display_name: r.display_name,
                title: r.title,
                bio: r.bio,
                company: r.company,
                location: r.location,
                email: r.email,
                phone: r.phone,
                avatar_url: r.avatar_url,
                cover_url: r.cover_url,
                theme: Theme {
                    primary_color: r.theme_primary_color,
                    background_color: r.theme_background_color,
                    font_family: r.theme_font_family,
                    layout: parse_layout(&r.theme_layout),
                },
                custom_domain: r.custom_domain,
                custom_domain_status: parse_status(&r.custom_domain_status),
                nfc_active: r.nfc_active,
                is_active: r.is_active,
                created_at: r.created_at,
            }
        }
    }

    const CARD_COLS: &str = "id, user_id, display_name, title, bio, company, location, email, phone, \
         avatar_url, cover_url, theme_primary_color, theme_background_color, theme_font_family, \
         theme_layout, custom_domain, custom_domain_status, nfc_active, is_active, created_at";

    #[derive(sqlx::FromRow)]
    struct LinkRow {
        id: Id,
        card_id: Id,
        platform: String,
        url: String,
        label: Option<String>,
        position: i32,
    }

    impl TryFrom<LinkRow> for Link {
        type Error = RepoError;
        fn try_from(r: LinkRow) -> Result<Self, Self::Error> {
            let platform = Platform::from_str(&r.platform)
                .map_err(RepoError::Transport)?;
            Ok(Link {
                id: r.id,
                card_id: r.card_id,
                platform,
                url: r.url,
                label: r.label,
                position: r.position,
            })
        }
    }

    #[async_trait]
    impl UserRepo for PgRepo {
        async fn upsert_user(&self, new: NewUser) -> RepoResult<User> {
            let row = sqlx::query_as::<_, UserRow>(
                "INSERT INTO users (email, name, avatar_url, plan) VALUES ($1, $2, $3, 'pro') \
                 ON CONFLICT (email) DO UPDATE SET name = EXCLUDED.name, \
                   avatar_url = COALESCE(EXCLUDED.avatar_url, users.avatar_url) \
                 RETURNING id, email, name, avatar_url, plan, created_at",
            )
            .bind(&new.email)
            .bind(&new.name)
            .bind(&new.avatar_url)
            .fetch_one(&self.pool)
            .await
            .map_err(map_db)?;
            Ok(row.into())
        }

        async fn get_user(&self, id: Id) -> RepoResult<User> {
            let row = sqlx::query_as::<_, UserRow>(
                "SELECT id, email, name, avatar_url, plan, created_at FROM users WHERE id = $1",
            )
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_db)?;
            Ok(row.into())
        }

        async fn list_users(&self) -> RepoResult<Vec<User>> {
            let rows = sqlx::query_as::<_, UserRow>(
                "SELECT id, email, name, avatar_url, plan, created_at FROM users ORDER BY created_at",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(map_db)?;
            Ok(rows.into_iter().map(Into::into).collect())
        }
    }

    #[async_trait]
    impl CardRepo for PgRepo {
        async fn list_cards(&self, user_id: Id) -> RepoResult<Vec<Card>> {
            let rows = sqlx::query_as::<_, CardRow>(&format!(
                "SELECT {CARD_COLS} FROM cards WHERE user_id = $1 AND is_active ORDER BY created_at DESC"
            ))
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_db)?;
            Ok(rows.into_iter().map(Into::into).collect())
        }

        async fn get_card(&self, id: Id) -> RepoResult<Card> {
            let row = sqlx::query_as::<_, CardRow>(&format!(
                "SELECT {CARD_COLS} FROM cards WHERE id = $1"
            ))
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_db)?;
            Ok(row.into())
        }

        async fn create_card(&self, new: NewCard) -> RepoResult<Card> {
            let row = sqlx::query_as::<_, CardRow>(&format!(
                "INSERT INTO cards (user_id, display_name, title, bio, company, location, email, phone, \
                   avatar_url, cover_url, theme_primary_color, theme_background_color, \
                   theme_font_family, theme_layout) \
                 VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14) \
                 RETURNING {CARD_COLS}"
            ))
            .bind(new.user_id)
            .bind(&new.display_name)
            .bind(&new.title)
            .bind(&new.bio)
            .bind(&new.company)
            .bind(&new.location)
            .bind(&new.email)
            .bind(&new.phone)
            .bind(&new.avatar_url)
            .bind(&new.cover_url)
            .bind(&new.theme.primary_color)
            .bind(&new.theme.background_color)
            .bind(&new.theme.font_family)
            .bind(layout_str(new.theme.layout))
            .fetch_one(&self.pool)
            .await
            .map_err(map_db)?;
            Ok(row.into())
        }

        async fn update_card(&self, id: Id, upd: UpdateCard) -> RepoResult<Card> {
            let theme = upd.theme;
            let row = sqlx::query_as::<_, CardRow>(&format!(
                "UPDATE cards SET \
                   display_name = COALESCE($2, display_name), \
                   title = COALESCE($3, title), \
                   bio = COALESCE($4, bio), \
                   company = COALESCE($5, company), \
                   location = COALESCE($6, location), \
                   email = COALESCE($7, email), \
                   phone = COALESCE($8, phone), \
                   avatar_url = COALESCE($9, avatar_url), \
                   cover_url = COALESCE($10, cover_url), \
                   theme_primary_color = COALESCE($11, theme_primary_color), \
                   theme_background_color = COALESCE($12, theme_background_color), \
                   theme_font_family = COALESCE($13, theme_font_family), \
                   theme_layout = COALESCE($14, theme_layout), \
                   nfc_active = COALESCE($15, nfc_active) \
                 WHERE id = $1 RETURNING {CARD_COLS}"
            ))
            .bind(id)
            .bind(&upd.display_name)
            .bind(&upd.title)
            .bind(&upd.bio)
            .bind(&upd.company)
            .bind(&upd.location)
            .bind(&upd.email)
            .bind(&upd.phone)
            .bind(&upd.avatar_url)
            .bind(&upd.cover_url)
            .bind(theme.as_ref().map(|t| t.primary_color.clone()))
            .bind(theme.as_ref().map(|t| t.background_color.clone()))
            .bind(theme.as_ref().map(|t| t.font_family.clone()))
            .bind(theme.as_ref().map(|t| layout_str(t.layout)))
            .bind(upd.nfc_active)
            .fetch_one(&self.pool)
            .await
            .map_err(map_db)?;
            Ok(row.into())
        }

        async fn soft_delete_card(&self, id: Id) -> RepoResult<()> {
            let mut tx = self.pool.begin().await.map_err(map_db)?;
            let (user_id,): (Id,) =
                sqlx::query_as("SELECT user_id FROM cards WHERE id = $1 AND is_active")
                    .bind(id)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(map_db)?;
            let (active,): (i64,) =
                sqlx::query_as("SELECT COUNT(*) FROM cards WHERE user_id = $1 AND is_active")
                    .bind(user_id)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(map_db)?;
            if active <= 1 {
                return Err(RepoError::Conflict);
            }
            sqlx::query("UPDATE cards SET is_active = FALSE WHERE id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(map_db)?;
            tx.commit().await.map_err(map_db)?;
            Ok(())
        }

        async fn duplicate_card(&self, id: Id) -> RepoResult<Card> {
            let original = self.get_card(id).await?;
            let copy = self
                .create_card(NewCard {
                    user_id: original.user_id,
                    display_name: format!("{} (Copy)", original.display_name),
                    title: original.title,
                    bio: original.bio,
                    company: original.company,
                    location: original.location,
                    email: original.email,
                    phone: original.phone,
                    avatar_url: original.avatar_url,
                    cover_url: original.cover_url,
                    theme: original.theme,
                })
                .await?;
            for link in self.list_links(id).await? {
                self.add_link(NewLink {
                    card_id: copy.id,
                    platform: link.platform,
                    url: link.url,
                    label: link.label,
                    position: link.position,
                })
                .await?;
            }
            Ok(copy)
        }

        async fn set_domain(&self, card_id: Id, domain: &str) -> RepoResult<Card> {
            let taken: Option<(Id,)> =
                sqlx::query_as("SELECT id FROM cards WHERE custom_domain = $1 AND id <> $2 LIMIT 1")
                    .bind(domain)
                    .bind(card_id)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_db)?;
            if taken.is_some() {
                return Err(RepoError::Conflict);
            }
            let row = sqlx::query_as::<_, CardRow>(&format!(
                "UPDATE cards SET custom_domain = $2, custom_domain_status = 'pending' \
                 WHERE id = $1 RETURNING {CARD_COLS}"
            ))
            .bind(card_id)
            .bind(domain)
            .fetch_one(&self.pool)
            .await
            .map_err(map_db)?;
            Ok(row.into())
        }

        async fn set_domain_status(&self, card_id: Id, status: DomainStatus) -> RepoResult<Card> {
            let row = sqlx::query_as::<_, CardRow>(&format!(
                "UPDATE cards SET custom_domain_status = $2 WHERE id = $1 RETURNING {CARD_COLS}"
            ))
            .bind(card_id)
            .bind(status_str(status))
            .fetch_one(&self.pool)
            .await
            .map_err(map_db)?;
            Ok(row.into())
        }

        async fn clear_domain(&self, card_id: Id) -> RepoResult<Card> {
            let row = sqlx::query_as::<_, CardRow>(&format!(
                "UPDATE cards SET custom_domain = NULL, custom_domain_status = 'none' \
                 WHERE id = $1 RETURNING {CARD_COLS}"
            ))
            .bind(card_id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_db)?;
            Ok(row.into())
        }
    }

    #[async_trait]
    impl LinkRepo for PgRepo {
        async fn list_links(&self, card_id: Id) -> RepoResult<Vec<Link>> {
            let rows = sqlx::query_as::<_, LinkRow>(
                "SELECT id, card_id, platform, url, label, position FROM card_links \
                 WHERE card_id = $1 ORDER BY position ASC",
            )
            .bind(card_id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_db)?;
            rows.into_iter().map(TryInto::try_into).collect()
        }

        async fn add_link(&self, new: NewLink) -> RepoResult<Link> {
            let row = sqlx::query_as::<_, LinkRow>(
                "INSERT INTO card_links (card_id, platform, url, label, position) \
                 VALUES ($1,$2,$3,$4,$5) RETURNING id, card_id, platform, url, label, position",
            )
            .bind(new.card_id)
            .bind(new.platform.as_str())
            .bind(&new.url)
            .bind(&new.label)
            .bind(new.position)
            .fetch_one(&self.pool)
            .await
            .map_err(map_db)?;
            row.try_into()
        }

        async fn delete_link(&self, id: Id) -> RepoResult<()> {
            let res = sqlx::query("DELETE FROM card_links WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(map_db)?;
            if res.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            Ok(())
        }
    }

    #[derive(sqlx::FromRow)]
    struct CreatorRow {
        id: Id,
        user_id: Id,
        channel_name: String,
        handle: String,
        channel_url: String,
        subscribers: String,
        videos_count: String,
        total_views: Option<String>,
        description: Option<String>,
        location: Option<String>,
        logo_url: String,
        banner_url: Option<String>,
        nfc_active: bool,
        theme: String,
        show_subscribers: bool,
        show_videos: bool,
        created_at: DateTime<Utc>,
    }

    impl From<CreatorRow> for CreatorCard {
        fn from(r: CreatorRow) -> Self {
            CreatorCard {
                id: r.id,
                user_id: r.user_id,
                channel_name: r.channel_name,
                handle: r.handle,
                channel_url: r.channel_url,
                subscribers: r.subscribers,
                videos_count: r.videos_count,
                total_views: r.total_views,
                description: r.description,
                location: r.location,
                logo_url: r.logo_url,
                banner_url: r.banner_url,
                nfc_active: r.nfc_active,
                settings: CreatorSettings {
                    theme: if r.theme == "red" { CreatorTheme::Red } else { CreatorTheme::Dark },
                    show_subscribers: r.show_subscribers,
                    show_videos: r.show_videos,
                },
                created_at: r.created_at,
            }
        }
    }

    const CREATOR_COLS: &str = "id, user_id, channel_name, handle, channel_url, subscribers, \
         videos_count, total_views, description, location, logo_url, banner_url, nfc_active, \
         theme, show_subscribers, show_videos, created_at";

    #[async_trait]
    impl CreatorCardRepo for PgRepo {
        async fn list_creator_cards(&self, user_id: Id) -> RepoResult<Vec<CreatorCard>> {
            let rows = sqlx::query_as::<_, CreatorRow>(&format!(
                "SELECT {CREATOR_COLS} FROM creator_cards WHERE user_id = $1 ORDER BY created_at DESC"
            ))
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_db)?;
            Ok(rows.into_iter().map(Into::into).collect())
        }

        async fn get_creator_card(&self, id: Id) -> RepoResult<CreatorCard> {
            let row = sqlx::query_as::<_, CreatorRow>(&format!(
                "SELECT {CREATOR_COLS} FROM creator_cards WHERE id = $1"
            ))
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_db)?;
            Ok(row.into())
        }

        async fn create_creator_card(&self, new: NewCreatorCard) -> RepoResult<CreatorCard> {
            let theme = match new.settings.theme {
                CreatorTheme::Red => "red",
                CreatorTheme::Dark => "dark",
            };
            let row = sqlx::query_as::<_, CreatorRow>(&format!(
                "INSERT INTO creator_cards (user_id, channel_name, handle, channel_url, subscribers, \
                   videos_count, total_views, description, location, logo_url, banner_url, theme, \
                   show_subscribers, show_videos) \
                 VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14) RETURNING {CREATOR_COLS}"
            ))
            .bind(new.user_id)
            .bind(&new.channel_name)
            .bind(&new.handle)
            .bind(&new.channel_url)
            .bind(&new.subscribers)
            .bind(&new.videos_count)
            .bind(&new.total_views)
            .bind(&new.description)
            .bind(&new.location)
            .bind(&new.logo_url)
            .bind(&new.banner_url)
            .bind(theme)
            .bind(new.settings.show_subscribers)
            .bind(new.settings.show_videos)
            .fetch_one(&self.pool)
            .await
            .map_err(map_db)?;
            Ok(row.into())
        }

        async fn update_creator_card(&self, id: Id, upd: UpdateCreatorCard) -> RepoResult<CreatorCard> {
            let settings = upd.settings;
            let row = sqlx::query_as::<_, CreatorRow>(&format!(
                "UPDATE creator_cards SET \
                   description = COALESCE($2, description), \
                   nfc_active = COALESCE($3, nfc_active), \
                   theme = COALESCE($4, theme), \
                   show_subscribers = COALESCE($5, show_subscribers), \
                   show_videos = COALESCE($6, show_videos) \
                 WHERE id = $1 RETURNING {CREATOR_COLS}"
            ))
            .bind(id)
            .bind(&upd.description)
            .bind(upd.nfc_active)
            .bind(settings.as_ref().map(|s| match s.theme {
                CreatorTheme::Red => "red",
                CreatorTheme::Dark => "dark",
            }))
            .bind(settings.as_ref().map(|s| s.show_subscribers))
            .bind(settings.as_ref().map(|s| s.show_videos))
            .fetch_one(&self.pool)
            .await
            .map_err(map_db)?;
            Ok(row.into())
        }

        async fn delete_creator_card(&self, id: Id) -> RepoResult<()> {
            let res = sqlx::query("DELETE FROM creator_cards WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(map_db)?;
            if res.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            Ok(())
        }
    }

    #[derive(sqlx::FromRow)]
    struct ViewRow {
        card_id: Id,
        ip_hash: Option<String>,
        user_agent: Option<String>,
        referer: Option<String>,
        country: Option<String>,
        city: Option<String>,
        viewed_at: DateTime<Utc>,
    }

    #[derive(sqlx::FromRow)]
    struct ClickRow {
        card_id: Id,
        link_id: Option<Id>,
        platform: String,
        ip_hash: Option<String>,
        link_url: Option<String>,
        clicked_at: DateTime<Utc>,
    }

    #[async_trait]
    impl EventRepo for PgRepo {
        async fn record_view(&self, event: ViewEvent) -> RepoResult<()> {
            // the SELECT guard drops events for unknown or deactivated cards
            let res = sqlx::query(
                "INSERT INTO card_views (card_id, ip_hash, user_agent, referer, country, city, viewed_at) \
                 SELECT $1,$2,$3,$4,$5,$6,$7 FROM cards WHERE id = $1 AND is_active",
            )
            .bind(event.card_id)
            .bind(&event.ip_hash)
            .bind(&event.user_agent)
            .bind(&event.referer)
            .bind(&event.country)
            .bind(&event.city)
            .bind(event.viewed_at)
            .execute(&self.pool)
            .await
            .map_err(map_db)?;
            if res.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            Ok(())
        }

        async fn record_click(&self, event: ClickEvent) -> RepoResult<()> {
            let res = sqlx::query(
                "INSERT INTO card_clicks (card_id, link_id, platform, ip_hash, link_url, clicked_at) \
                 SELECT $1,$2,$3,$4,$5,$6 FROM cards WHERE id = $1 AND is_active",
            )
            .bind(event.card_id)
            .bind(event.link_id)
            .bind(event.platform.as_str())
            .bind(&event.ip_hash)
            .bind(&event.link_url)
            .bind(event.clicked_at)
            .execute(&self.pool)
            .await
            .map_err(map_db)?;
            if res.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            Ok(())
        }

        async fn views_between(
            &self,
            card_id: Id,
            from: DateTime<Utc>,
            to: DateTime<Utc>,
        ) -> RepoResult<Vec<ViewEvent>> {
            let rows = sqlx::query_as::<_, ViewRow>(
                "SELECT card_id, ip_hash, user_agent, referer, country, city, viewed_at \
                 FROM card_views WHERE card_id = $1 AND viewed_at >= $2 AND viewed_at < $3",
            )
            .bind(card_id)
            .bind(from)
            .bind(to)
            .fetch_all(&self.pool)
            .await
            .map_err(map_db)?;
            Ok(rows
                .into_iter()
                .map(|r| ViewEvent {
                    card_id: r.card_id,
                    ip_hash: r.ip_hash,
                    user_agent: r.user_agent,
                    referer: r.referer,
                    country: r.country,
                    city: r.city,
                    viewed_at: r.viewed_at,
                })
                .collect())
        }

        async fn clicks_between(
            &self,
            card_id: Id,
            from: DateTime<Utc>,
            to: DateTime<Utc>,
        ) -> RepoResult<Vec<ClickEvent>> {
            let rows = sqlx::query_as::<_, ClickRow>(
                "SELECT card_id, link_id, platform, ip_hash, link_url, clicked_at \
                 FROM card_clicks WHERE card_id = $1 AND clicked_at >= $2 AND clicked_at < $3",
            )
            .bind(card_id)
            .bind(from)
            .bind(to)
            .fetch_all(&self.pool)
            .await
            .map_err(map_db)?;
            rows.into_iter()
                .map(|r| {
                    let platform =
                        Platform::from_str(&r.platform).map_err(RepoError::Transport)?;
                    Ok(ClickEvent {
                        card_id: r.card_id,
                        link_id: r.link_id,
                        platform,
                        ip_hash: r.ip_hash,
                        link_url: r.link_url,
                        clicked_at: r.clicked_at,
                    })
                })
                .collect()
        }

        async fn total_views(&self, card_id: Id) -> RepoResult<u64> {
            let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM card_views WHERE card_id = $1")
                .bind(card_id)
                .fetch_one(&self.pool)
                .await
                .map_err(map_db)?;
            Ok(n as u64)
        }

        async fn total_clicks(&self, card_id: Id) -> RepoResult<u64> {
            let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM card_clicks WHERE card_id = $1")
                .bind(card_id)
                .fetch_one(&self.pool)
                .await
                .map_err(map_db)?;
            Ok(n as u64)
        }
    }

    #[derive(sqlx::FromRow)]
    struct ContactRow {
        id: Id,
        card_id: Id,
        sender_name: String,
        sender_email: String,
        sender_phone: Option<String>,
        message: String,
        created_at: DateTime<Utc>,
    }

    impl From<ContactRow> for ContactSubmission {
        fn from(r: ContactRow) -> Self {
            ContactSubmission {
                id: r.id,
                card_id: r.card_id,
                sender_name: r.sender_name,
                sender_email: r.sender_email,
                sender_phone: r.sender_phone,
                message: r.message,
                created_at: r.created_at,
            }
        }
    }

    #[async_trait]
    impl ContactRepo for PgRepo {
        async fn create_submission(&self, new: NewContact) -> RepoResult<ContactSubmission> {
            let row = sqlx::query_as::<_, ContactRow>(
                "INSERT INTO contact_submissions (card_id, sender_name, sender_email, sender_phone, message) \
                 VALUES ($1,$2,$3,$4,$5) \
                 RETURNING id, card_id, sender_name, sender_email, sender_phone, message, created_at",
            )
            .bind(new.card_id)
            .bind(&new.sender_name)
            .bind(&new.sender_email)
            .bind(&new.sender_phone)
            .bind(&new.message)
            .fetch_one(&self.pool)
            .await
            .map_err(map_db)?;
            Ok(row.into())
        }

        async fn list_submissions(&self, card_id: Id) -> RepoResult<Vec<ContactSubmission>> {
            let rows = sqlx::query_as::<_, ContactRow>(
                "SELECT id, card_id, sender_name, sender_email, sender_phone, message, created_at \
                 FROM contact_submissions WHERE card_id = $1 ORDER BY created_at DESC",
            )
            .bind(card_id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_db)?;
            Ok(rows.into_iter().map(Into::into).collect())
        }
    }

    #[derive(sqlx::FromRow)]
    struct TemplateRow {
        id: Id,
        name: String,
        category: String,
        theme_primary_color: String,
        theme_background_color: String,
        theme_font_family: String,
        theme_layout: String,
        is_active: bool,
        usage_count: i64,
    }

    #[async_trait]
    impl TemplateRepo for PgRepo {
        async fn list_templates(&self) -> RepoResult<Vec<Template>> {
            let rows = sqlx::query_as::<_, TemplateRow>(
                "SELECT id, name, category, theme_primary_color, theme_background_color, \
                   theme_font_family, theme_layout, is_active, usage_count \
                 FROM card_templates WHERE is_active ORDER BY usage_count DESC",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(map_db)?;
            Ok(rows
                .into_iter()
                .map(|r| Template {
                    id: r.id,
                    name: r.name,
                    category: r.category,
                    theme: Theme {
                        primary_color: r.theme_primary_color,
                        background_color: r.theme_background_color,
                        font_family: r.theme_font_family,
                        layout: parse_layout(&r.theme_layout),
                    },
                    is_active: r.is_active,
                    usage_count: r.usage_count,
                })
                .collect())
        }
    }
}
