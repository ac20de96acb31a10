#![cfg(feature = "inmem-store")]

use serial_test::serial;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tapdeck::adapters::{AdapterError, ChannelData, ChannelLookup};
use tapdeck::domain::{DomainResolver, ResolveError};
use tapdeck::models::*;
use tapdeck::repo::inmem::InMemRepo;
use tapdeck::repo::*;
use tapdeck::store::{AppStore, StoreError};

/// Delegating wrapper that can be switched into a failure mode where every
/// mutation returns a transport error. Reads always pass through.
struct FlakyRepo {
    inner: InMemRepo,
    failing: AtomicBool,
}

impl FlakyRepo {
    fn new() -> Arc<Self> {
        std::env::set_var("TAPDECK_DATA_DIR", tempfile::tempdir().unwrap().path());
        Arc::new(Self { inner: InMemRepo::new(), failing: AtomicBool::new(false) })
    }

    fn fail(&self, on: bool) {
        self.failing.store(on, Ordering::SeqCst);
    }

    fn check(&self) -> RepoResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(RepoError::Transport("injected failure".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl UserRepo for FlakyRepo {
    async fn upsert_user(&self, new: NewUser) -> RepoResult<User> {
        self.check()?;
        self.inner.upsert_user(new).await
    }
    async fn get_user(&self, id: Id) -> RepoResult<User> {
        self.inner.get_user(id).await
    }
    async fn list_users(&self) -> RepoResult<Vec<User>> {
        self.inner.list_users().await
    }
}

#[async_trait]
impl CardRepo for FlakyRepo {
    async fn list_cards(&self, user_id: Id) -> RepoResult<Vec<Card>> {
        self.inner.list_cards(user_id).await
    }
    async fn get_card(&self, id: Id) -> RepoResult<Card> {
        self.inner.get_card(id).await
    }
    async fn create_card(&self, new: NewCard) -> RepoResult<Card> {
        self.check()?;
        self.inner.create_card(new).await
    }
    async fn update_card(&self, id: Id, upd: UpdateCard) -> RepoResult<Card> {
        self.check()?;
        self.inner.update_card(id, upd).await
    }
    async fn soft_delete_card(&self, id: Id) -> RepoResult<()> {
        self.check()?;
        self.inner.soft_delete_card(id).await
    }
    async fn duplicate_card(&self, id: Id) -> RepoResult<Card> {
        self.check()?;
        self.inner.duplicate_card(id).await
    }
    async fn set_domain(&self, card_id: Id, domain: &str) -> RepoResult<Card> {
        self.check()?;
        self.inner.set_domain(card_id, domain).await
    }
    async fn set_domain_status(&self, card_id: Id, status: DomainStatus) -> RepoResult<Card> {
        self.check()?;
        self.inner.set_domain_status(card_id, status).await
    }
    async fn clear_domain(&self, card_id: Id) -> RepoResult<Card> {
        self.check()?;
        self.inner.clear_domain(card_id).await
    }
}

#[async_trait]
impl LinkRepo for FlakyRepo {
    async fn list_links(&self, card_id: Id) -> RepoResult<Vec<Link>> {
        self.inner.list_links(card_id).await
    }
    async fn add_link(&self, new: NewLink) -> RepoResult<Link> {
        self.check()?;
        self.inner.add_link(new).await
    }
    async fn delete_link(&self, id: Id) -> RepoResult<()> {
        self.check()?;
        self.inner.delete_link(id).await
    }
}

#[async_trait]
impl CreatorCardRepo for FlakyRepo {
    async fn list_creator_cards(&self, user_id: Id) -> RepoResult<Vec<CreatorCard>> {
        self.inner.list_creator_cards(user_id).await
    }
    async fn get_creator_card(&self, id: Id) -> RepoResult<CreatorCard> {
        self.inner.get_creator_card(id).await
    }
    async fn create_creator_card(&self, new: NewCreatorCard) -> RepoResult<CreatorCard> {
        self.check()?;
        self.inner.create_creator_card(new).await
    }
    async fn update_creator_card(&self, id: Id, upd: UpdateCreatorCard) -> RepoResult<CreatorCard> {
        self.check()?;
        self.inner.update_creator_card(id, upd).await
    }
    async fn delete_creator_card(&self, id: Id) -> RepoResult<()> {
        self.check()?;
        self.inner.delete_creator_card(id).await
    }
}

#[async_trait]
impl EventRepo for FlakyRepo {
    async fn record_view(&self, event: ViewEvent) -> RepoResult<()> {
        self.inner.record_view(event).await
    }
    async fn record_click(&self, event: ClickEvent) -> RepoResult<()> {
        self.inner.record_click(event).await
    }
    async fn views_between(
        &self,
        card_id: Id,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> RepoResult<Vec<ViewEvent>> {
        self.inner.views_between(card_id, from, to).await
    }
    async fn clicks_between(
        &self,
        card_id: Id,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> RepoResult<Vec<ClickEvent>> {
        self.inner.clicks_between(card_id, from, to).await
    }
    async fn total_views(&self, card_id: Id) -> RepoResult<u64> {
        self.inner.total_views(card_id).await
    }
    async fn total_clicks(&self, card_id: Id) -> RepoResult<u64> {
        self.inner.total_clicks(card_id).await
    }
}

#[async_trait]
impl ContactRepo for FlakyRepo {
    async fn create_submission(&self, new: NewContact) -> RepoResult<ContactSubmission> {
        self.check()?;
        self.inner.create_submission(new).await
    }
    async fn list_submissions(&self, card_id: Id) -> RepoResult<Vec<ContactSubmission>> {
        self.inner.list_submissions(card_id).await
    }
}

#[async_trait]
impl TemplateRepo for FlakyRepo {
    async fn list_templates(&self) -> RepoResult<Vec<Template>> {
        self.inner.list_templates().await
    }
}

struct FakeLookup;

#[async_trait]
impl ChannelLookup for FakeLookup {
    async fn lookup(&self, _input: &str) -> Result<ChannelData, AdapterError> {
        Ok(ChannelData {
            channel_name: "Maker Lab".into(),
            handle: "@makerlab".into(),
            channel_url: "https://youtube.com/channel/UCfake".into(),
            subscribers: "1.2M".into(),
            videos_count: "321".into(),
            total_views: "98.0M".into(),
            description: None,
            logo_url: None,
            banner_url: None,
            location: None,
        })
    }
}

struct FixedResolver {
    records: Vec<String>,
}

#[async_trait]
impl DomainResolver for FixedResolver {
    async fn txt_records(&self, _name: &str) -> Result<Vec<String>, ResolveError> {
        Ok(self.records.clone())
    }
}

async fn loaded_store(repo: Arc<FlakyRepo>) -> AppStore {
    AppStore::load(
        repo,
        NewUser { email: "pat@example.com".into(), name: "Pat".into(), avatar_url: None },
    )
    .await
    .unwrap()
}

#[tokio::test]
#[serial]
async fn load_bootstraps_a_default_card() {
    let repo = FlakyRepo::new();
    let store = loaded_store(repo).await;
    assert_eq!(store.cards().len(), 1);
    let active = store.active_card();
    assert_eq!(active.card.display_name, "Pat");
    assert_eq!(active.card.email, "pat@example.com");
    assert!(active.links.is_empty());
}

#[tokio::test]
#[serial]
async fn load_is_idempotent_for_an_existing_user() {
    let repo = FlakyRepo::new();
    let first = loaded_store(repo.clone()).await;
    let second = loaded_store(repo).await;
    assert_eq!(first.cards().len(), 1);
    assert_eq!(second.cards().len(), 1);
    assert_eq!(first.active_card().card.id, second.active_card().card.id);
}

#[tokio::test]
#[serial]
async fn switch_errors_on_unknown_id_and_keeps_selection() {
    let repo = FlakyRepo::new();
    let mut store = loaded_store(repo).await;
    let original = store.active_card().card.id;

    let err = store.switch_active_card(424242).unwrap_err();
    assert!(matches!(err, StoreError::UnknownCard));
    assert_eq!(store.active_card().card.id, original);

    // switching to the already-active card is a no-op
    store.switch_active_card(original).unwrap();
    assert_eq!(store.active_card().card.id, original);
}

#[tokio::test]
#[serial]
async fn update_rolls_back_when_persistence_fails() {
    let repo = FlakyRepo::new();
    let mut store = loaded_store(repo.clone()).await;
    let before = store.active_card().card.clone();

    repo.fail(true);
    let err = store
        .update_card(UpdateCard { title: Some("CTO".into()), ..Default::default() })
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Repo(RepoError::Transport(_))));

    // in-memory card reverted
    assert_eq!(store.active_card().card.title, before.title);

    repo.fail(false);
    let saved = store
        .update_card(UpdateCard { title: Some("CTO".into()), ..Default::default() })
        .await
        .unwrap();
    assert_eq!(saved.title, "CTO");
    assert_eq!(store.active_card().card.title, "CTO");
}

#[tokio::test]
#[serial]
async fn link_lifecycle_and_removal_rollback() {
    let repo = FlakyRepo::new();
    let mut store = loaded_store(repo.clone()).await;

    let a = store
        .add_link(Platform::Github, "https://github.com/pat".into(), None)
        .await
        .unwrap();
    let b = store
        .add_link(Platform::Twitter, "https://twitter.com/pat".into(), Some("X".into()))
        .await
        .unwrap();
    assert!(b.position > a.position);

    repo.fail(true);
    let err = store.remove_link(a.id).await.unwrap_err();
    assert!(matches!(err, StoreError::Repo(RepoError::Transport(_))));
    // the link is back at its original index
    assert_eq!(store.active_card().links[0].id, a.id);

    repo.fail(false);
    store.remove_link(a.id).await.unwrap();
    assert_eq!(store.active_card().links.len(), 1);

    let err = store.remove_link(a.id).await.unwrap_err();
    assert!(matches!(err, StoreError::UnknownLink));
}

#[tokio::test]
#[serial]
async fn create_requires_a_name_and_activates_the_new_card() {
    let repo = FlakyRepo::new();
    let mut store = loaded_store(repo).await;

    assert!(matches!(store.create_card("  ").await.unwrap_err(), StoreError::EmptyName));

    let card = store.create_card("Side Hustle").await.unwrap();
    assert_eq!(store.cards().len(), 2);
    assert_eq!(store.active_card().card.id, card.id);
}

#[tokio::test]
#[serial]
async fn delete_refuses_last_card_for_any_id() {
    let repo = FlakyRepo::new();
    let mut store = loaded_store(repo).await;

    // one card: even an unknown id reports the guard, not a lookup error
    assert!(matches!(store.delete_card(424242).await.unwrap_err(), StoreError::LastCard));

    let first = store.cards()[0].card.id;
    let second = store.create_card("Second").await.unwrap();
    store.delete_card(second.id).await.unwrap();
    assert_eq!(store.cards().len(), 1);
    assert_eq!(store.active_card().card.id, first);
}

#[tokio::test]
#[serial]
async fn duplicate_becomes_active() {
    let repo = FlakyRepo::new();
    let mut store = loaded_store(repo).await;
    let original = store.active_card().card.id;

    let copy = store.duplicate_card(original).await.unwrap();
    assert_ne!(copy.id, original);
    assert!(copy.display_name.ends_with("(Copy)"));
    assert_eq!(store.active_card().card.id, copy.id);
}

#[tokio::test]
#[serial]
async fn creator_card_generation_applies_fallbacks() {
    let repo = FlakyRepo::new();
    let mut store = loaded_store(repo).await;
    let avatar = store.active_card().card.avatar_url.clone();

    let creator = store
        .generate_creator_card("@makerlab", &FakeLookup)
        .await
        .unwrap();
    assert_eq!(creator.channel_name, "Maker Lab");
    assert_eq!(creator.logo_url, avatar);
    assert_eq!(creator.location.as_deref(), Some("Global"));
    assert!(creator.description.as_deref().unwrap().contains("Maker Lab"));
    assert_eq!(creator.settings, CreatorSettings::default());

    store.remove_creator_card().await.unwrap();
    assert!(store.creator_card().is_none());
    assert!(matches!(
        store.remove_creator_card().await.unwrap_err(),
        StoreError::NoCreatorCard
    ));
}

#[tokio::test]
#[serial]
async fn regenerating_replaces_the_creator_card() {
    let repo = FlakyRepo::new();
    let mut store = loaded_store(repo.clone()).await;
    let user_id = store.user().id;

    let first = store.generate_creator_card("@makerlab", &FakeLookup).await.unwrap();
    let second = store.generate_creator_card("@makerlab", &FakeLookup).await.unwrap();
    assert_ne!(first.id, second.id);
    assert_eq!(store.creator_card().unwrap().id, second.id);

    // only the replacement survives server-side
    let stored = repo.list_creator_cards(user_id).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, second.id);

    // a failed regeneration leaves the existing card in place
    repo.fail(true);
    let err = store.generate_creator_card("@makerlab", &FakeLookup).await.unwrap_err();
    assert!(matches!(err, StoreError::Repo(RepoError::Transport(_))));
    assert_eq!(store.creator_card().unwrap().id, second.id);
    assert_eq!(repo.list_creator_cards(user_id).await.unwrap().len(), 1);
}

#[tokio::test]
#[serial]
async fn card_lookup_does_not_move_the_selection() {
    let repo = FlakyRepo::new();
    let mut store = loaded_store(repo).await;
    let first = store.active_card().card.id;
    let second = store.create_card("Second").await.unwrap();

    let snapshot = store.card(first).unwrap();
    assert_eq!(snapshot.card.id, first);
    assert_eq!(store.active_card().card.id, second.id);

    assert!(matches!(store.card(424242).unwrap_err(), StoreError::UnknownCard));
}

#[tokio::test]
#[serial]
async fn creator_settings_roll_back_on_failure() {
    let repo = FlakyRepo::new();
    let mut store = loaded_store(repo.clone()).await;
    store.generate_creator_card("@makerlab", &FakeLookup).await.unwrap();

    repo.fail(true);
    let err = store
        .update_creator_settings(UpdateCreatorCard {
            nfc_active: Some(true),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Repo(RepoError::Transport(_))));
    assert!(!store.creator_card().unwrap().nfc_active);

    repo.fail(false);
    let saved = store
        .update_creator_settings(UpdateCreatorCard {
            nfc_active: Some(true),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(saved.nfc_active);
}

#[tokio::test]
#[serial]
async fn domain_state_machine() {
    let repo = FlakyRepo::new();
    let mut store = loaded_store(repo).await;
    let card_id = store.active_card().card.id;

    assert!(matches!(
        store.connect_domain("not a domain").await.unwrap_err(),
        StoreError::InvalidDomain
    ));
    assert!(matches!(
        store.verify_domain(&FixedResolver { records: vec![] }).await.unwrap_err(),
        StoreError::NoDomain
    ));

    let card = store.connect_domain("Cards.Example.COM").await.unwrap();
    assert_eq!(card.custom_domain.as_deref(), Some("cards.example.com"));
    assert_eq!(card.custom_domain_status, DomainStatus::Pending);

    // wrong TXT value: pending -> error
    let card = store
        .verify_domain(&FixedResolver { records: vec!["tapdeck-verify=999".into()] })
        .await
        .unwrap();
    assert_eq!(card.custom_domain_status, DomainStatus::Error);

    // matching record: error -> active
    let card = store
        .verify_domain(&FixedResolver {
            records: vec![format!("tapdeck-verify={card_id}")],
        })
        .await
        .unwrap();
    assert_eq!(card.custom_domain_status, DomainStatus::Active);

    // active is terminal even when the record disappears
    let card = store
        .verify_domain(&FixedResolver { records: vec![] })
        .await
        .unwrap();
    assert_eq!(card.custom_domain_status, DomainStatus::Active);

    let card = store.remove_domain().await.unwrap();
    assert_eq!(card.custom_domain, None);
    assert_eq!(card.custom_domain_status, DomainStatus::None);
}

#[tokio::test]
#[serial]
async fn domain_conflict_leaves_state_untouched() {
    let repo = FlakyRepo::new();
    let mut store = loaded_store(repo).await;

    let first = store.active_card().card.id;
    store.connect_domain("cards.example.com").await.unwrap();

    let second = store.create_card("Second").await.unwrap();
    let err = store.connect_domain("cards.example.com").await.unwrap_err();
    assert!(matches!(err, StoreError::Repo(RepoError::Conflict)));

    assert_eq!(store.active_card().card.id, second.id);
    assert_eq!(store.active_card().card.custom_domain, None);

    store.switch_active_card(first).unwrap();
    assert_eq!(store.active_card().card.custom_domain.as_deref(), Some("cards.example.com"));
}
