use std::sync::Arc;

use actix_multipart::Multipart;
use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{Duration, TimeZone, Utc};
use dashmap::DashMap;
use futures_util::TryStreamExt as _;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::adapters::{BioGenerator, BioRequest, ChannelLookup, FALLBACK_BIO};
use crate::analytics::{AnalyticsSummary, DEFAULT_TOP_LINKS};
use crate::auth::{Auth, Claims, Role};
use crate::domain::DomainResolver;
use crate::error::ApiError;
use crate::media::{MediaStore, MAX_UPLOAD_BYTES};
use crate::models::*;
use crate::repo::Repo;
use crate::store::{AppStore, CardSnapshot, StoreError};
use crate::webhook::{verify_signature, Mailer, SignupEvent};
use crate::require_role;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(web::resource("/me").route(web::get().to(get_me)))
            .service(web::resource("/cards").route(web::post().to(create_card)))
            .service(
                web::resource("/cards/{id}")
                    .route(web::patch().to(update_card))
                    .route(web::delete().to(delete_card)),
            )
            .service(web::resource("/cards/{id}/duplicate").route(web::post().to(duplicate_card)))
            .service(web::resource("/cards/{id}/links").route(web::post().to(add_link)))
            .service(
                web::resource("/cards/{id}/links/{link_id}").route(web::delete().to(remove_link)),
            )
            .service(
                web::resource("/cards/{id}/domain")
                    .route(web::post().to(connect_domain))
                    .route(web::delete().to(remove_domain)),
            )
            .service(web::resource("/cards/{id}/domain/verify").route(web::post().to(verify_domain)))
            .service(web::resource("/cards/{id}/analytics").route(web::get().to(card_analytics)))
            .service(web::resource("/cards/{id}/contacts").route(web::get().to(list_contacts)))
            .service(
                web::resource("/creator-card")
                    .route(web::post().to(generate_creator_card))
                    .route(web::patch().to(update_creator_card))
                    .route(web::delete().to(delete_creator_card)),
            )
            .service(web::resource("/bio").route(web::post().to(generate_bio)))
            .service(web::resource("/media").route(web::post().to(upload_media)))
            .service(web::resource("/admin/users").route(web::get().to(admin_list_users))),
    );
    // Public surface: card pages, tracking, contact form, the template
    // gallery, media fetch and the server-to-server signup webhook.
    cfg.route("/templates", web::get().to(list_templates));
    cfg.route("/p/{card_id}", web::get().to(public_card));
    cfg.route("/p/{card_id}/view", web::post().to(track_view));
    cfg.route("/p/{card_id}/click", web::post().to(track_click));
    cfg.route("/p/{card_id}/contact", web::post().to(submit_contact));
    cfg.route("/media/{key}", web::get().to(get_media));
    cfg.route("/webhooks/signup", web::post().to(signup_webhook));
}

/// One loaded `AppStore` per authenticated user, created lazily on first
/// request. The mutex serializes all mutations for that user; creator-card
/// generation additionally takes an in-flight marker so a concurrent
/// double-submit is rejected instead of queued behind the first.
pub struct SessionRegistry {
    repo: Arc<dyn Repo>,
    stores: DashMap<String, Arc<Mutex<AppStore>>>,
    generating: DashMap<String, ()>,
}

/// Clears the in-flight marker when dropped, error paths included.
pub struct GenerationGuard<'a> {
    owner: &'a DashMap<String, ()>,
    user: String,
}

impl Drop for GenerationGuard<'_> {
    fn drop(&mut self) {
        self.owner.remove(&self.user);
    }
}

impl SessionRegistry {
    pub fn new(repo: Arc<dyn Repo>) -> Self {
        Self { repo, stores: DashMap::new(), generating: DashMap::new() }
    }

    /// Marks a creator-card generation as in flight for this user. While
    /// the returned guard lives, a second call reports the lookup as
    /// already running.
    pub fn begin_generation(&self, user: &str) -> Result<GenerationGuard<'_>, ApiError> {
        match self.generating.entry(user.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(StoreError::LookupInFlight.into())
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(());
                Ok(GenerationGuard { owner: &self.generating, user: user.to_string() })
            }
        }
    }

    pub async fn store_for(&self, claims: &Claims) -> Result<Arc<Mutex<AppStore>>, ApiError> {
        if let Some(existing) = self.stores.get(&claims.sub) {
            return Ok(existing.clone());
        }
        let loaded = AppStore::load(
            self.repo.clone(),
            NewUser {
                email: claims.sub.clone(),
                name: claims.name.clone(),
                avatar_url: None,
            },
        )
        .await?;
        // Two first-requests may race here; entry() keeps exactly one.
        let entry = self
            .stores
            .entry(claims.sub.clone())
            .or_insert_with(|| Arc::new(Mutex::new(loaded)));
        Ok(entry.value().clone())
    }
}

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionRegistry>,
    pub repo: Arc<dyn Repo>,
    pub media: Arc<dyn MediaStore>,
    pub channel_lookup: Arc<dyn ChannelLookup>,
    pub bio: Arc<dyn BioGenerator>,
    pub resolver: Arc<dyn DomainResolver>,
    pub mailer: Option<Arc<dyn Mailer>>,
    pub webhook_secret: Option<String>,
    pub ip_salt: String,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct SessionView {
    pub user: User,
    pub active_card_id: Id,
    pub cards: Vec<CardSnapshot>,
    pub creator_card: Option<CreatorCard>,
}

fn session_view(store: &AppStore) -> SessionView {
    SessionView {
        user: store.user().clone(),
        active_card_id: store.active_card().card.id,
        cards: store.cards().to_vec(),
        creator_card: store.creator_card().cloned(),
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/me",
    responses((status = 200, description = "Current session", body = SessionView))
)]
pub async fn get_me(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let store = data.sessions.store_for(&auth.0).await?;
    let store = store.lock().await;
    Ok(HttpResponse::Ok().json(session_view(&store)))
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct CreateCardBody {
    pub name: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/cards",
    request_body = CreateCardBody,
    responses(
        (status = 201, description = "Card created", body = Card),
        (status = 400, description = "Empty name")
    )
)]
pub async fn create_card(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<CreateCardBody>,
) -> Result<HttpResponse, ApiError> {
    let store = data.sessions.store_for(&auth.0).await?;
    let mut store = store.lock().await;
    let card = store.create_card(&payload.name).await?;
    Ok(HttpResponse::Created().json(card))
}

#[utoipa::path(
    patch,
    path = "/api/v1/cards/{id}",
    params(("id" = Id, Path, description = "Card id")),
    request_body = UpdateCard,
    responses(
        (status = 200, description = "Card updated", body = Card),
        (status = 404, description = "Not found")
    )
)]
pub async fn update_card(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<UpdateCard>,
) -> Result<HttpResponse, ApiError> {
    let store = data.sessions.store_for(&auth.0).await?;
    let mut store = store.lock().await;
    store.switch_active_card(path.into_inner())?;
    let card = store.update_card(payload.into_inner()).await?;
    Ok(HttpResponse::Ok().json(card))
}

#[utoipa::path(
    delete,
    path = "/api/v1/cards/{id}",
    params(("id" = Id, Path, description = "Card id")),
    responses(
        (status = 204, description = "Card deleted"),
        (status = 409, description = "Last remaining card")
    )
)]
pub async fn delete_card(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let store = data.sessions.store_for(&auth.0).await?;
    let mut store = store.lock().await;
    store.delete_card(path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[utoipa::path(
    post,
    path = "/api/v1/cards/{id}/duplicate",
    params(("id" = Id, Path, description = "Card id")),
    responses((status = 201, description = "Card duplicated", body = Card))
)]
pub async fn duplicate_card(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let store = data.sessions.store_for(&auth.0).await?;
    let mut store = store.lock().await;
    let card = store.duplicate_card(path.into_inner()).await?;
    Ok(HttpResponse::Created().json(card))
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct AddLinkBody {
    pub platform: Platform,
    pub url: String,
    pub label: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/v1/cards/{id}/links",
    params(("id" = Id, Path, description = "Card id")),
    request_body = AddLinkBody,
    responses(
        (status = 201, description = "Link added", body = Link),
        (status = 400, description = "Unknown platform")
    )
)]
pub async fn add_link(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<AddLinkBody>,
) -> Result<HttpResponse, ApiError> {
    let store = data.sessions.store_for(&auth.0).await?;
    let mut store = store.lock().await;
    store.switch_active_card(path.into_inner())?;
    let body = payload.into_inner();
    let link = store.add_link(body.platform, body.url, body.label).await?;
    Ok(HttpResponse::Created().json(link))
}

#[utoipa::path(
    delete,
    path = "/api/v1/cards/{id}/links/{link_id}",
    params(
        ("id" = Id, Path, description = "Card id"),
        ("link_id" = Id, Path, description = "Link id")
    ),
    responses((status = 204, description = "Link removed"))
)]
pub async fn remove_link(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<(Id, Id)>,
) -> Result<HttpResponse, ApiError> {
    let (card_id, link_id) = path.into_inner();
    let store = data.sessions.store_for(&auth.0).await?;
    let mut store = store.lock().await;
    store.switch_active_card(card_id)?;
    store.remove_link(link_id).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct ConnectDomainBody {
    pub domain: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/cards/{id}/domain",
    params(("id" = Id, Path, description = "Card id")),
    request_body = ConnectDomainBody,
    responses(
        (status = 200, description = "Domain attached pending verification", body = Card),
        (status = 409, description = "Domain already in use")
    )
)]
pub async fn connect_domain(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<ConnectDomainBody>,
) -> Result<HttpResponse, ApiError> {
    let store = data.sessions.store_for(&auth.0).await?;
    let mut store = store.lock().await;
    store.switch_active_card(path.into_inner())?;
    let card = store.connect_domain(&payload.domain).await?;
    Ok(HttpResponse::Ok().json(card))
}

#[utoipa::path(
    post,
    path = "/api/v1/cards/{id}/domain/verify",
    params(("id" = Id, Path, description = "Card id")),
    responses((status = 200, description = "Verification attempted", body = Card))
)]
pub async fn verify_domain(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let store = data.sessions.store_for(&auth.0).await?;
    let mut store = store.lock().await;
    store.switch_active_card(path.into_inner())?;
    let card = store.verify_domain(data.resolver.as_ref()).await?;
    Ok(HttpResponse::Ok().json(card))
}

#[utoipa::path(
    delete,
    path = "/api/v1/cards/{id}/domain",
    params(("id" = Id, Path, description = "Card id")),
    responses((status = 200, description = "Domain removed", body = Card))
)]
pub async fn remove_domain(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let store = data.sessions.store_for(&auth.0).await?;
    let mut store = store.lock().await;
    store.switch_active_card(path.into_inner())?;
    let card = store.remove_domain().await?;
    Ok(HttpResponse::Ok().json(card))
}

#[derive(Deserialize)]
pub struct AnalyticsQuery {
    pub range: Option<String>,
}

fn range_start(range: Option<&str>) -> Result<chrono::DateTime<Utc>, ApiError> {
    let now = Utc::now();
    match range.unwrap_or("30d") {
        "7d" => Ok(now - Duration::days(7)),
        "30d" => Ok(now - Duration::days(30)),
        "90d" => Ok(now - Duration::days(90)),
        "all" => Ok(Utc.timestamp_opt(0, 0).single().unwrap_or(now)),
        other => Err(ApiError::BadRequest(format!("unknown range: {other}"))),
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/cards/{id}/analytics",
    params(
        ("id" = Id, Path, description = "Card id"),
        ("range" = Option<String>, Query, description = "7d | 30d | 90d | all (default 30d)")
    ),
    responses((status = 200, description = "Aggregated analytics", body = AnalyticsSummary))
)]
pub async fn card_analytics(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    query: web::Query<AnalyticsQuery>,
) -> Result<HttpResponse, ApiError> {
    let card_id = path.into_inner();
    let store = data.sessions.store_for(&auth.0).await?;
    {
        // Ownership check only; reads must not move the active selection.
        let store = store.lock().await;
        store.card(card_id)?;
    }
    let from = range_start(query.range.as_deref())?;
    let to = Utc::now();
    let views = data.repo.views_between(card_id, from, to).await?;
    let clicks = data.repo.clicks_between(card_id, from, to).await?;
    let total_views = data.repo.total_views(card_id).await?;
    let total_clicks = data.repo.total_clicks(card_id).await?;
    let summary =
        AnalyticsSummary::compute(&views, &clicks, total_views, total_clicks, DEFAULT_TOP_LINKS);
    Ok(HttpResponse::Ok().json(summary))
}

#[utoipa::path(
    get,
    path = "/api/v1/cards/{id}/contacts",
    params(("id" = Id, Path, description = "Card id")),
    responses((status = 200, description = "Contact submissions, newest first", body = [ContactSubmission]))
)]
pub async fn list_contacts(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let card_id = path.into_inner();
    let store = data.sessions.store_for(&auth.0).await?;
    {
        let store = store.lock().await;
        store.card(card_id)?;
    }
    let submissions = data.repo.list_submissions(card_id).await?;
    Ok(HttpResponse::Ok().json(submissions))
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct GenerateCreatorBody {
    pub channel: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/creator-card",
    request_body = GenerateCreatorBody,
    responses(
        (status = 201, description = "Creator card generated", body = CreatorCard),
        (status = 409, description = "A generation is already running"),
        (status = 502, description = "Channel lookup failed"),
        (status = 503, description = "Lookup not configured")
    )
)]
pub async fn generate_creator_card(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<GenerateCreatorBody>,
) -> Result<HttpResponse, ApiError> {
    let _generation = data.sessions.begin_generation(&auth.0.sub)?;
    let store = data.sessions.store_for(&auth.0).await?;
    let mut store = store.lock().await;
    let card = store
        .generate_creator_card(&payload.channel, data.channel_lookup.as_ref())
        .await?;
    Ok(HttpResponse::Created().json(card))
}

#[utoipa::path(
    patch,
    path = "/api/v1/creator-card",
    request_body = UpdateCreatorCard,
    responses((status = 200, description = "Creator card updated", body = CreatorCard))
)]
pub async fn update_creator_card(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<UpdateCreatorCard>,
) -> Result<HttpResponse, ApiError> {
    let store = data.sessions.store_for(&auth.0).await?;
    let mut store = store.lock().await;
    let card = store.update_creator_settings(payload.into_inner()).await?;
    Ok(HttpResponse::Ok().json(card))
}

#[utoipa::path(
    delete,
    path = "/api/v1/creator-card",
    responses((status = 204, description = "Creator card removed"))
)]
pub async fn delete_creator_card(
    auth: Auth,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let store = data.sessions.store_for(&auth.0).await?;
    let mut store = store.lock().await;
    store.remove_creator_card().await?;
    Ok(HttpResponse::NoContent().finish())
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct BioResponse {
    pub bio: String,
    pub generated: bool,
}

#[utoipa::path(
    post,
    path = "/api/v1/bio",
    request_body = BioRequest,
    responses((status = 200, description = "Generated or fallback bio", body = BioResponse))
)]
pub async fn generate_bio(
    _auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<BioRequest>,
) -> Result<HttpResponse, ApiError> {
    match data.bio.generate(&payload).await {
        Ok(bio) => Ok(HttpResponse::Ok().json(BioResponse { bio, generated: true })),
        Err(e) => {
            tracing::warn!("bio generation failed, serving fallback: {e}");
            Ok(HttpResponse::Ok().json(BioResponse {
                bio: FALLBACK_BIO.to_string(),
                generated: false,
            }))
        }
    }
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct UploadResponse {
    pub url: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/media",
    responses(
        (status = 201, description = "Image stored", body = UploadResponse),
        (status = 400, description = "Not an allowed image type or too large")
    )
)]
pub async fn upload_media(
    _auth: Auth,
    data: web::Data<AppState>,
    mut payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let mut bytes: Vec<u8> = Vec::new();
    while let Ok(Some(mut field)) = payload.try_next().await {
        while let Ok(Some(chunk)) = field.try_next().await {
            if bytes.len() + chunk.len() > MAX_UPLOAD_BYTES {
                return Err(ApiError::BadRequest("file too large".into()));
            }
            bytes.extend_from_slice(&chunk);
        }
        if !bytes.is_empty() {
            break;
        }
    }
    if bytes.is_empty() {
        return Err(ApiError::BadRequest("empty upload".into()));
    }
    let url = data
        .media
        .put(&bytes)
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    Ok(HttpResponse::Created().json(UploadResponse { url }))
}

pub async fn get_media(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let (bytes, mime) = data
        .media
        .get(&path.into_inner())
        .await
        .map_err(|_| ApiError::NotFound)?;
    Ok(HttpResponse::Ok().content_type(mime).body(bytes))
}

#[utoipa::path(
    get,
    path = "/templates",
    tag = "public",
    responses((status = 200, description = "Template gallery, most used first", body = [Template]))
)]
pub async fn list_templates(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let templates = data.repo.list_templates().await?;
    Ok(HttpResponse::Ok().json(templates))
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct AdminUser {
    #[serde(flatten)]
    pub user: User,
    pub card_count: usize,
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/users",
    responses(
        (status = 200, description = "All users with card counts", body = [AdminUser]),
        (status = 403, description = "Admins only")
    )
)]
pub async fn admin_list_users(
    auth: Auth,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Admin);
    let users = data.repo.list_users().await?;
    let mut out = Vec::with_capacity(users.len());
    for user in users {
        let card_count = data.repo.list_cards(user.id).await?.len();
        out.push(AdminUser { user, card_count });
    }
    Ok(HttpResponse::Ok().json(out))
}

// ---------------- Public card surface ----------------

#[derive(Serialize, utoipa::ToSchema)]
pub struct PublicLink {
    pub id: Id,
    pub platform: Platform,
    pub label: String,
    pub url: String,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct PublicCard {
    pub id: Id,
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
    pub links: Vec<PublicLink>,
}

#[utoipa::path(
    get,
    path = "/p/{card_id}",
    params(("card_id" = Id, Path, description = "Card id")),
    responses(
        (status = 200, description = "Public card view", body = PublicCard),
        (status = 404, description = "Unknown or deactivated card")
    )
)]
pub async fn public_card(
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let card = data
        .repo
        .get_card(path.into_inner())
        .await
        .map_err(|_| ApiError::NotFound)?;
    // Deactivated cards are indistinguishable from unknown ids.
    if !card.is_active {
        return Err(ApiError::NotFound);
    }
    let links = data
        .repo
        .list_links(card.id)
        .await?
        .into_iter()
        .map(|l| PublicLink {
            id: l.id,
            platform: l.platform,
            label: l.label.unwrap_or_else(|| l.platform.label().to_string()),
            url: l.url,
        })
        .collect();
    Ok(HttpResponse::Ok().json(PublicCard {
        id: card.id,
        display_name: card.display_name,
        title: card.title,
        bio: card.bio,
        company: card.company,
        location: card.location,
        email: card.email,
        phone: card.phone,
        avatar_url: card.avatar_url,
        cover_url: card.cover_url,
        theme: card.theme,
        links,
    }))
}

/// Salted one-way hash; the raw address never reaches storage.
fn hash_ip(salt: &str, ip: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(ip.as_bytes());
    hex::encode(hasher.finalize())
}

fn visitor_hash(data: &AppState, req: &HttpRequest) -> Option<String> {
    req.connection_info()
        .realip_remote_addr()
        .map(|ip| hash_ip(&data.ip_salt, ip))
}

fn header_string(req: &HttpRequest, name: &str) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

#[utoipa::path(
    post,
    path = "/p/{card_id}/view",
    params(("card_id" = Id, Path, description = "Card id")),
    responses((status = 202, description = "View accepted"))
)]
pub async fn track_view(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let event = ViewEvent {
        card_id: path.into_inner(),
        ip_hash: visitor_hash(data.get_ref(), &req),
        user_agent: header_string(&req, "user-agent"),
        referer: header_string(&req, "referer"),
        country: header_string(&req, "cf-ipcountry"),
        city: None,
        viewed_at: Utc::now(),
    };
    // Tracking is best-effort; failures are logged, never surfaced.
    if let Err(e) = data.repo.record_view(event).await {
        tracing::warn!("failed to record view: {e}");
    }
    Ok(HttpResponse::Accepted().finish())
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct ClickBody {
    pub platform: Platform,
    pub link_id: Option<Id>,
    pub url: Option<String>,
}

#[utoipa::path(
    post,
    path = "/p/{card_id}/click",
    params(("card_id" = Id, Path, description = "Card id")),
    request_body = ClickBody,
    responses(
        (status = 202, description = "Click accepted"),
        (status = 400, description = "Unknown platform")
    )
)]
pub async fn track_click(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<ClickBody>,
) -> Result<HttpResponse, ApiError> {
    let body = payload.into_inner();
    let event = ClickEvent {
        card_id: path.into_inner(),
        link_id: body.link_id,
        platform: body.platform,
        ip_hash: visitor_hash(data.get_ref(), &req),
        link_url: body.url,
        clicked_at: Utc::now(),
    };
    if let Err(e) = data.repo.record_click(event).await {
        tracing::warn!("failed to record click: {e}");
    }
    Ok(HttpResponse::Accepted().finish())
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct ContactBody {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub message: String,
}

#[utoipa::path(
    post,
    path = "/p/{card_id}/contact",
    params(("card_id" = Id, Path, description = "Card id")),
    request_body = ContactBody,
    responses(
        (status = 201, description = "Submission stored"),
        (status = 400, description = "Missing required fields")
    )
)]
pub async fn submit_contact(
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<ContactBody>,
) -> Result<HttpResponse, ApiError> {
    let body = payload.into_inner();
    if body.name.trim().is_empty() || body.email.trim().is_empty() || body.message.trim().is_empty()
    {
        return Err(ApiError::BadRequest("name, email and message are required".into()));
    }
    let card_id = path.into_inner();
    let card = data.repo.get_card(card_id).await.map_err(|_| ApiError::NotFound)?;
    if !card.is_active {
        return Err(ApiError::NotFound);
    }
    let sub = data
        .repo
        .create_submission(NewContact {
            card_id,
            sender_name: body.name,
            sender_email: body.email,
            sender_phone: body.phone,
            message: body.message,
        })
        .await?;
    Ok(HttpResponse::Created().json(sub))
}

// ---------------- Signup webhook ----------------

#[utoipa::path(
    post,
    path = "/webhooks/signup",
    responses(
        (status = 200, description = "Event received"),
        (status = 401, description = "Missing or invalid signature")
    )
)]
pub async fn signup_webhook(
    req: HttpRequest,
    data: web::Data<AppState>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    if let Some(secret) = &data.webhook_secret {
        let sig = header_string(&req, "x-webhook-signature").ok_or(ApiError::Unauthorized)?;
        if !verify_signature(secret.as_bytes(), &body, &sig) {
            return Err(ApiError::Unauthorized);
        }
    }
    let event: SignupEvent = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("invalid payload: {e}")))?;
    if event.kind == "INSERT" {
        if let Some(record) = &event.record {
            if let (Some(mailer), Some(email)) = (&data.mailer, record.email.as_deref()) {
                if let Err(e) = mailer
                    .send_welcome(email, &record.display_name(), &record.provider())
                    .await
                {
                    tracing::warn!("welcome mail to {email} failed: {e}");
                }
            }
        }
    }
    Ok(HttpResponse::Ok().json(serde_json::json!({ "received": true })))
}
