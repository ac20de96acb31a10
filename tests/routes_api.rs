#![cfg(feature = "inmem-store")]

use std::sync::Arc;

use actix_web::{test, App};
use async_trait::async_trait;
use serial_test::serial;

use tapdeck::adapters::{AdapterError, BioGenerator, BioRequest, ChannelData, ChannelLookup};
use tapdeck::auth::{create_jwt, Role};
use tapdeck::domain::{DomainResolver, ResolveError};
use tapdeck::media::FsMediaStore;
use tapdeck::repo::inmem::InMemRepo;
use tapdeck::routes::{config, AppState, SessionRegistry};
use tapdeck::security::SecurityHeaders;
use tapdeck::webhook::sign;

const WEBHOOK_SECRET: &str = "route-test-webhook-secret";

// Helper to ensure JWT secret present & unique temp dirs per test
fn setup_env() {
    std::env::set_var("JWT_SECRET", "test-secret-must-be-32-bytes-long!!");
    let tmp = tempfile::tempdir().unwrap();
    std::env::set_var("TAPDECK_DATA_DIR", tmp.path().to_str().unwrap());
    let media = tempfile::tempdir().unwrap();
    std::env::set_var("TAPDECK_MEDIA_DIR", media.path().to_str().unwrap());
}

fn user_token() -> String {
    create_jwt("pat@example.com", "Pat", vec![Role::User]).unwrap()
}

fn other_token() -> String {
    create_jwt("sam@example.com", "Sam", vec![Role::User]).unwrap()
}

fn admin_token() -> String {
    create_jwt("admin@example.com", "Admin", vec![Role::User, Role::Admin]).unwrap()
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
            description: Some("We build things.".into()),
            logo_url: Some("https://img.example/logo.png".into()),
            banner_url: None,
            location: Some("Berlin".into()),
        })
    }
}

struct FailingBio;

#[async_trait]
impl BioGenerator for FailingBio {
    async fn generate(&self, _req: &BioRequest) -> Result<String, AdapterError> {
        Err(AdapterError::NotConfigured)
    }
}

struct EmptyResolver;

#[async_trait]
impl DomainResolver for EmptyResolver {
    async fn txt_records(&self, _name: &str) -> Result<Vec<String>, ResolveError> {
        Ok(vec![])
    }
}

fn state() -> AppState {
    let repo: Arc<dyn tapdeck::repo::Repo> = Arc::new(InMemRepo::new());
    AppState {
        sessions: Arc::new(SessionRegistry::new(repo.clone())),
        repo,
        media: Arc::new(FsMediaStore::from_env().unwrap()),
        channel_lookup: Arc::new(FakeLookup),
        bio: Arc::new(FailingBio),
        resolver: Arc::new(EmptyResolver),
        mailer: None,
        webhook_secret: Some(WEBHOOK_SECRET.to_string()),
        ip_salt: "test-salt".into(),
    }
}

macro_rules! test_app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .wrap(SecurityHeaders::from_env())
                .app_data(actix_web::web::Data::new($state))
                .configure(config),
        )
        .await
    };
}

async fn json_body(resp: actix_web::dev::ServiceResponse) -> serde_json::Value {
    serde_json::from_slice(&test::read_body(resp).await).unwrap()
}

#[actix_web::test]
#[serial]
async fn me_bootstraps_a_default_card() {
    setup_env();
    let app = test_app!(state());

    let req = test::TestRequest::get().uri("/api/v1/me").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);

    let req = test::TestRequest::get()
        .uri("/api/v1/me")
        .insert_header(("Authorization", format!("Bearer {}", user_token())))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let me = json_body(resp).await;
    assert_eq!(me["user"]["email"], "pat@example.com");
    assert_eq!(me["cards"].as_array().unwrap().len(), 1);
    assert_eq!(me["cards"][0]["display_name"], "Pat");
    assert!(me["creator_card"].is_null());
}

#[actix_web::test]
#[serial]
async fn card_lifecycle_over_http() {
    setup_env();
    let app = test_app!(state());
    let token = user_token();

    let req = test::TestRequest::get()
        .uri("/api/v1/me")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .to_request();
    let me = json_body(test::call_service(&app, req).await).await;
    let first_id = me["active_card_id"].as_i64().unwrap();

    // create a second card
    let req = test::TestRequest::post()
        .uri("/api/v1/cards")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .set_json(serde_json::json!({"name": "Side Hustle"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let card = json_body(resp).await;
    let second_id = card["id"].as_i64().unwrap();

    // blank name rejected
    let req = test::TestRequest::post()
        .uri("/api/v1/cards")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .set_json(serde_json::json!({"name": "   "}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);

    // partial update
    let req = test::TestRequest::patch()
        .uri(&format!("/api/v1/cards/{second_id}"))
        .insert_header(("Authorization", format!("Bearer {token}")))
        .set_json(serde_json::json!({"title": "Founder"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let updated = json_body(resp).await;
    assert_eq!(updated["title"], "Founder");
    assert_eq!(updated["display_name"], "Side Hustle");

    // another user cannot touch it
    let req = test::TestRequest::patch()
        .uri(&format!("/api/v1/cards/{second_id}"))
        .insert_header(("Authorization", format!("Bearer {}", other_token())))
        .set_json(serde_json::json!({"title": "Hijacked"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);

    // links
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/cards/{second_id}/links"))
        .insert_header(("Authorization", format!("Bearer {token}")))
        .set_json(serde_json::json!({"platform": "github", "url": "https://github.com/pat"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let link = json_body(resp).await;

    // unknown platform is rejected at the serde boundary
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/cards/{second_id}/links"))
        .insert_header(("Authorization", format!("Bearer {token}")))
        .set_json(serde_json::json!({"platform": "myspace", "url": "https://myspace.com/pat"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);

    let req = test::TestRequest::delete()
        .uri(&format!("/api/v1/cards/{second_id}/links/{}", link["id"]))
        .insert_header(("Authorization", format!("Bearer {token}")))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 204);

    // duplicate
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/cards/{first_id}/duplicate"))
        .insert_header(("Authorization", format!("Bearer {token}")))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let copy = json_body(resp).await;
    assert_eq!(copy["display_name"], "Pat (Copy)");

    // delete down to one card, then hit the guard
    for id in [second_id, copy["id"].as_i64().unwrap()] {
        let req = test::TestRequest::delete()
            .uri(&format!("/api/v1/cards/{id}"))
            .insert_header(("Authorization", format!("Bearer {token}")))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 204);
    }
    let req = test::TestRequest::delete()
        .uri(&format!("/api/v1/cards/{first_id}"))
        .insert_header(("Authorization", format!("Bearer {token}")))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 409);
}

#[actix_web::test]
#[serial]
async fn public_view_tracking_and_analytics() {
    setup_env();
    let app = test_app!(state());
    let token = user_token();

    let req = test::TestRequest::get()
        .uri("/api/v1/me")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .to_request();
    let me = json_body(test::call_service(&app, req).await).await;
    let card_id = me["active_card_id"].as_i64().unwrap();

    // unknown card id is a 404
    let req = test::TestRequest::get().uri("/p/424242").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);

    // public card page needs no auth
    let req = test::TestRequest::get().uri(&format!("/p/{card_id}")).to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let public = json_body(resp).await;
    assert_eq!(public["display_name"], "Pat");
    assert!(public.get("custom_domain").is_none());

    // track two views and a click
    for _ in 0..2 {
        let req = test::TestRequest::post()
            .uri(&format!("/p/{card_id}/view"))
            .insert_header(("user-agent", "Mozilla/5.0 (iPhone) Mobile Safari"))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 202);
    }
    let req = test::TestRequest::post()
        .uri(&format!("/p/{card_id}/click"))
        .set_json(serde_json::json!({"platform": "github", "url": "https://github.com/pat"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 202);

    // aggregated analytics for the owner
    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/cards/{card_id}/analytics?range=7d"))
        .insert_header(("Authorization", format!("Bearer {token}")))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let summary = json_body(resp).await;
    assert_eq!(summary["total_views"], 2);
    assert_eq!(summary["total_clicks"], 1);
    assert_eq!(summary["click_through_rate"], 50.0);
    assert_eq!(summary["device_breakdown"][0]["device"], "mobile");
    assert_eq!(summary["top_links"][0]["url"], "https://github.com/pat");

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/cards/{card_id}/analytics?range=yesterday"))
        .insert_header(("Authorization", format!("Bearer {token}")))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);

    // a stranger cannot read analytics
    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/cards/{card_id}/analytics"))
        .insert_header(("Authorization", format!("Bearer {}", other_token())))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);
}

#[actix_web::test]
#[serial]
async fn contact_form_validation_and_listing() {
    setup_env();
    let app = test_app!(state());
    let token = user_token();

    let req = test::TestRequest::get()
        .uri("/api/v1/me")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .to_request();
    let me = json_body(test::call_service(&app, req).await).await;
    let card_id = me["active_card_id"].as_i64().unwrap();

    let req = test::TestRequest::post()
        .uri(&format!("/p/{card_id}/contact"))
        .set_json(serde_json::json!({"name": "", "email": "v@example.com", "message": "hi"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);

    let req = test::TestRequest::post()
        .uri(&format!("/p/{card_id}/contact"))
        .set_json(serde_json::json!({
            "name": "Visitor", "email": "v@example.com", "message": "Let's talk"
        }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 201);

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/cards/{card_id}/contacts"))
        .insert_header(("Authorization", format!("Bearer {token}")))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let subs = json_body(resp).await;
    assert_eq!(subs.as_array().unwrap().len(), 1);
    assert_eq!(subs[0]["sender_name"], "Visitor");
}

#[actix_web::test]
#[serial]
async fn creator_card_and_bio_fallback() {
    setup_env();
    let app = test_app!(state());
    let token = user_token();

    let req = test::TestRequest::post()
        .uri("/api/v1/creator-card")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .set_json(serde_json::json!({"channel": "@makerlab"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let creator = json_body(resp).await;
    assert_eq!(creator["channel_name"], "Maker Lab");
    assert_eq!(creator["location"], "Berlin");

    let req = test::TestRequest::patch()
        .uri("/api/v1/creator-card")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .set_json(serde_json::json!({"settings": {"theme": "red", "show_subscribers": false, "show_videos": true}}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let updated = json_body(resp).await;
    assert_eq!(updated["settings"]["theme"], "red");
    assert_eq!(updated["settings"]["show_subscribers"], false);

    let req = test::TestRequest::delete()
        .uri("/api/v1/creator-card")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 204);

    // bio generator is unconfigured in this app: fallback, still 200
    let req = test::TestRequest::post()
        .uri("/api/v1/bio")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .set_json(serde_json::json!({"name": "Pat", "role": "Engineer"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let bio = json_body(resp).await;
    assert_eq!(bio["generated"], false);
    assert!(bio["bio"].as_str().unwrap().contains("professional"));
}

#[actix_web::test]
#[serial]
async fn admin_listing_requires_the_admin_role() {
    setup_env();
    let app = test_app!(state());

    // seed one regular user
    let req = test::TestRequest::get()
        .uri("/api/v1/me")
        .insert_header(("Authorization", format!("Bearer {}", user_token())))
        .to_request();
    assert!(test::call_service(&app, req).await.status().is_success());

    let req = test::TestRequest::get()
        .uri("/api/v1/admin/users")
        .insert_header(("Authorization", format!("Bearer {}", user_token())))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 403);

    let req = test::TestRequest::get()
        .uri("/api/v1/admin/users")
        .insert_header(("Authorization", format!("Bearer {}", admin_token())))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let users = json_body(resp).await;
    assert_eq!(users.as_array().unwrap().len(), 1);
    assert_eq!(users[0]["email"], "pat@example.com");
    assert_eq!(users[0]["card_count"], 1);
}

#[actix_web::test]
#[serial]
async fn template_gallery_is_public() {
    setup_env();
    let app = test_app!(state());

    let req = test::TestRequest::get().uri("/templates").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let templates = json_body(resp).await;
    assert!(!templates.as_array().unwrap().is_empty());
}

#[actix_web::test]
#[serial]
async fn analytics_reads_leave_the_selection_alone() {
    setup_env();
    let app = test_app!(state());
    let token = user_token();

    let req = test::TestRequest::get()
        .uri("/api/v1/me")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .to_request();
    let me = json_body(test::call_service(&app, req).await).await;
    let first_id = me["active_card_id"].as_i64().unwrap();

    // a new card takes over the selection
    let req = test::TestRequest::post()
        .uri("/api/v1/cards")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .set_json(serde_json::json!({"name": "Second"}))
        .to_request();
    let second = json_body(test::call_service(&app, req).await).await;
    let second_id = second["id"].as_i64().unwrap();

    // reading the first card's analytics and contacts is not a switch
    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/cards/{first_id}/analytics"))
        .insert_header(("Authorization", format!("Bearer {token}")))
        .to_request();
    assert!(test::call_service(&app, req).await.status().is_success());
    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/cards/{first_id}/contacts"))
        .insert_header(("Authorization", format!("Bearer {token}")))
        .to_request();
    assert!(test::call_service(&app, req).await.status().is_success());

    let req = test::TestRequest::get()
        .uri("/api/v1/me")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .to_request();
    let me = json_body(test::call_service(&app, req).await).await;
    assert_eq!(me["active_card_id"].as_i64().unwrap(), second_id);
}

// `use actix_web::test` shadows the built-in #[test] attribute, so qualify it.
#[std::prelude::v1::test]
#[serial]
fn creator_generation_is_single_flight_per_user() {
    setup_env();
    let registry = SessionRegistry::new(Arc::new(InMemRepo::new()));

    let guard = registry.begin_generation("pat@example.com").unwrap();
    assert!(registry.begin_generation("pat@example.com").is_err());
    // other users are unaffected
    assert!(registry.begin_generation("sam@example.com").is_ok());

    drop(guard);
    assert!(registry.begin_generation("pat@example.com").is_ok());
}

#[actix_web::test]
#[serial]
async fn signup_webhook_enforces_the_signature() {
    setup_env();
    let app = test_app!(state());

    let payload = serde_json::json!({
        "type": "INSERT",
        "record": {"email": "new@example.com", "raw_user_meta_data": {"name": "New User"}}
    })
    .to_string();

    // missing signature
    let req = test::TestRequest::post()
        .uri("/webhooks/signup")
        .insert_header(("content-type", "application/json"))
        .set_payload(payload.clone())
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);

    // wrong signature
    let req = test::TestRequest::post()
        .uri("/webhooks/signup")
        .insert_header(("content-type", "application/json"))
        .insert_header(("x-webhook-signature", sign(b"some-other-secret", payload.as_bytes())))
        .set_payload(payload.clone())
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);

    // valid signature (no mailer configured; still acknowledged)
    let req = test::TestRequest::post()
        .uri("/webhooks/signup")
        .insert_header(("content-type", "application/json"))
        .insert_header((
            "x-webhook-signature",
            sign(WEBHOOK_SECRET.as_bytes(), payload.as_bytes()),
        ))
        .set_payload(payload)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let ack = json_body(resp).await;
    assert_eq!(ack["received"], true);
}
