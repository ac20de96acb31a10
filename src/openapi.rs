use crate::analytics::{AnalyticsSummary, DayCount, DeviceCount, HourCount, LinkCount};
use crate::models::{
    Card, ContactSubmission, CreatorCard, CreatorSettings, Link, Template, Theme, UpdateCard,
    UpdateCreatorCard, User,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::get_me,
        crate::routes::create_card,
        crate::routes::update_card,
        crate::routes::delete_card,
        crate::routes::duplicate_card,
        crate::routes::add_link,
        crate::routes::remove_link,
        crate::routes::connect_domain,
        crate::routes::verify_domain,
        crate::routes::remove_domain,
        crate::routes::card_analytics,
        crate::routes::list_contacts,
        crate::routes::generate_creator_card,
        crate::routes::update_creator_card,
        crate::routes::delete_creator_card,
        crate::routes::generate_bio,
        crate::routes::upload_media,
        crate::routes::list_templates,
        crate::routes::admin_list_users,
        crate::routes::public_card,
        crate::routes::track_view,
        crate::routes::track_click,
        crate::routes::submit_contact,
        crate::routes::signup_webhook,
    ),
    components(schemas(
        User, Card, UpdateCard, Link, Theme, CreatorCard, CreatorSettings, UpdateCreatorCard,
        ContactSubmission, Template,
        AnalyticsSummary, DayCount, DeviceCount, HourCount, LinkCount,
        crate::store::CardSnapshot,
        crate::routes::SessionView, crate::routes::CreateCardBody, crate::routes::AddLinkBody,
        crate::routes::ConnectDomainBody, crate::routes::GenerateCreatorBody,
        crate::routes::BioResponse, crate::routes::UploadResponse, crate::routes::AdminUser,
        crate::routes::PublicCard, crate::routes::PublicLink, crate::routes::ClickBody,
        crate::routes::ContactBody,
        crate::adapters::BioRequest,
    )),
    tags(
        (name = "cards", description = "Card operations"),
        (name = "analytics", description = "View and click aggregation"),
        (name = "public", description = "Public card pages and tracking"),
    )
)]
pub struct ApiDoc;
