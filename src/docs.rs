use std::sync::Arc;

use axum::{routing::get, Json, Router};
use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::authz::{PermissionLevel, UserPermissionRecord};
use crate::models;
use crate::routes;

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::health::health,
        routes::profile::get_user_profile,
        routes::users::list_users,
        routes::users::create_user,
        routes::users::update_user,
        routes::roles::list_roles,
        routes::roles::create_role,
        routes::roles::update_role,
        routes::roles::delete_role,
        routes::modules::list_modules,
        routes::banner::proxy,
    ),
    components(
        schemas(
            models::user::User,
            models::user::UserWithRole,
            models::user::UserStatus,
            models::user::UserCreateRequest,
            models::user::UserUpdateRequest,
            models::role::Role,
            models::role::RoleWithPermissions,
            models::role::RolePermissionEntry,
            models::role::PermissionGrant,
            models::role::RoleCreateRequest,
            models::role::RoleUpdateRequest,
            models::module::Module,
            UserPermissionRecord,
            PermissionLevel
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Liveness"),
        (name = "Users & Roles", description = "Identity and role administration"),
        (name = "Banner", description = "Proxied Banner data routes")
    )
)]
pub struct ApiDoc;

/// Registers the `X-User-Token` header as the API's security scheme so the
/// Swagger Authorize dialog sends it on every Try-it-out call.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "userToken",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("X-User-Token"))),
            );
        }
    }
}

pub fn swagger_routes(doc: utoipa::openapi::OpenApi) -> Router {
    let swagger_config = utoipa_swagger_ui::Config::new(["/api-docs/openapi.json"])
        .try_it_out_enabled(true)
        .with_credentials(true)
        .persist_authorization(true);

    let doc_json = Arc::new(serde_json::to_value(&doc).unwrap_or_default());

    let json_route = {
        let doc_json = Arc::clone(&doc_json);
        get(move || {
            let doc_json = Arc::clone(&doc_json);
            async move { Json((*doc_json).clone()) }
        })
    };

    Router::new()
        .route("/api-docs/openapi.json", json_route)
        .merge(SwaggerUi::new("/docs").config(swagger_config))
}
