use actix_web::{HttpResponse, Responder, web};
use serde::Deserialize;
use sqlx::MySqlPool;
use utoipa::ToSchema;
use validator::Validate;

use crate::auth::auth::AuthUser;
use crate::error::{AppError, is_unique_violation};
use crate::model::lookup::{Lookup, LookupItem};
use crate::models::display_name;
use crate::utils::lookup_cache;

#[derive(Deserialize, Validate, ToSchema)]
pub struct CreateLookup {
    #[validate(custom(function = "display_name"))]
    #[schema(example = "Finance")]
    pub name: String,
}

#[utoipa::path(
    get,
    path = "/api/v1/lookups/{kind}",
    params(("kind" = Lookup, Path, description = "department, site or position")),
    responses(
        (status = 200, description = "All entries, sorted by name", body = [LookupItem]),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Unknown lookup kind")
    ),
    security(("bearer_auth" = [])),
    tag = "Lookup"
)]
pub async fn list_lookup(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<Lookup>,
) -> Result<impl Responder, AppError> {
    let items = lookup_cache::items(pool.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(items.as_ref()))
}

#[utoipa::path(
    post,
    path = "/api/v1/lookups/{kind}",
    params(("kind" = Lookup, Path, description = "department, site or position")),
    request_body = CreateLookup,
    responses(
        (status = 201, description = "Entry created", body = LookupItem),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 409, description = "Name already exists"),
        (status = 422, description = "Invalid name")
    ),
    security(("bearer_auth" = [])),
    tag = "Lookup"
)]
pub async fn create_lookup(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<Lookup>,
    payload: web::Json<CreateLookup>,
) -> Result<impl Responder, AppError> {
    auth.require_hr_or_admin()?;
    let lookup = path.into_inner();
    payload.validate()?;

    let name = payload.name.trim().to_string();
    let result = sqlx::query(&format!("INSERT INTO {} (name) VALUES (?)", lookup.table()))
        .bind(&name)
        .execute(pool.get_ref())
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict(format!("{lookup} '{name}' already exists"))
            } else {
                e.into()
            }
        })?;

    lookup_cache::invalidate(lookup).await;

    let item = LookupItem {
        id: result.last_insert_id(),
        name,
    };
    tracing::info!(%lookup, id = item.id, by = auth.user_id, "Lookup entry created");
    Ok(HttpResponse::Created().json(item))
}
