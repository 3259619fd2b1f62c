//! Contact API handlers
//!
//! Every handler runs behind the authentication gate. All operations are
//! scoped to the caller except `list_all_contacts`, which is additionally
//! role-gated at the route.

use crate::auth::CurrentUser;
use crate::error::AppError;
use crate::extract::{JsonBody, PathParam, QueryParams};
use crate::state::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use contacts_core::{Contact, ContactDraft, ContactQuery};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

/// Create contact request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct ContactBody {
    #[validate(length(min = 3, max = 50))]
    pub name: String,
    #[validate(length(min = 3, max = 50))]
    pub lastname: String,
    #[validate(email, length(max = 255))]
    pub email: String,
    #[validate(length(min = 7, max = 50))]
    pub phone: String,
    pub birthdate: NaiveDate,
    #[validate(length(min = 5, max = 250))]
    pub others_info: Option<String>,
    #[serde(default)]
    pub completed: bool,
}

impl From<ContactBody> for ContactDraft {
    fn from(body: ContactBody) -> Self {
        Self {
            name: body.name,
            lastname: body.lastname,
            email: body.email,
            phone: body.phone,
            birthdate: body.birthdate,
            others_info: body.others_info,
            completed: body.completed,
        }
    }
}

/// Full contact update; `completed` must be given explicitly
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct ContactUpdateBody {
    #[validate(length(min = 3, max = 50))]
    pub name: String,
    #[validate(length(min = 3, max = 50))]
    pub lastname: String,
    #[validate(email, length(max = 255))]
    pub email: String,
    #[validate(length(min = 7, max = 50))]
    pub phone: String,
    pub birthdate: NaiveDate,
    #[validate(length(min = 5, max = 250))]
    pub others_info: Option<String>,
    pub completed: bool,
}

impl From<ContactUpdateBody> for ContactDraft {
    fn from(body: ContactUpdateBody) -> Self {
        Self {
            name: body.name,
            lastname: body.lastname,
            email: body.email,
            phone: body.phone,
            birthdate: body.birthdate,
            others_info: body.others_info,
            completed: body.completed,
        }
    }
}

/// Contact as returned by the API
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ContactResponse {
    pub id: i64,
    pub name: String,
    pub lastname: String,
    pub email: String,
    pub phone: String,
    pub birthdate: NaiveDate,
    pub others_info: Option<String>,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Contact> for ContactResponse {
    fn from(contact: Contact) -> Self {
        Self {
            id: contact.id,
            name: contact.name,
            lastname: contact.lastname,
            email: contact.email,
            phone: contact.phone,
            birthdate: contact.birthdate,
            others_info: contact.others_info,
            completed: contact.completed,
            created_at: contact.created_at,
            updated_at: contact.updated_at,
        }
    }
}

/// Pagination and search parameters
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListParams {
    /// Page size, 10 to 500 (default 10)
    pub limit: Option<i64>,
    /// Rows to skip (default 0)
    pub offset: Option<i64>,
    /// Case-insensitive match on name, lastname or email
    pub query: Option<String>,
}

impl TryFrom<ListParams> for ContactQuery {
    type Error = AppError;

    fn try_from(params: ListParams) -> Result<Self, Self::Error> {
        Ok(ContactQuery::new(params.limit, params.offset, params.query)?)
    }
}

fn contact_id(id: i64) -> Result<i64, AppError> {
    if id < 1 {
        return Err(AppError::Validation(
            "contact id must be greater than or equal to 1".to_string(),
        ));
    }
    Ok(id)
}

fn into_responses(contacts: Vec<Contact>) -> Vec<ContactResponse> {
    contacts.into_iter().map(ContactResponse::from).collect()
}

/// List the caller's contacts
#[utoipa::path(
    get,
    path = "/api/contacts",
    tag = "contacts",
    params(ListParams),
    responses(
        (status = 200, description = "Contacts owned by the caller", body = [ContactResponse]),
        (status = 400, description = "Invalid pagination", body = crate::error::ApiError),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_contacts(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    QueryParams(params): QueryParams<ListParams>,
) -> Result<impl IntoResponse, AppError> {
    let query = ContactQuery::try_from(params)?;
    let contacts = state.contacts.list_contacts(user.id, &query).await?;

    Ok(Json(into_responses(contacts)))
}

/// List every contact in the system (moderator or admin)
#[utoipa::path(
    get,
    path = "/api/contacts/all",
    tag = "contacts",
    params(ListParams),
    responses(
        (status = 200, description = "All contacts", body = [ContactResponse]),
        (status = 400, description = "Invalid pagination", body = crate::error::ApiError),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError),
        (status = 403, description = "Role not permitted", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_all_contacts(
    State(state): State<Arc<AppState>>,
    QueryParams(params): QueryParams<ListParams>,
) -> Result<impl IntoResponse, AppError> {
    let query = ContactQuery::try_from(params)?;
    let contacts = state.contacts.list_all(&query).await?;

    Ok(Json(into_responses(contacts)))
}

/// Get one of the caller's contacts
#[utoipa::path(
    get,
    path = "/api/contacts/{contact_id}",
    tag = "contacts",
    params(("contact_id" = i64, Path, description = "Contact ID")),
    responses(
        (status = 200, description = "Contact", body = ContactResponse),
        (status = 404, description = "Not found", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_contact(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    PathParam(id): PathParam<i64>,
) -> Result<impl IntoResponse, AppError> {
    let id = contact_id(id)?;
    let contact = state
        .contacts
        .get_contact(user.id, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Contact".to_string()))?;

    Ok(Json(ContactResponse::from(contact)))
}

/// Create a contact owned by the caller
#[utoipa::path(
    post,
    path = "/api/contacts",
    tag = "contacts",
    request_body = ContactBody,
    responses(
        (status = 201, description = "Contact created", body = ContactResponse),
        (status = 400, description = "Invalid input", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_contact(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    JsonBody(body): JsonBody<ContactBody>,
) -> Result<impl IntoResponse, AppError> {
    body.validate()?;
    let contact = state.contacts.create_contact(user.id, body.into()).await?;

    tracing::debug!(user_id = user.id, contact_id = contact.id, "Contact created");
    Ok((StatusCode::CREATED, Json(ContactResponse::from(contact))))
}

/// Replace every writable field of one of the caller's contacts
#[utoipa::path(
    put,
    path = "/api/contacts/{contact_id}",
    tag = "contacts",
    params(("contact_id" = i64, Path, description = "Contact ID")),
    request_body = ContactUpdateBody,
    responses(
        (status = 200, description = "Contact updated", body = ContactResponse),
        (status = 400, description = "Invalid input", body = crate::error::ApiError),
        (status = 404, description = "Not found", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_contact(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    PathParam(id): PathParam<i64>,
    JsonBody(body): JsonBody<ContactUpdateBody>,
) -> Result<impl IntoResponse, AppError> {
    let id = contact_id(id)?;
    body.validate()?;

    let contact = state
        .contacts
        .update_contact(user.id, id, body.into())
        .await?
        .ok_or_else(|| AppError::NotFound("Contact".to_string()))?;

    Ok(Json(ContactResponse::from(contact)))
}

/// Delete one of the caller's contacts
#[utoipa::path(
    delete,
    path = "/api/contacts/{contact_id}",
    tag = "contacts",
    params(("contact_id" = i64, Path, description = "Contact ID")),
    responses(
        (status = 204, description = "Contact deleted"),
        (status = 404, description = "Not found", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_contact(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    PathParam(id): PathParam<i64>,
) -> Result<impl IntoResponse, AppError> {
    let id = contact_id(id)?;
    state
        .contacts
        .delete_contact(user.id, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Contact".to_string()))?;

    tracing::debug!(user_id = user.id, contact_id = id, "Contact deleted");
    Ok(StatusCode::NO_CONTENT)
}
