use aide::axum::routing::ApiMethodRouter;
use axum::{
    Json,
    extract::{Query, State},
};
use phonebook_models::{ContactLookupQuery, ContactsResponse};

use crate::{
    api::ApiTag, auth::BasicAuth, contacts::lookup, errors::AppError, rate_limit::RateLimited,
    state::AppState,
};

pub fn route() -> ApiMethodRouter<AppState> {
    aide::axum::routing::get_with(handler, |op| {
        op.id("lookup_contact")
            .tag(ApiTag::Contacts.into())
            .summary("Look up contact")
            .description(
                "Find contacts whose business, mobile or home number contains the given \
                 number (spaces ignored), or whose e-mail address matches exactly",
            )
    })
}

async fn handler(
    State(state): State<AppState>,
    BasicAuth { username }: BasicAuth,
    _: RateLimited,
    Query(query): Query<ContactLookupQuery>,
) -> Result<Json<ContactsResponse>, AppError> {
    tracing::debug!("Contact lookup by '{username}': {query:?}");
    let response = lookup(
        state.directory.as_ref(),
        query.number.as_deref(),
        query.email.as_deref(),
    )
    .await?;

    Ok(Json(response))
}
