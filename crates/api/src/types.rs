//! Shared API type definitions.

use async_graphql::{EmptyMutation, EmptySubscription, Schema};
use axum::http::HeaderMap;

use vellum_core::error::DomainError;
use vellum_core::models::UserId;

use crate::schema::ListingQuery;

/// The GraphQL schema type.
pub type VellumSchema = Schema<ListingQuery, EmptyMutation, EmptySubscription>;

/// Header carrying the caller identity, set by the authenticating proxy.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Read the caller identity. A present but unparsable header is an error.
pub fn user_id_from_headers(headers: &HeaderMap) -> Result<Option<UserId>, DomainError> {
    let Some(value) = headers.get(USER_ID_HEADER) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| DomainError::InvalidFilter(format!("{} is not valid text", USER_ID_HEADER)))?;
    value.parse().map(Some)
}
