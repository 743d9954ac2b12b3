//! Opaque pagination cursors.
//!
//! A cursor remembers the edge row of a page: its sort value, `id` and
//! `source_type`, together with the sort configuration and the signature of
//! the filters it was minted under. Tokens are stateless; nothing is stored
//! server-side.
//!
//! Wire format: JSON payload, URL-safe base64 without padding. When a
//! signing key is configured the token is `payload.mac` where `mac` is an
//! HMAC-SHA256 of the encoded payload.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::CursorError;
use crate::models::SourceType;
use crate::ports::{KeysetPosition, OrderDirection, PageDirection, Sort, SortField, SortValue};

/// Current payload format.
pub const CURSOR_VERSION: u8 = 1;

/// Tokens longer than this are rejected before decoding.
pub const MAX_CURSOR_LENGTH: usize = 2048;

type HmacSha256 = Hmac<Sha256>;

/// Decoded cursor content.
#[derive(Debug, Clone, PartialEq)]
pub struct CursorFields {
    pub sort: Sort,
    pub direction: PageDirection,
    pub position: KeysetPosition,
    pub filter_signature: String,
}

impl CursorFields {
    /// Reject a cursor replayed under another sort or filter set.
    pub fn ensure_matches(&self, sort: Sort, filter_signature: &str) -> Result<(), CursorError> {
        if self.sort != sort {
            return Err(CursorError::SortMismatch {
                expected: sort.to_string(),
                found: self.sort.to_string(),
            });
        }
        if self.filter_signature != filter_signature {
            return Err(CursorError::FilterMismatch);
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct CursorPayload {
    v: u8,
    f: SortField,
    o: OrderDirection,
    d: PageDirection,
    k: SortValue,
    id: i64,
    st: SourceType,
    sig: String,
}

/// Encodes and decodes cursor tokens.
#[derive(Clone, Default)]
pub struct CursorCodec {
    signing_key: Option<Vec<u8>>,
}

impl std::fmt::Debug for CursorCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CursorCodec")
            .field("signed", &self.signing_key.is_some())
            .finish()
    }
}

impl CursorCodec {
    /// Unsigned codec.
    pub fn new() -> Self {
        Self::default()
    }

    /// Codec that signs every token and rejects unsigned or tampered ones.
    pub fn with_signing_key(key: impl Into<Vec<u8>>) -> Self {
        Self {
            signing_key: Some(key.into()),
        }
    }

    pub fn is_signed(&self) -> bool {
        self.signing_key.is_some()
    }

    pub fn encode(&self, fields: &CursorFields) -> Result<String, CursorError> {
        let payload = CursorPayload {
            v: CURSOR_VERSION,
            f: fields.sort.field,
            o: fields.sort.order,
            d: fields.direction,
            k: fields.position.value.clone(),
            id: fields.position.id,
            st: fields.position.source_type,
            sig: fields.filter_signature.clone(),
        };
        let json = serde_json::to_vec(&payload).map_err(|e| CursorError::Encoding(e.to_string()))?;
        let body = URL_SAFE_NO_PAD.encode(json);

        match &self.signing_key {
            None => Ok(body),
            Some(key) => {
                let mac = self.mac(key, body.as_bytes())?;
                Ok(format!("{}.{}", body, URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())))
            }
        }
    }

    pub fn decode(&self, token: &str) -> Result<CursorFields, CursorError> {
        if token.is_empty() {
            return Err(CursorError::Malformed("empty cursor".into()));
        }
        if token.len() > MAX_CURSOR_LENGTH {
            return Err(CursorError::Malformed(format!(
                "cursor exceeds {} characters",
                MAX_CURSOR_LENGTH
            )));
        }

        let body = match (&self.signing_key, token.split_once('.')) {
            (Some(key), Some((body, mac))) => {
                let mac = URL_SAFE_NO_PAD
                    .decode(mac)
                    .map_err(|_| CursorError::BadSignature)?;
                self.mac(key, body.as_bytes())?
                    .verify_slice(&mac)
                    .map_err(|_| CursorError::BadSignature)?;
                body
            }
            (Some(_), None) => return Err(CursorError::BadSignature),
            (None, Some(_)) => {
                return Err(CursorError::Malformed("unexpected cursor signature".into()));
            }
            (None, None) => token,
        };

        let json = URL_SAFE_NO_PAD
            .decode(body)
            .map_err(|e| CursorError::Malformed(format!("invalid base64: {}", e)))?;
        let payload: CursorPayload = serde_json::from_slice(&json)
            .map_err(|e| CursorError::Malformed(format!("invalid payload: {}", e)))?;

        if payload.v != CURSOR_VERSION {
            return Err(CursorError::UnsupportedVersion(payload.v));
        }
        if !payload.f.accepts(&payload.k) {
            return Err(CursorError::InvalidValue(format!(
                "{:?} is not a valid {} value",
                payload.k,
                payload.f.as_str()
            )));
        }

        Ok(CursorFields {
            sort: Sort::new(payload.f, payload.o),
            direction: payload.d,
            position: KeysetPosition {
                value: payload.k,
                id: payload.id,
                source_type: payload.st,
            },
            filter_signature: payload.sig,
        })
    }

    fn mac(&self, key: &[u8], data: &[u8]) -> Result<HmacSha256, CursorError> {
        let mut mac =
            HmacSha256::new_from_slice(key).map_err(|e| CursorError::Encoding(e.to_string()))?;
        mac.update(data);
        Ok(mac)
    }
}
