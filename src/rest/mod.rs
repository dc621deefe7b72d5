//! Typed REST wrappers over the middleware stack.
//!
//! Each submodule groups one facade category (public, account, trading,
//! wallet). Every operation here: validates inputs, builds an
//! [`HttpRequest`] tagged with the right [`RateLimitScope`], runs it through
//! the [`MiddlewareStack`], and maps a non-2xx body into [`Error::Domain`],
//! so callers never see a raw [`HttpResponse`] or transport error.

pub mod account;
pub mod public;
pub mod trading;
pub mod wallet;

use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::error::Error;
use crate::middleware::transport::HttpRequest;
use crate::middleware::MiddlewareStack;
use crate::models::WireErrorBody;

/// Runs `request` through `stack` and decodes a successful JSON body as
/// `T`; a non-2xx response is mapped to [`Error::Domain`] (falling back to
/// [`Error::Unknown`] if the body isn't the expected error shape).
pub(crate) async fn execute_json<T: DeserializeOwned>(stack: &MiddlewareStack, request: HttpRequest) -> Result<T, Error> {
    let response = stack.execute(request).await?;
    if response.is_success() {
        return response.json::<T>().map_err(Error::from);
    }
    match response.json::<WireErrorBody>() {
        Ok(body) => Err(Error::Domain {
            code: body.code,
            status: response.status,
            message: body.message,
        }),
        Err(_) => Err(Error::Unknown(format!("unexpected http {} with unrecognized error body", response.status))),
    }
}

/// As [`execute_json`], but for endpoints with no response body worth
/// decoding (e.g. `DELETE order`).
pub(crate) async fn execute_empty(stack: &MiddlewareStack, request: HttpRequest) -> Result<(), Error> {
    let response = stack.execute(request).await?;
    if response.is_success() {
        return Ok(());
    }
    match response.json::<WireErrorBody>() {
        Ok(body) => Err(Error::Domain {
            code: body.code,
            status: response.status,
            message: body.message,
        }),
        Err(_) => Err(Error::Unknown(format!("unexpected http {} with unrecognized error body", response.status))),
    }
}

pub(crate) fn require_non_empty(field: &str, value: &str) -> Result<(), Error> {
    if value.trim().is_empty() {
        return Err(Error::validation(format!("{field} must not be empty")));
    }
    Ok(())
}

/// Shared handle every REST group wraps: the middleware stack plus the
/// configured base URL.
#[derive(Clone)]
pub(crate) struct RestContext {
    pub stack: Arc<MiddlewareStack>,
    pub base_url: String,
}

impl RestContext {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}
