pub mod alerts;
pub mod dashboard;
pub mod glucose;

use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::borrow::Cow;

/// Payload attached to an outbound request.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestData<T> {
    Empty,
    Query(T),
    Json(T),
}

/// A typed backend endpoint.
///
/// Implementors describe the path, method and payload; the transport that
/// actually sends them (and attaches credentials) lives in `gluco-auth`.
pub trait Endpoint {
    type Data: Serialize;
    type Response: DeserializeOwned;

    fn method(&self) -> Method {
        Method::GET
    }

    fn endpoint(&self) -> Cow<'_, str>;

    fn data(&self) -> RequestData<&Self::Data>;
}

/// Query-less, body-less marker payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct NoData;
