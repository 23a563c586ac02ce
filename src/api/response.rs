//! Response envelope
//!
//! Every JSON response, success or failure, is wrapped as
//! `{code, bizErr, msg, data, meta: {requestId, timestamp}}`.

use axum::Json;
use axum::response::{IntoResponse, Response};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    pub request_id: String,
    pub timestamp: String,
}

impl Meta {
    fn now() -> Self {
        Self {
            request_id: ulid::Ulid::new().to_string(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub code: i32,
    #[serde(rename = "bizErr")]
    pub biz_err: String,
    pub msg: String,
    pub data: T,
    pub meta: Meta,
}

impl<T> Envelope<T> {
    pub fn new(code: i32, biz_err: &str, msg: impl Into<String>, data: T) -> Self {
        Self {
            code,
            biz_err: biz_err.to_string(),
            msg: msg.into(),
            data,
            meta: Meta::now(),
        }
    }

    /// `code: 0`, `bizErr: "OK"`
    pub fn success(data: T) -> Self {
        Self::new(0, "OK", "success", data)
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// Shorthand for a successful enveloped response
pub fn ok<T: Serialize>(data: T) -> Envelope<T> {
    Envelope::success(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_envelope_shape() {
        let value = serde_json::to_value(ok(serde_json::json!({"id": 1}))).unwrap();

        assert_eq!(value["code"], 0);
        assert_eq!(value["bizErr"], "OK");
        assert_eq!(value["msg"], "success");
        assert_eq!(value["data"]["id"], 1);
        assert_eq!(value["meta"]["requestId"].as_str().unwrap().len(), 26);
        assert!(value["meta"]["timestamp"].as_str().unwrap().ends_with('Z'));
    }
}
