/*  Copyright 2022-23, Juspay India Pvt Ltd
    This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/

use crate::call_external_api;
use crate::tools::error::AppError;
use crate::tools::prometheus::CALL_EXTERNAL_API;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::str::FromStr;
use tracing::{error, info};

/// Converts a non-success response (status and raw body) into an `AppError`.
pub type ErrorHandler = Box<dyn Fn(StatusCode, &str) -> AppError + Send + Sync>;

/// How the request body is encoded on the wire.
pub enum Payload<U> {
    Json(U),
    Form(U),
}

fn build_header_map(headers: Vec<(&str, &str)>) -> Result<HeaderMap, AppError> {
    let mut header_map = HeaderMap::new();

    for (header_key, header_value) in headers {
        let header_name = HeaderName::from_str(header_key)
            .map_err(|_| AppError::InvalidRequest(format!("Invalid Header Name : {header_key}")))?;
        let header_value = HeaderValue::from_str(header_value).map_err(|_| {
            AppError::InvalidRequest(format!("Invalid Header Value : {header_value}"))
        })?;

        header_map.insert(header_name, header_value);
    }

    Ok(header_map)
}

fn attach_payload<U>(request: RequestBuilder, payload: &Payload<U>) -> Result<RequestBuilder, AppError>
where
    U: Serialize,
{
    match payload {
        Payload::Json(body) => {
            let body = serde_json::to_string(body)
                .map_err(|err| AppError::SerializationError(err.to_string()))?;
            Ok(request
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body))
        }
        Payload::Form(body) => Ok(request.form(body)),
    }
}

/// Sends a request and lets `error_handler` decide which `AppError` a non-success response maps to.
///
/// The handler receives the response status and its raw body, so callers can decode provider
/// specific error envelopes. Transport failures (connect, timeout) never reach the handler and
/// become `AppError::ExternalAPICallError`.
///
/// Every call records its latency in `CALL_EXTERNAL_API` and is logged with an `[OUTGOING API]` tag.
/// Form bodies are not logged since they carry credentials.
pub async fn call_api_unwrapping_error<T, U>(
    client: &Client,
    method: Method,
    url: &Url,
    headers: Vec<(&str, &str)>,
    payload: Option<Payload<U>>,
    error_handler: ErrorHandler,
) -> Result<T, AppError>
where
    T: DeserializeOwned,
    U: Serialize + Debug,
{
    let start_time = std::time::Instant::now();

    let header_map = build_header_map(headers)?;

    let mut request = client
        .request(method.to_owned(), url.to_owned())
        .headers(header_map.to_owned());

    if let Some(payload) = &payload {
        request = attach_payload(request, payload)?;
    }

    let request_body = match &payload {
        Some(Payload::Json(body)) => format!("{:?}", body),
        Some(Payload::Form(_)) => "<form>".to_string(),
        None => "None".to_string(),
    };

    let resp = request.send().await;

    let url_str = format!(
        "{}://{}:{}",
        url.scheme(),
        url.host_str().unwrap_or(""),
        url.port_or_known_default().unwrap_or(80)
    );

    let status = match resp.as_ref() {
        Ok(resp) => resp.status().as_str().to_string(),
        Err(err) => err
            .status()
            .map(|status| status.to_string())
            .unwrap_or("UNKNOWN".to_string()),
    };

    call_external_api!(
        method.as_str(),
        url_str.as_str(),
        url.path(),
        status.as_str(),
        start_time
    );

    match resp {
        Ok(resp) => {
            let status = resp.status();
            if status.is_success() {
                info!(tag = "[OUTGOING API]", request_method = %method, request_body = request_body, request_url = %url_str, response_status = %status, latency = format!("{:?}ms", start_time.elapsed().as_millis()));
                resp.json::<T>()
                    .await
                    .map_err(|err| AppError::DeserializationError(err.to_string()))
            } else {
                let body = resp.text().await.unwrap_or_default();
                error!(tag = "[OUTGOING API - ERROR]", request_method = %method, request_body = request_body, request_url = %url_str, response_status = %status, error = body, latency = format!("{:?}ms", start_time.elapsed().as_millis()));
                Err(error_handler(status, &body))
            }
        }
        Err(err) => {
            error!(tag = "[OUTGOING API - ERROR]", request_method = %method, request_body = request_body, request_url = %url_str, error = format!("{:?}", err), latency = format!("{:?}ms", start_time.elapsed().as_millis()));
            Err(AppError::ExternalAPICallError(err.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_header_name() {
        let result = build_header_map(vec![("bad header", "value")]);
        assert_eq!(
            result.err(),
            Some(AppError::InvalidRequest(
                "Invalid Header Name : bad header".to_string()
            ))
        );
    }

    #[test]
    fn builds_valid_headers() {
        let headers =
            build_header_map(vec![("authorization", "Bearer abc"), ("x-request-id", "1")])
                .unwrap();
        assert_eq!(headers.len(), 2);
        assert_eq!(headers["authorization"], "Bearer abc");
    }
}
