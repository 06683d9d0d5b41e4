/*  Copyright 2022-23, Juspay India Pvt Ltd
    This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/

use std::{rc::Rc, time::Duration};

use crate::incoming_api;
use crate::tools::prometheus::INCOMING_API;
use actix::fut::{ready, Ready};
use actix_http::{h1, header::CONTENT_LENGTH, StatusCode};
use actix_web::{
    body::{BoxBody, MessageBody},
    dev::{self, forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    web::{self, Bytes, Data},
    Error, HttpRequest,
};
use futures::future::LocalBoxFuture;
use tokio::time::{timeout, Instant};
use tracing::Span;
use tracing::{error, info, warn};
use tracing_actix_web::{DefaultRootSpanBuilder, RootSpanBuilder};
use uuid::Uuid;

use crate::{environment::AppState, tools::error::AppError};

/// Fails a request with `RequestTimeout` once `request_timeout` milliseconds have passed.
///
/// A bulk dispatch waits on FCM for every recipient, so this bounds how long the admin UI
/// can be kept waiting.
pub struct RequestTimeout;

impl<S: 'static> Transform<S, ServiceRequest> for RequestTimeout
where
    S: Service<ServiceRequest, Response = ServiceResponse<BoxBody>, Error = Error>,
    S::Future: 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type InitError = ();
    type Transform = RequestTimeoutMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequestTimeoutMiddleware { service }))
    }
}

pub struct RequestTimeoutMiddleware<S> {
    service: S,
}

impl<S> Service<ServiceRequest> for RequestTimeoutMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<BoxBody>, Error = Error> + 'static,
    S::Future: 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let request_timeout = req
            .app_data::<Data<AppState>>()
            .map(|data| Duration::from_millis(data.request_timeout));

        let fut = self.service.call(req);

        match request_timeout {
            Some(request_timeout) => Box::pin(async move {
                timeout(request_timeout, fut)
                    .await
                    .map_err(|_| actix_web::Error::from(AppError::RequestTimeout))?
            }),
            None => Box::pin(fut),
        }
    }
}

/// Root span per request, keyed by `x-request-id` when the caller sends one.
pub struct DomainRootSpanBuilder;

impl RootSpanBuilder for DomainRootSpanBuilder {
    fn on_request_start(request: &ServiceRequest) -> Span {
        let request_id = header_value(request, "x-request-id")
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let client = header_value(request, "user-agent");

        tracing_actix_web::root_span!(request, request_id, client)
    }

    fn on_request_end<B: MessageBody>(span: Span, outcome: &Result<ServiceResponse<B>, Error>) {
        DefaultRootSpanBuilder::on_request_end(span, outcome);
    }
}

fn header_value(request: &ServiceRequest, name: &str) -> Option<String> {
    request
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string())
}

/// Logs every request with an `[INCOMING API]` tag and observes its latency in `INCOMING_API`.
pub struct IncomingRequestMetrics;

impl<S> Transform<S, ServiceRequest> for IncomingRequestMetrics
where
    S: Service<ServiceRequest, Response = ServiceResponse<BoxBody>, Error = Error>,
    S::Future: 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type InitError = ();
    type Transform = IncomingRequestMetricsMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(IncomingRequestMetricsMiddleware { service }))
    }
}

pub struct IncomingRequestMetricsMiddleware<S> {
    service: S,
}

impl<S> Service<ServiceRequest> for IncomingRequestMetricsMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<BoxBody>, Error = Error>,
    S::Future: 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let start_time = Instant::now();
        let request_line = RequestLine::from(req.request());

        let fut = self.service.call(req);
        Box::pin(async move {
            match fut.await {
                Ok(response) => {
                    record_request(
                        response.response().error(),
                        response.status(),
                        RequestLine::from(response.request()),
                        start_time,
                    );
                    Ok(response)
                }
                Err(err) => {
                    let status = err.error_response().status();
                    record_request(Some(&err), status, request_line, start_time);
                    Err(err)
                }
            }
        })
    }
}

struct RequestLine {
    method: String,
    path: String,
    headers: String,
}

impl From<&HttpRequest> for RequestLine {
    fn from(request: &HttpRequest) -> Self {
        let path = request
            .match_info()
            .iter()
            .fold(request.path().to_string(), |path, (name, value)| {
                path.replace(value, format!(":{name}").as_str())
            });

        Self {
            method: request.method().to_string(),
            path,
            headers: format!("{:?}", request.headers()),
        }
    }
}

fn record_request(
    err_resp: Option<&Error>,
    resp_status: StatusCode,
    request: RequestLine,
    start_time: Instant,
) {
    let RequestLine {
        method,
        path,
        headers,
    } = request;
    let latency = format!("{:?}ms", start_time.elapsed().as_millis());

    match err_resp {
        Some(err_resp) => {
            let code = err_resp.to_string();
            error!(tag = "[INCOMING API - ERROR]", request_method = %method, request_path = %path, request_headers = headers, response_code = code, response_status = resp_status.as_str(), latency = latency);
            incoming_api!(
                method.as_str(),
                path.as_str(),
                resp_status.as_str(),
                code.as_str(),
                start_time
            );
        }
        None => {
            info!(tag = "[INCOMING API]", request_method = %method, request_path = %path, request_headers = headers, response_status = resp_status.as_str(), latency = latency);
            incoming_api!(
                method.as_str(),
                path.as_str(),
                resp_status.as_str(),
                "SUCCESS",
                start_time
            );
        }
    }
}

/// Logs the raw body of requests that failed with one of the codes in
/// `log_unprocessible_req_body`, e.g. `UNPROCESSIBLE_REQUEST` for malformed notify payloads.
pub struct LogIncomingRequestBody;

impl<S: 'static> Transform<S, ServiceRequest> for LogIncomingRequestBody
where
    S: Service<ServiceRequest, Response = ServiceResponse<BoxBody>, Error = Error>,
    S::Future: 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type InitError = ();
    type Transform = LogIncomingRequestBodyMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(LogIncomingRequestBodyMiddleware {
            service: Rc::new(service),
        }))
    }
}

pub struct LogIncomingRequestBodyMiddleware<S> {
    service: Rc<S>,
}

impl<S> Service<ServiceRequest> for LogIncomingRequestBodyMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<BoxBody>, Error = Error> + 'static,
    S::Future: 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, mut req: ServiceRequest) -> Self::Future {
        let svc = self.service.clone();
        Box::pin(async move {
            let logged_codes = req
                .app_data::<Data<AppState>>()
                .map_or(vec![], |data| data.log_unprocessible_req_body.to_owned());

            if logged_codes.is_empty() {
                return svc.call(req).await;
            }

            // the body stream can only be read once, so buffer it and hand a copy back
            let body = req.extract::<web::Bytes>().await?;
            req.set_payload(bytes_to_payload(body.clone()));

            let result = svc.call(req).await;
            match &result {
                Ok(response) => {
                    if let Some(err_resp) = response.response().error() {
                        log_request_body(&logged_codes, err_resp, &body);
                    }
                }
                Err(err_resp) => log_request_body(&logged_codes, err_resp, &body),
            }
            result
        })
    }
}

fn bytes_to_payload(buf: web::Bytes) -> dev::Payload {
    let (_, mut pl) = h1::Payload::create(true);
    pl.unread_data(buf);
    dev::Payload::from(pl)
}

fn log_request_body(logged_codes: &[String], err_resp: &Error, request_body: &Bytes) {
    if logged_codes.contains(&err_resp.to_string()) {
        warn!(tag = "[INCOMING API - BODY]", error_code = %err_resp, "Raw Request Body: {:?}", request_body);
    }
}

/// Rejects requests whose `Content-Length` exceeds `max_allowed_req_size` with `LARGE_PAYLOAD_SIZE`.
pub struct CheckContentLength;

impl<S> Transform<S, ServiceRequest> for CheckContentLength
where
    S: Service<ServiceRequest, Response = ServiceResponse<BoxBody>, Error = Error>,
    S::Future: 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type InitError = ();
    type Transform = CheckContentLengthMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(CheckContentLengthMiddleware { service }))
    }
}

pub struct CheckContentLengthMiddleware<S> {
    service: S,
}

impl<S> Service<ServiceRequest> for CheckContentLengthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<BoxBody>, Error = Error>,
    S::Future: 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let content_length = req
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|content_length| content_length.to_str().ok()?.parse::<usize>().ok());
        let limit = req
            .app_data::<Data<AppState>>()
            .map(|data| data.max_allowed_req_size);

        if let (Some(content_length), Some(limit)) = (content_length, limit) {
            if content_length > limit {
                return Box::pin(ready(Err::<Self::Response, Self::Error>(
                    AppError::LargePayloadSize(content_length, limit).into(),
                )));
            }
        }

        Box::pin(self.service.call(req))
    }
}

#[cfg(test)]
mod tests {
    use actix_web::{http::StatusCode, test, App};
    use serde_json::json;

    use super::*;
    use crate::{common::test_doubles::*, domain::api::handler};

    #[actix_web::test]
    async fn oversized_bodies_are_rejected() {
        let data = app_state(InMemoryTokenStore::default(), ScriptedPushProvider::default());
        let app = test::init_service(
            App::new()
                .app_data(data)
                .wrap(CheckContentLength)
                .configure(handler),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/save-token")
            .set_payload("{}")
            .insert_header((CONTENT_LENGTH, "1048576"))
            .to_request();
        let err = test::try_call_service(&app, req).await.err().unwrap();

        assert_eq!(
            err.as_response_error().status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(err.to_string(), "LARGE_PAYLOAD_SIZE");
    }

    #[actix_web::test]
    async fn body_logging_keeps_the_payload_readable() {
        let data = app_state(InMemoryTokenStore::default(), ScriptedPushProvider::default());
        let mut data_with_logging = (*data.into_inner()).clone();
        data_with_logging.log_unprocessible_req_body = vec!["INVALID_REQUEST".to_string()];

        let app = test::init_service(
            App::new()
                .app_data(Data::new(data_with_logging))
                .wrap(LogIncomingRequestBody)
                .configure(handler),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/save-token")
            .set_json(json!({ "userId": "u1", "token": "t1" }))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::OK);
    }
}
