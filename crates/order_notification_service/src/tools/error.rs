/*  Copyright 2022-23, Juspay India Pvt Ltd
    This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/

use actix_web::{
    http::{header::ContentType, StatusCode},
    HttpResponse, ResponseError,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: String,
    pub details: String,
    pub error_code: String,
}

/// Display of every variant is its stable error code, which is also what
/// `log_unprocessible_req_body` in the config is matched against.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AppError {
    #[error("INTERNAL_ERROR")]
    InternalError(String),
    #[error("INVALID_REQUEST")]
    InvalidRequest(String),
    #[error("UNPROCESSIBLE_REQUEST")]
    UnprocessibleRequest(String),
    #[error("LARGE_PAYLOAD_SIZE")]
    LargePayloadSize(usize, usize),
    #[error("REQUEST_TIMEOUT")]
    RequestTimeout,
    #[error("EXTERNAL_API_CALL_ERROR")]
    ExternalAPICallError(String),
    #[error("SERIALIZATION_ERROR")]
    SerializationError(String),
    #[error("DESERIALIZATION_ERROR")]
    DeserializationError(String),
    #[error("INVALID_CONFIGURATION")]
    InvalidConfiguration(String),
    #[error("NO_DELIVERABLE_ENDPOINT")]
    NoDeliverableEndpoint(String),
    #[error("PUSH_PROVIDER_UNAVAILABLE")]
    PushProviderUnavailable(String),
    #[error("PUSH_PROVIDER_AUTH_FAILED")]
    PushProviderAuthFailed(String),
    #[error("FCM_TOKEN_UNREGISTERED")]
    FcmTokenUnregistered(String),
    #[error("FCM_TOKEN_INVALID")]
    FcmTokenInvalid(String),
    #[error("FCM_SEND_FAILED")]
    FcmSendFailed(String),
    #[error("REDIS_CONNECTION_FAILED")]
    RedisConnectionError(String),
    #[error("SET_FAILED")]
    SetFailed(String),
    #[error("GET_FAILED")]
    GetFailed(String),
    #[error("SMEMBERS_FAILED")]
    SMembersFailed(String),
    #[error("SADD_FAILED")]
    SAddFailed(String),
    #[error("SREM_FAILED")]
    SRemFailed(String),
}

impl AppError {
    fn error_message(&self) -> ErrorBody {
        ErrorBody {
            error: self
                .status_code()
                .canonical_reason()
                .unwrap_or("Error")
                .to_string(),
            details: self.message(),
            error_code: self.code(),
        }
    }

    pub fn message(&self) -> String {
        match self {
            AppError::InternalError(err) => err.to_string(),
            AppError::InvalidRequest(err) => err.to_string(),
            AppError::UnprocessibleRequest(err) => err.to_string(),
            AppError::LargePayloadSize(length, limit) => {
                format!("Content length ({length} Bytes) greater than allowed maximum limit : ({limit} Bytes)")
            }
            AppError::RequestTimeout => "Request timed out".to_string(),
            AppError::ExternalAPICallError(err) => err.to_string(),
            AppError::SerializationError(err) => err.to_string(),
            AppError::DeserializationError(err) => err.to_string(),
            AppError::InvalidConfiguration(err) => format!("Invalid Configuration : {err}"),
            AppError::NoDeliverableEndpoint(user_id) => {
                format!("No FCM tokens found for user : {user_id}")
            }
            AppError::PushProviderUnavailable(reason) => {
                format!("Push provider is not initialized : {reason}")
            }
            AppError::PushProviderAuthFailed(reason) => {
                format!("Failed to authenticate with push provider : {reason}")
            }
            AppError::FcmTokenUnregistered(err) => format!("FCM token not registered : {err}"),
            AppError::FcmTokenInvalid(err) => format!("FCM token invalid : {err}"),
            AppError::FcmSendFailed(err) => format!("Failed to send FCM : {err}"),
            AppError::RedisConnectionError(err) => format!("Redis Connection Error : {err}"),
            AppError::SetFailed(err)
            | AppError::GetFailed(err)
            | AppError::SMembersFailed(err)
            | AppError::SAddFailed(err)
            | AppError::SRemFailed(err) => format!("Redis Error : {err}"),
        }
    }

    pub fn code(&self) -> String {
        self.to_string()
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .json(self.error_message())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::UnprocessibleRequest(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::LargePayloadSize(_, _) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::RequestTimeout => StatusCode::REQUEST_TIMEOUT,
            AppError::ExternalAPICallError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::SerializationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::DeserializationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::InvalidConfiguration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::NoDeliverableEndpoint(_) => StatusCode::NOT_FOUND,
            AppError::PushProviderUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::PushProviderAuthFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::FcmTokenUnregistered(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::FcmTokenInvalid(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::FcmSendFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::RedisConnectionError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::SetFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::GetFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::SMembersFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::SAddFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::SRemFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    #[actix_web::test]
    async fn error_response_carries_code_and_details() {
        let err = AppError::NoDeliverableEndpoint("user-1".to_string());
        let resp = err.error_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let bytes = to_bytes(resp.into_body()).await.unwrap();
        let body: ErrorBody = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.error, "Not Found");
        assert_eq!(body.error_code, "NO_DELIVERABLE_ENDPOINT");
        assert_eq!(body.details, "No FCM tokens found for user : user-1");
    }

    #[test]
    fn validation_errors_are_client_errors() {
        assert_eq!(
            AppError::InvalidRequest("x".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::UnprocessibleRequest("x".to_string()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AppError::PushProviderUnavailable("x".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
