/*  Copyright 2022-23, Juspay India Pvt Ltd
    This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/
use super::types::*;
use crate::tools::{
    callapi::{call_api_unwrapping_error, Payload},
    error::AppError,
};
use reqwest::{Client, Method, StatusCode, Url};

pub const JWT_BEARER_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

pub async fn exchange_service_account_assertion(
    client: &Client,
    token_uri: &Url,
    assertion: String,
) -> Result<AccessTokenResponse, AppError> {
    call_api_unwrapping_error::<AccessTokenResponse, AccessTokenRequest>(
        client,
        Method::POST,
        token_uri,
        vec![],
        Some(Payload::Form(AccessTokenRequest {
            grant_type: JWT_BEARER_GRANT_TYPE.to_string(),
            assertion,
        })),
        Box::new(|status: StatusCode, body: &str| {
            AppError::PushProviderAuthFailed(format!("{status} : {body}"))
        }),
    )
    .await
}

pub async fn send_fcm_message(
    client: &Client,
    send_url: &Url,
    access_token: &str,
    message: FcmMessage,
) -> Result<FcmSendResponse, AppError> {
    let authorization = format!("Bearer {access_token}");

    call_api_unwrapping_error::<FcmSendResponse, FcmSendRequest>(
        client,
        Method::POST,
        send_url,
        vec![("authorization", authorization.as_str())],
        Some(Payload::Json(FcmSendRequest { message })),
        Box::new(classify_fcm_error),
    )
    .await
}

/// Maps an FCM error response onto the token level error it describes.
///
/// `UNREGISTERED`, a bare `NOT_FOUND` and an `INVALID_ARGUMENT` about the registration token mean the token is dead.
/// Everything else (quota, unavailable, internal, sender mismatch) is worth retrying later.
pub fn classify_fcm_error(status: StatusCode, body: &str) -> AppError {
    match serde_json::from_str::<FcmErrorResponse>(body) {
        Ok(FcmErrorResponse { error }) => {
            let error_code = error
                .details
                .iter()
                .find_map(|detail| detail.error_code.as_deref())
                .unwrap_or(error.status.as_str());

            match error_code {
                "UNREGISTERED" | "NOT_FOUND" => {
                    AppError::FcmTokenUnregistered(error.message.to_owned())
                }
                "INVALID_ARGUMENT"
                    if error
                        .message
                        .to_lowercase()
                        .contains("registration token") =>
                {
                    AppError::FcmTokenInvalid(error.message.to_owned())
                }
                code => AppError::FcmSendFailed(format!("{code} : {}", error.message)),
            }
        }
        Err(_) if status == StatusCode::NOT_FOUND => AppError::FcmSendFailed(
            "FCM endpoint not found, check that project_id matches the service account project"
                .to_string(),
        ),
        Err(_) => AppError::FcmSendFailed(format!("{status} : {body}")),
    }
}
