/*  Copyright 2022-23, Juspay India Pvt Ltd
    This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/

use serde::{Deserialize, Serialize};

// Google OAuth2 service account grant
#[derive(Debug, Serialize)]
pub struct ServiceAccountClaims {
    pub iss: String,
    pub scope: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Serialize)]
pub struct AccessTokenRequest {
    pub grant_type: String,
    pub assertion: String,
}

#[derive(Debug, Deserialize)]
pub struct AccessTokenResponse {
    pub access_token: String,
    pub expires_in: i64,
    pub token_type: String,
}

// FCM HTTP v1 messages:send
#[derive(Debug, Serialize)]
pub struct FcmSendRequest {
    pub message: FcmMessage,
}

#[derive(Debug, Serialize)]
pub struct FcmMessage {
    pub token: String,
    pub notification: FcmNotification,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webpush: Option<FcmWebpushConfig>,
}

#[derive(Debug, Serialize)]
pub struct FcmNotification {
    pub title: String,
    pub body: String,
}

#[derive(Debug, Serialize)]
pub struct FcmWebpushConfig {
    pub fcm_options: FcmWebpushOptions,
}

#[derive(Debug, Serialize)]
pub struct FcmWebpushOptions {
    pub link: String,
}

#[derive(Debug, Deserialize)]
pub struct FcmSendResponse {
    pub name: String,
}

// Error envelope shared by Google APIs
#[derive(Debug, Deserialize)]
pub struct FcmErrorResponse {
    pub error: FcmErrorBody,
}

#[derive(Debug, Deserialize)]
pub struct FcmErrorBody {
    pub code: u16,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub details: Vec<FcmErrorDetail>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FcmErrorDetail {
    #[serde(rename = "@type", default)]
    pub detail_type: String,
    pub error_code: Option<String>,
}
