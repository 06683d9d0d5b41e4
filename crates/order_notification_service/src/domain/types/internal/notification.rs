/*  Copyright 2022-23, Juspay India Pvt Ltd
    This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{
    common::{types::*, utils::require_non_empty},
    tools::error::AppError,
};

// Fields are optional on the wire so that absent and blank values are both reported as
// INVALID_REQUEST instead of a JSON parse failure.
#[derive(Deserialize, Serialize, Debug, Default, Clone)]
#[serde(rename_all = "camelCase", default)]
pub struct NotifyRequest {
    pub user_id: Option<String>,
    pub order_id: Option<String>,
    pub status: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Default)]
#[serde(default)]
pub struct NotifyBulkRequest {
    pub notifications: Option<Vec<NotifyRequest>>,
}

#[derive(Deserialize, Serialize, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct SaveTokenRequest {
    pub user_id: Option<String>,
    pub token: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, PartialEq)]
pub struct NotifyResponse {
    pub success: bool,
    pub sent: u64,
    pub failed: u64,
}

#[derive(Deserialize, Serialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotifyBulkResponse {
    pub success: bool,
    pub total_sent: u64,
    pub total_failed: u64,
}

impl TryFrom<NotifyRequest> for NotificationRequest {
    type Error = AppError;

    fn try_from(request: NotifyRequest) -> Result<Self, Self::Error> {
        let user_id =
            require_non_empty("userId", request.user_id).map_err(AppError::InvalidRequest)?;
        let order_id =
            require_non_empty("orderId", request.order_id).map_err(AppError::InvalidRequest)?;
        let status =
            require_non_empty("status", request.status).map_err(AppError::InvalidRequest)?;
        let status = OrderStatus::from_str(&status)
            .map_err(|_| AppError::InvalidRequest(format!("Unknown order status : {status}")))?;

        Ok(NotificationRequest {
            user_id: UserId(user_id),
            order_id: OrderId(order_id),
            status,
        })
    }
}

/// Elements of a bulk request split into the ones that can be dispatched and the reasons
/// the others were rejected.
#[derive(Debug, Default)]
pub struct BulkRequests {
    pub requests: Vec<NotificationRequest>,
    pub rejected: Vec<AppError>,
}

impl NotifyBulkRequest {
    /// Only a missing or empty array fails the batch, a bad element is set aside in `rejected`.
    pub fn into_requests(self) -> Result<BulkRequests, AppError> {
        match self.notifications {
            Some(notifications) if !notifications.is_empty() => Ok(notifications
                .into_iter()
                .map(NotificationRequest::try_from)
                .fold(BulkRequests::default(), |mut bulk, request| {
                    match request {
                        Ok(request) => bulk.requests.push(request),
                        Err(err) => bulk.rejected.push(err),
                    }
                    bulk
                })),
            _ => Err(AppError::InvalidRequest(
                "Missing or empty notifications array".to_string(),
            )),
        }
    }
}

impl From<DispatchResult> for NotifyBulkResponse {
    fn from(result: DispatchResult) -> Self {
        NotifyBulkResponse {
            success: true,
            total_sent: result.total_sent,
            total_failed: result.total_failed,
        }
    }
}
