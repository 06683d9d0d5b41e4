/*  Copyright 2022-23, Juspay India Pvt Ltd
    This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/
use actix_web::{
    post,
    web::{Data, Json},
};

use crate::{
    common::types::*,
    domain::{action::internal::*, types::internal::notification::*},
    tools::error::AppError,
};

#[post("/api/notify")]
pub async fn notify(
    data: Data<AppState>,
    param_obj: Json<NotifyRequest>,
) -> Result<Json<NotifyResponse>, AppError> {
    let request_body = param_obj.into_inner();

    Ok(Json(notification::notify(data, request_body).await?))
}

#[post("/api/notify-bulk")]
pub async fn notify_bulk(
    data: Data<AppState>,
    param_obj: Json<NotifyBulkRequest>,
) -> Result<Json<NotifyBulkResponse>, AppError> {
    let request_body = param_obj.into_inner();

    Ok(Json(notification::notify_bulk(data, request_body).await?))
}

#[post("/api/save-token")]
pub async fn save_token(
    data: Data<AppState>,
    param_obj: Json<SaveTokenRequest>,
) -> Result<Json<APISuccess>, AppError> {
    let request_body = param_obj.into_inner();

    Ok(Json(notification::save_token(data, request_body).await?))
}
