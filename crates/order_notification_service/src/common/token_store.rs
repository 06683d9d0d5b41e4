/*  Copyright 2022-23, Juspay India Pvt Ltd
    This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/
use async_trait::async_trait;

use crate::{
    common::types::*,
    redis::{
        keys::{fcm_tokens_key, health_check_key},
        types::RedisConnectionPool,
    },
    tools::error::AppError,
};

/// Per recipient set of push tokens.
///
/// Writers only ever add or remove individual members, so a registration racing a cleanup
/// of the same recipient is never lost.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn get_tokens(&self, user_id: &UserId) -> Result<Vec<PushToken>, AppError>;

    /// Returns how many of `tokens` were not already present.
    async fn add_tokens(&self, user_id: &UserId, tokens: &[PushToken]) -> Result<u64, AppError>;

    /// Returns how many of `tokens` were actually removed.
    async fn remove_tokens(&self, user_id: &UserId, tokens: &[PushToken])
        -> Result<u64, AppError>;

    async fn health_check(&self) -> Result<(), AppError>;
}

fn into_members(tokens: &[PushToken]) -> Vec<String> {
    tokens
        .iter()
        .map(|PushToken(token)| token.to_owned())
        .collect()
}

#[async_trait]
impl TokenStore for RedisConnectionPool {
    async fn get_tokens(&self, user_id: &UserId) -> Result<Vec<PushToken>, AppError> {
        let members = self.smembers(&fcm_tokens_key(user_id)).await?;
        Ok(members.into_iter().map(PushToken).collect())
    }

    async fn add_tokens(&self, user_id: &UserId, tokens: &[PushToken]) -> Result<u64, AppError> {
        self.sadd(&fcm_tokens_key(user_id), into_members(tokens))
            .await
    }

    async fn remove_tokens(
        &self,
        user_id: &UserId,
        tokens: &[PushToken],
    ) -> Result<u64, AppError> {
        self.srem(&fcm_tokens_key(user_id), into_members(tokens))
            .await
    }

    async fn health_check(&self) -> Result<(), AppError> {
        self.set_key(&health_check_key(), "order-notification-service-health-check")
            .await?;

        match self.get_key(&health_check_key()).await? {
            Some(_) => Ok(()),
            None => Err(AppError::InternalError(
                "Health check failed as cannot get key from redis".to_string(),
            )),
        }
    }
}
