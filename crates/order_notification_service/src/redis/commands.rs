/*  Copyright 2022-23, Juspay India Pvt Ltd
    This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/
use crate::redis::types::RedisConnectionPool;
use crate::tools::error::AppError;
use fred::{
    interfaces::{KeysInterface, SetsInterface},
    types::Expiration,
};
use tracing::instrument;

impl RedisConnectionPool {
    #[instrument(level = "DEBUG", skip(self))]
    pub async fn set_key(&self, key: &str, value: &str) -> Result<(), AppError> {
        self.pool
            .set::<(), _, _>(
                key,
                value,
                Some(Expiration::EX(self.default_ttl.into())),
                None,
                false,
            )
            .await
            .map_err(|err| AppError::SetFailed(err.to_string()))
    }

    #[instrument(level = "DEBUG", skip(self))]
    pub async fn get_key(&self, key: &str) -> Result<Option<String>, AppError> {
        self.pool
            .get::<Option<String>, _>(key)
            .await
            .map_err(|err| AppError::GetFailed(err.to_string()))
    }

    // SMEMBERS, a missing key reads as an empty set
    #[instrument(level = "DEBUG", skip(self))]
    pub async fn smembers(&self, key: &str) -> Result<Vec<String>, AppError> {
        self.pool
            .smembers::<Vec<String>, _>(key)
            .await
            .map_err(|err| AppError::SMembersFailed(err.to_string()))
    }

    // SADD, returns the number of members that were not already present
    #[instrument(level = "DEBUG", skip(self))]
    pub async fn sadd(&self, key: &str, members: Vec<String>) -> Result<u64, AppError> {
        if members.is_empty() {
            return Ok(0);
        }

        self.pool
            .sadd::<u64, _, _>(key, members)
            .await
            .map_err(|err| AppError::SAddFailed(err.to_string()))
    }

    // SREM, returns the number of members actually removed
    #[instrument(level = "DEBUG", skip(self))]
    pub async fn srem(&self, key: &str, members: Vec<String>) -> Result<u64, AppError> {
        if members.is_empty() {
            return Ok(0);
        }

        self.pool
            .srem::<u64, _, _>(key, members)
            .await
            .map_err(|err| AppError::SRemFailed(err.to_string()))
    }
}
