/*  Copyright 2022-23, Juspay India Pvt Ltd
    This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/
#![allow(clippy::expect_used)]

use std::{env::var, sync::Arc};

use crate::{
    common::{
        push_provider::{FcmPushProvider, PushProvider, ServiceAccount},
        token_store::TokenStore,
    },
    redis::types::{RedisConnectionPool, RedisSettings},
    tools::{error::AppError, logger::LoggerConfig},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub workers: usize,
    pub logger_cfg: LoggerConfig,
    pub redis_cfg: RedisSettings,
    pub fcm_cfg: FcmConfig,
    pub public_base_url: String,
    pub request_timeout: u64,
    pub log_unprocessible_req_body: Vec<String>,
    pub max_allowed_req_size: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FcmConfig {
    pub project_id: String,
    pub client_email: String,
    pub private_key: String,
    pub token_uri: String,
    pub fcm_base_url: String,
}

impl FcmConfig {
    /// Credentials from `FIREBASE_PROJECT_ID`, `FIREBASE_CLIENT_EMAIL` and `FIREBASE_PRIVATE_KEY`
    /// take precedence over the ones in the config file.
    pub fn with_env_overrides(self) -> Self {
        Self {
            project_id: var("FIREBASE_PROJECT_ID").unwrap_or(self.project_id),
            client_email: var("FIREBASE_CLIENT_EMAIL").unwrap_or(self.client_email),
            private_key: var("FIREBASE_PRIVATE_KEY").unwrap_or(self.private_key),
            ..self
        }
    }

    pub fn push_provider(self) -> Result<FcmPushProvider, AppError> {
        let service_account =
            ServiceAccount::new(self.project_id, self.client_email, &self.private_key)?;
        FcmPushProvider::new(service_account, &self.token_uri, &self.fcm_base_url)
    }
}

#[derive(Clone)]
pub struct AppState {
    pub token_store: Arc<dyn TokenStore>,
    pub push_provider: Option<Arc<dyn PushProvider>>,
    pub public_base_url: String,
    pub request_timeout: u64,
    pub max_allowed_req_size: usize,
    pub log_unprocessible_req_body: Vec<String>,
}

impl AppState {
    pub async fn new(app_config: AppConfig) -> (AppState, Arc<RedisConnectionPool>) {
        let redis = Arc::new(
            RedisConnectionPool::new(app_config.redis_cfg)
                .await
                .expect("Failed to create Redis connection pool"),
        );

        let push_provider: Option<Arc<dyn PushProvider>> =
            match app_config.fcm_cfg.with_env_overrides().push_provider() {
                Ok(provider) => {
                    info!(tag = "[FCM Provider]", "FCM push provider initialized");
                    Some(Arc::new(provider))
                }
                Err(err) => {
                    error!(
                        tag = "[FCM Provider]",
                        error = %err.message(),
                        "FCM push provider unavailable, notify requests will fail"
                    );
                    None
                }
            };

        let app_state = AppState {
            token_store: redis.clone(),
            push_provider,
            public_base_url: app_config.public_base_url,
            request_timeout: app_config.request_timeout,
            max_allowed_req_size: app_config.max_allowed_req_size,
            log_unprocessible_req_body: app_config.log_unprocessible_req_body,
        };

        (app_state, redis)
    }
}
