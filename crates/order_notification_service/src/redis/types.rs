/*  Copyright 2022-23, Juspay India Pvt Ltd
    This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/

use fred::{
    clients::RedisPool,
    interfaces::ClientLike,
    types::{Blocking, Builder, ConnectHandle, ReconnectPolicy, RedisConfig, RespVersion},
};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::tools::error::AppError;

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct RedisSettings {
    pub host: String,
    pub port: u16,
    pub cluster_enabled: bool,
    pub cluster_urls: Vec<String>,
    pub use_legacy_version: bool,
    pub pool_size: usize,
    pub reconnect_max_attempts: u32,
    /// Reconnect delay in milliseconds
    pub reconnect_delay: u32,
    /// TTL in seconds
    pub default_ttl: u32,
    pub partition: usize,
}

impl Default for RedisSettings {
    fn default() -> Self {
        RedisSettings {
            host: String::from("localhost"),
            port: 6379,
            cluster_enabled: false,
            cluster_urls: Vec::new(),
            use_legacy_version: false,
            pool_size: 10,
            reconnect_max_attempts: 5,
            reconnect_delay: 1000,
            default_ttl: 3600,
            partition: 0,
        }
    }
}

impl RedisSettings {
    fn connection_url(&self) -> String {
        match self.cluster_enabled {
            // fred ignores the host port for clusters, node addresses come from the query string
            // redis-cluster://host:port?node=bar.com:30002&node=baz.com:30003
            true => format!(
                "redis-cluster://{}:{}?{}",
                self.host,
                self.port,
                self.cluster_urls
                    .iter()
                    .map(|url| format!("node={url}"))
                    .collect::<Vec<String>>()
                    .join("&")
            ),
            false => format!("redis://{}:{}/{}", self.host, self.port, self.partition),
        }
    }
}

pub struct RedisConnectionPool {
    pub pool: RedisPool,
    pub default_ttl: u32,
}

impl RedisConnectionPool {
    /// Create a new Redis connection pool and wait until it is connected.
    pub async fn new(conf: RedisSettings) -> Result<Self, AppError> {
        let mut config = RedisConfig::from_url(&conf.connection_url())
            .map_err(|err| AppError::RedisConnectionError(err.to_string()))?;

        if !conf.use_legacy_version {
            config.version = RespVersion::RESP3;
        }
        config.blocking = Blocking::Error;

        let reconnect_policy =
            ReconnectPolicy::new_constant(conf.reconnect_max_attempts, conf.reconnect_delay);

        let pool = Builder::from_config(config)
            .set_policy(reconnect_policy)
            .build_pool(conf.pool_size)
            .map_err(|err| AppError::RedisConnectionError(err.to_string()))?;

        // The connection task keeps running in the background until `close_connections`.
        let _: ConnectHandle = pool
            .init()
            .await
            .map_err(|err| AppError::RedisConnectionError(err.to_string()))?;

        Ok(Self {
            pool,
            default_ttl: conf.default_ttl,
        })
    }

    pub async fn close_connections(&self) {
        if let Err(error) = self.pool.quit().await {
            error!(tag = "[Redis Quit]", %error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centralized_url_uses_partition() {
        let settings = RedisSettings {
            partition: 2,
            ..Default::default()
        };
        assert_eq!(settings.connection_url(), "redis://localhost:6379/2");
    }

    #[test]
    fn cluster_url_lists_nodes() {
        let settings = RedisSettings {
            cluster_enabled: true,
            cluster_urls: vec!["a:7000".to_string(), "b:7001".to_string()],
            ..Default::default()
        };
        assert_eq!(
            settings.connection_url(),
            "redis-cluster://localhost:6379?node=a:7000&node=b:7001"
        );
    }
}
