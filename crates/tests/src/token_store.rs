/*  Copyright 2022-23, Juspay India Pvt Ltd
    This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/

use order_notification_service::{
    common::{token_store::TokenStore, types::*},
    redis::{
        keys::fcm_tokens_key,
        types::{RedisConnectionPool, RedisSettings},
    },
};

async fn pool() -> RedisConnectionPool {
    RedisConnectionPool::new(RedisSettings::default())
        .await
        .expect("Failed to create Redis Connection Pool")
}

fn tokens(values: &[&str]) -> Vec<PushToken> {
    values.iter().map(|t| PushToken(t.to_string())).collect()
}

async fn reset(pool: &RedisConnectionPool, user_id: &UserId) -> anyhow::Result<()> {
    let members = pool.smembers(&fcm_tokens_key(user_id)).await?;
    pool.srem(&fcm_tokens_key(user_id), members).await?;
    Ok(())
}

#[tokio::test]
#[ignore = "needs a live Redis"]
async fn health_check_round_trips() -> anyhow::Result<()> {
    let pool = pool().await;
    pool.health_check().await?;
    pool.close_connections().await;
    Ok(())
}

#[tokio::test]
#[ignore = "needs a live Redis"]
async fn registration_is_idempotent() -> anyhow::Result<()> {
    let pool = pool().await;
    let user_id = UserId("it-registration".to_string());
    reset(&pool, &user_id).await?;

    assert_eq!(pool.add_tokens(&user_id, &tokens(&["T1"])).await?, 1);
    assert_eq!(pool.add_tokens(&user_id, &tokens(&["T1"])).await?, 0);
    assert_eq!(pool.get_tokens(&user_id).await?, tokens(&["T1"]));

    reset(&pool, &user_id).await?;
    pool.close_connections().await;
    Ok(())
}

#[tokio::test]
#[ignore = "needs a live Redis"]
async fn cleanup_keeps_tokens_registered_after_lookup() -> anyhow::Result<()> {
    let pool = pool().await;
    let user_id = UserId("it-cleanup".to_string());
    reset(&pool, &user_id).await?;

    pool.add_tokens(&user_id, &tokens(&["T1", "T2"])).await?;
    let looked_up = pool.get_tokens(&user_id).await?;
    assert_eq!(looked_up.len(), 2);

    // a device registers between the lookup and the cleanup
    pool.add_tokens(&user_id, &tokens(&["T3"])).await?;

    assert_eq!(pool.remove_tokens(&user_id, &tokens(&["T2"])).await?, 1);

    let mut remaining = pool.get_tokens(&user_id).await?;
    remaining.sort();
    assert_eq!(remaining, tokens(&["T1", "T3"]));

    reset(&pool, &user_id).await?;
    pool.close_connections().await;
    Ok(())
}

#[tokio::test]
#[ignore = "needs a live Redis"]
async fn concurrent_registrations_are_all_kept() -> anyhow::Result<()> {
    let pool = pool().await;
    let user_id = UserId("it-concurrent".to_string());
    reset(&pool, &user_id).await?;

    let registrations = (0..20).map(|i| {
        let user_id = user_id.clone();
        let pool = &pool;
        async move {
            pool.add_tokens(&user_id, &[PushToken(format!("device-{i}"))])
                .await
        }
    });
    for result in futures::future::join_all(registrations).await {
        result?;
    }

    assert_eq!(pool.get_tokens(&user_id).await?.len(), 20);

    reset(&pool, &user_id).await?;
    pool.close_connections().await;
    Ok(())
}
