/*  Copyright 2022-23, Juspay India Pvt Ltd
    This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/
#![allow(clippy::unwrap_used)]

//! In-memory stand-ins for Redis and FCM used by unit tests.

use std::{
    collections::{BTreeSet, HashMap},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use actix_web::web::Data;
use async_trait::async_trait;

use crate::{
    common::{push_provider::PushProvider, token_store::TokenStore, types::*},
    tools::error::AppError,
};

pub fn user(user_id: &str) -> UserId {
    UserId(user_id.to_string())
}

pub fn token(token: &str) -> PushToken {
    PushToken(token.to_string())
}

pub fn request(user_id: &str, order_id: &str, status: OrderStatus) -> NotificationRequest {
    NotificationRequest {
        user_id: user(user_id),
        order_id: OrderId(order_id.to_string()),
        status,
    }
}

pub fn app_state_with(
    token_store: Arc<InMemoryTokenStore>,
    push_provider: ScriptedPushProvider,
) -> Data<AppState> {
    Data::new(AppState {
        token_store,
        push_provider: Some(Arc::new(push_provider)),
        public_base_url: "https://muralieggs.example".to_string(),
        request_timeout: 9000,
        max_allowed_req_size: 512000,
        log_unprocessible_req_body: vec![],
    })
}

pub fn app_state(
    token_store: InMemoryTokenStore,
    push_provider: ScriptedPushProvider,
) -> Data<AppState> {
    app_state_with(Arc::new(token_store), push_provider)
}

#[derive(Default)]
pub struct InMemoryTokenStore {
    sets: Mutex<HashMap<UserId, BTreeSet<PushToken>>>,
    failing_lookups: Mutex<BTreeSet<String>>,
    fail_removals: bool,
}

impl InMemoryTokenStore {
    pub fn with_tokens(entries: Vec<(&str, Vec<&str>)>) -> Self {
        let store = Self::default();
        {
            let mut sets = store.sets.lock().unwrap();
            for (user_id, tokens) in entries {
                sets.insert(user(user_id), tokens.into_iter().map(token).collect());
            }
        }
        store
    }

    pub fn failing_lookup_for(self, user_id: &str) -> Self {
        self.failing_lookups
            .lock()
            .unwrap()
            .insert(user_id.to_string());
        self
    }

    pub fn failing_removals(mut self) -> Self {
        self.fail_removals = true;
        self
    }

    pub fn tokens_of(&self, user_id: &str) -> Vec<PushToken> {
        self.sets
            .lock()
            .unwrap()
            .get(&user(user_id))
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn get_tokens(&self, user_id: &UserId) -> Result<Vec<PushToken>, AppError> {
        if self.failing_lookups.lock().unwrap().contains(&user_id.0) {
            return Err(AppError::SMembersFailed("connection reset".to_string()));
        }
        Ok(self.tokens_of(&user_id.0))
    }

    async fn add_tokens(&self, user_id: &UserId, tokens: &[PushToken]) -> Result<u64, AppError> {
        let mut sets = self.sets.lock().unwrap();
        let set = sets.entry(user_id.to_owned()).or_default();
        Ok(tokens.iter().filter(|t| set.insert((*t).to_owned())).count() as u64)
    }

    async fn remove_tokens(
        &self,
        user_id: &UserId,
        tokens: &[PushToken],
    ) -> Result<u64, AppError> {
        if self.fail_removals {
            return Err(AppError::SRemFailed("connection reset".to_string()));
        }
        let mut sets = self.sets.lock().unwrap();
        Ok(match sets.get_mut(user_id) {
            Some(set) => tokens.iter().filter(|t| set.remove(*t)).count() as u64,
            None => 0,
        })
    }

    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }
}

/// Answers every token with a preconfigured outcome, `Delivered` by default.
#[derive(Default)]
pub struct ScriptedPushProvider {
    outcomes: HashMap<PushToken, DeliveryOutcome>,
    ready_error: Option<AppError>,
    send_error: Option<AppError>,
    registration_during_send: Option<(Arc<InMemoryTokenStore>, UserId, PushToken)>,
    calls: AtomicUsize,
}

impl ScriptedPushProvider {
    pub fn with_outcome(mut self, push_token: &str, outcome: DeliveryOutcome) -> Self {
        self.outcomes.insert(token(push_token), outcome);
        self
    }

    pub fn not_ready(mut self, error: AppError) -> Self {
        self.ready_error = Some(error);
        self
    }

    pub fn failing_sends(mut self, error: AppError) -> Self {
        self.send_error = Some(error);
        self
    }

    /// Simulates a device registering a new token while the send is in flight.
    pub fn registering_during_send(
        mut self,
        store: Arc<InMemoryTokenStore>,
        user_id: &str,
        push_token: &str,
    ) -> Self {
        self.registration_during_send = Some((store, user(user_id), token(push_token)));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PushProvider for ScriptedPushProvider {
    async fn ensure_ready(&self) -> Result<(), AppError> {
        match &self.ready_error {
            Some(error) => Err(error.to_owned()),
            None => Ok(()),
        }
    }

    async fn send_multicast(
        &self,
        tokens: &[PushToken],
        _payload: &NotificationPayload,
    ) -> Result<MulticastResponse, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(error) = &self.send_error {
            return Err(error.to_owned());
        }

        if let Some((store, user_id, push_token)) = &self.registration_during_send {
            store
                .add_tokens(user_id, std::slice::from_ref(push_token))
                .await?;
        }

        Ok(MulticastResponse {
            responses: tokens
                .iter()
                .map(|t| {
                    let outcome = self
                        .outcomes
                        .get(t)
                        .cloned()
                        .unwrap_or(DeliveryOutcome::Delivered);
                    (t.to_owned(), outcome)
                })
                .collect(),
        })
    }
}
