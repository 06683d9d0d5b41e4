/*  Copyright 2022-23, Juspay India Pvt Ltd
    This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/
use actix_web::web::Data;
use futures::future::join_all;
use tracing::{error, info, warn};

use crate::{
    common::{
        push_provider::PushProvider,
        token_store::TokenStore,
        types::*,
        utils::{build_status_update_payload, require_non_empty},
    },
    domain::types::internal::notification::*,
    push_delivery,
    tools::{
        error::AppError,
        prometheus::{PUSH_DELIVERIES, STALE_TOKENS_REMOVED},
    },
};

/// Sends a status update to every recipient in `requests` and sums the per token results.
///
/// Recipients are handled concurrently and a failure for one of them only shows up in the
/// counts. The batch as a whole fails when `requests` is empty or when the push provider
/// cannot be used at all.
pub async fn dispatch(
    token_store: &dyn TokenStore,
    push_provider: Option<&dyn PushProvider>,
    public_base_url: &str,
    requests: Vec<NotificationRequest>,
) -> Result<DispatchResult, AppError> {
    if requests.is_empty() {
        return Err(AppError::InvalidRequest(
            "Missing or empty notifications array".to_string(),
        ));
    }

    let push_provider = push_provider.ok_or(AppError::PushProviderUnavailable(
        "FCM credentials are missing or invalid".to_string(),
    ))?;

    push_provider.ensure_ready().await?;

    let recipients = join_all(requests.into_iter().map(|request| {
        dispatch_to_recipient(token_store, push_provider, public_base_url, request)
    }))
    .await;

    let result = DispatchResult::from(recipients);

    info!(
        tag = "[Notification Dispatch]",
        recipients = result.recipients.len(),
        total_sent = result.total_sent,
        total_failed = result.total_failed
    );

    Ok(result)
}

async fn dispatch_to_recipient(
    token_store: &dyn TokenStore,
    push_provider: &dyn PushProvider,
    public_base_url: &str,
    request: NotificationRequest,
) -> RecipientDispatch {
    let tokens = match token_store.get_tokens(&request.user_id).await {
        Ok(tokens) => tokens,
        Err(err) => {
            error!(tag = "[Token Lookup]", user_id = request.user_id.0, error = %err.message());
            push_delivery!("ERRORED", 1);
            return RecipientDispatch::errored(request, 1, err.message());
        }
    };

    if tokens.is_empty() {
        warn!(tag = "[Token Lookup]", user_id = request.user_id.0, "No FCM tokens registered");
        push_delivery!("NO_TOKENS", 1);
        return RecipientDispatch::not_found(request);
    }

    let payload = build_status_update_payload(&request.order_id, request.status, public_base_url);

    let response = match push_provider.send_multicast(&tokens, &payload).await {
        Ok(response) => response,
        Err(err) => {
            error!(tag = "[Push Send]", user_id = request.user_id.0, tokens = tokens.len(), error = %err.message());
            push_delivery!("ERRORED", tokens.len());
            return RecipientDispatch::errored(request, tokens.len() as u64, err.message());
        }
    };

    for (_, outcome) in response.responses.iter() {
        push_delivery!(outcome.label(), 1);
    }

    let stale_tokens = response.stale_tokens();
    if !stale_tokens.is_empty() {
        match token_store
            .remove_tokens(&request.user_id, &stale_tokens)
            .await
        {
            Ok(removed) => {
                STALE_TOKENS_REMOVED.inc_by(removed);
                info!(tag = "[Stale Token Cleanup]", user_id = request.user_id.0, removed = removed);
            }
            Err(err) => {
                error!(tag = "[Stale Token Cleanup]", user_id = request.user_id.0, error = %err.message());
            }
        }
    }

    info!(
        tag = "[Push Send]",
        user_id = request.user_id.0,
        order_id = request.order_id.0,
        status = %request.status,
        sent = response.success_count(),
        failed = response.failure_count()
    );

    RecipientDispatch::delivered(request, response.success_count(), response.failure_count())
}

pub async fn notify(
    data: Data<AppState>,
    request_body: NotifyRequest,
) -> Result<NotifyResponse, AppError> {
    let request = NotificationRequest::try_from(request_body)?;

    let result = dispatch(
        data.token_store.as_ref(),
        data.push_provider.as_deref(),
        &data.public_base_url,
        vec![request],
    )
    .await?;

    let recipient = result.recipients.into_iter().next().ok_or(AppError::InternalError(
        "Dispatch finished without a recipient outcome".to_string(),
    ))?;

    match recipient.outcome {
        RecipientOutcome::NotFound => Err(AppError::NoDeliverableEndpoint(recipient.user_id.0)),
        RecipientOutcome::Errored(reason) => Err(AppError::InternalError(reason)),
        RecipientOutcome::Sent | RecipientOutcome::PartiallySent | RecipientOutcome::FullyFailed => {
            Ok(NotifyResponse {
                success: true,
                sent: recipient.sent,
                failed: recipient.failed,
            })
        }
    }
}

pub async fn notify_bulk(
    data: Data<AppState>,
    request_body: NotifyBulkRequest,
) -> Result<NotifyBulkResponse, AppError> {
    let BulkRequests { requests, rejected } = request_body.into_requests()?;

    for err in rejected.iter() {
        warn!(tag = "[Notify Bulk]", error = %err.message(), "Skipping invalid notification");
    }
    push_delivery!("REJECTED", rejected.len());

    if requests.is_empty() {
        return Ok(NotifyBulkResponse {
            success: true,
            total_sent: 0,
            total_failed: rejected.len() as u64,
        });
    }

    let result = dispatch(
        data.token_store.as_ref(),
        data.push_provider.as_deref(),
        &data.public_base_url,
        requests,
    )
    .await?;

    let mut response = NotifyBulkResponse::from(result);
    response.total_failed += rejected.len() as u64;

    Ok(response)
}

pub async fn save_token(
    data: Data<AppState>,
    request_body: SaveTokenRequest,
) -> Result<APISuccess, AppError> {
    let user_id =
        require_non_empty("userId", request_body.user_id).map_err(AppError::InvalidRequest)?;
    let token = require_non_empty("token", request_body.token).map_err(AppError::InvalidRequest)?;

    let added = data
        .token_store
        .add_tokens(&UserId(user_id.to_owned()), &[PushToken(token)])
        .await?;

    info!(tag = "[Save Token]", user_id = user_id, newly_added = added);

    Ok(APISuccess::default())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::common::test_doubles::*;

    const BASE_URL: &str = "https://muralieggs.example";

    fn not_registered() -> DeliveryOutcome {
        DeliveryOutcome::PermanentFailure(PermanentFailureReason::NotRegistered)
    }

    #[tokio::test]
    async fn prunes_only_the_unregistered_token() {
        let store = InMemoryTokenStore::with_tokens(vec![("A", vec!["T1", "T2"])]);
        let provider = ScriptedPushProvider::default().with_outcome("T2", not_registered());

        let result = dispatch(
            &store,
            Some(&provider),
            BASE_URL,
            vec![request("A", "order-1", OrderStatus::Confirmed)],
        )
        .await
        .unwrap();

        assert_eq!((result.total_sent, result.total_failed), (1, 1));
        assert_eq!(result.recipients[0].outcome, RecipientOutcome::PartiallySent);
        assert_eq!(store.tokens_of("A"), vec![token("T1")]);
    }

    #[tokio::test]
    async fn recipient_without_tokens_is_one_failure_and_no_send() {
        let store = InMemoryTokenStore::default();
        let provider = ScriptedPushProvider::default();

        let result = dispatch(
            &store,
            Some(&provider),
            BASE_URL,
            vec![request("B", "order-1", OrderStatus::Delivered)],
        )
        .await
        .unwrap();

        assert_eq!((result.total_sent, result.total_failed), (0, 1));
        assert_eq!(result.recipients[0].outcome, RecipientOutcome::NotFound);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn bulk_totals_add_up_across_recipients() {
        let store = InMemoryTokenStore::with_tokens(vec![
            ("u1", vec!["a1", "a2"]),
            ("u3", vec!["c1", "c2"]),
        ]);
        let provider = ScriptedPushProvider::default();

        let result = dispatch(
            &store,
            Some(&provider),
            BASE_URL,
            vec![
                request("u1", "order-1", OrderStatus::Confirmed),
                request("u2", "order-2", OrderStatus::Confirmed),
                request("u3", "order-3", OrderStatus::Confirmed),
            ],
        )
        .await
        .unwrap();

        assert_eq!((result.total_sent, result.total_failed), (4, 1));
        assert_eq!(provider.calls(), 2);
        assert_eq!(
            result.total_sent + result.total_failed,
            result
                .recipients
                .iter()
                .map(|recipient| recipient.sent + recipient.failed)
                .sum::<u64>()
        );
    }

    #[tokio::test]
    async fn empty_batch_is_rejected_before_any_send() {
        let store = InMemoryTokenStore::default();
        let provider = ScriptedPushProvider::default();

        let result = dispatch(&store, Some(&provider), BASE_URL, vec![]).await;

        assert!(matches!(result, Err(AppError::InvalidRequest(_))));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn registration_during_send_survives_cleanup() {
        let store = Arc::new(InMemoryTokenStore::with_tokens(vec![("A", vec!["T1", "T2"])]));
        let provider = ScriptedPushProvider::default()
            .with_outcome("T2", not_registered())
            .registering_during_send(store.clone(), "A", "T3");

        dispatch(
            store.as_ref(),
            Some(&provider),
            BASE_URL,
            vec![request("A", "order-1", OrderStatus::OutForDelivery)],
        )
        .await
        .unwrap();

        assert_eq!(store.tokens_of("A"), vec![token("T1"), token("T3")]);
    }

    #[tokio::test]
    async fn transient_failures_keep_tokens() {
        let store = InMemoryTokenStore::with_tokens(vec![("A", vec!["T1", "T2"])]);
        let provider = ScriptedPushProvider::default()
            .with_outcome("T1", DeliveryOutcome::TransientFailure("UNAVAILABLE".to_string()))
            .with_outcome("T2", DeliveryOutcome::TransientFailure("INTERNAL".to_string()));

        let result = dispatch(
            &store,
            Some(&provider),
            BASE_URL,
            vec![request("A", "order-1", OrderStatus::Cancelled)],
        )
        .await
        .unwrap();

        assert_eq!((result.total_sent, result.total_failed), (0, 2));
        assert_eq!(result.recipients[0].outcome, RecipientOutcome::FullyFailed);
        assert_eq!(store.tokens_of("A"), vec![token("T1"), token("T2")]);
    }

    #[tokio::test]
    async fn lookup_error_counts_one_failure_without_affecting_siblings() {
        let store = InMemoryTokenStore::with_tokens(vec![("ok", vec!["T1"])])
            .failing_lookup_for("broken");
        let provider = ScriptedPushProvider::default();

        let result = dispatch(
            &store,
            Some(&provider),
            BASE_URL,
            vec![
                request("broken", "order-1", OrderStatus::Confirmed),
                request("ok", "order-2", OrderStatus::Confirmed),
            ],
        )
        .await
        .unwrap();

        assert_eq!((result.total_sent, result.total_failed), (1, 1));
        assert!(matches!(
            result.recipients[0].outcome,
            RecipientOutcome::Errored(_)
        ));
        assert_eq!(result.recipients[1].outcome, RecipientOutcome::Sent);
    }

    #[tokio::test]
    async fn send_error_counts_every_resolved_token() {
        let store = InMemoryTokenStore::with_tokens(vec![("A", vec!["T1", "T2", "T3"])]);
        let provider = ScriptedPushProvider::default()
            .failing_sends(AppError::ExternalAPICallError("connection refused".to_string()));

        let result = dispatch(
            &store,
            Some(&provider),
            BASE_URL,
            vec![request("A", "order-1", OrderStatus::Confirmed)],
        )
        .await
        .unwrap();

        assert_eq!((result.total_sent, result.total_failed), (0, 3));
        assert_eq!(store.tokens_of("A").len(), 3);
    }

    #[tokio::test]
    async fn failed_cleanup_leaves_counts_unchanged() {
        let store =
            InMemoryTokenStore::with_tokens(vec![("A", vec!["T1", "T2"])]).failing_removals();
        let provider = ScriptedPushProvider::default().with_outcome(
            "T1",
            DeliveryOutcome::PermanentFailure(PermanentFailureReason::InvalidToken),
        );

        let result = dispatch(
            &store,
            Some(&provider),
            BASE_URL,
            vec![request("A", "order-1", OrderStatus::Confirmed)],
        )
        .await
        .unwrap();

        assert_eq!((result.total_sent, result.total_failed), (1, 1));
        assert_eq!(store.tokens_of("A").len(), 2);
    }

    #[tokio::test]
    async fn provider_failures_abort_the_whole_batch() {
        let store = InMemoryTokenStore::with_tokens(vec![("A", vec!["T1"])]);
        let provider = ScriptedPushProvider::default()
            .not_ready(AppError::PushProviderAuthFailed("invalid_grant".to_string()));

        let result = dispatch(
            &store,
            Some(&provider),
            BASE_URL,
            vec![request("A", "order-1", OrderStatus::Confirmed)],
        )
        .await;
        assert!(matches!(result, Err(AppError::PushProviderAuthFailed(_))));
        assert_eq!(provider.calls(), 0);

        let result = dispatch(
            &store,
            None,
            BASE_URL,
            vec![request("A", "order-1", OrderStatus::Confirmed)],
        )
        .await;
        assert!(matches!(result, Err(AppError::PushProviderUnavailable(_))));
    }

    #[tokio::test]
    async fn notify_maps_missing_tokens_to_not_found() {
        let data = app_state(InMemoryTokenStore::default(), ScriptedPushProvider::default());

        let result = notify(
            data,
            NotifyRequest {
                user_id: Some("nobody".to_string()),
                order_id: Some("order-1".to_string()),
                status: Some("Confirmed".to_string()),
            },
        )
        .await;

        assert_eq!(
            result,
            Err(AppError::NoDeliverableEndpoint("nobody".to_string()))
        );
    }

    #[tokio::test]
    async fn notify_reports_single_recipient_counts() {
        let data = app_state(
            InMemoryTokenStore::with_tokens(vec![("A", vec!["T1", "T2"])]),
            ScriptedPushProvider::default().with_outcome("T2", not_registered()),
        );

        let result = notify(
            data,
            NotifyRequest {
                user_id: Some("A".to_string()),
                order_id: Some("order-1".to_string()),
                status: Some("Delivered".to_string()),
            },
        )
        .await;

        assert_eq!(
            result,
            Ok(NotifyResponse {
                success: true,
                sent: 1,
                failed: 1
            })
        );
    }

    #[tokio::test]
    async fn save_token_merges_into_existing_set() {
        let store = Arc::new(InMemoryTokenStore::with_tokens(vec![("A", vec!["T1"])]));
        let data = app_state_with(store.clone(), ScriptedPushProvider::default());

        for _ in 0..2 {
            save_token(
                data.clone(),
                SaveTokenRequest {
                    user_id: Some("A".to_string()),
                    token: Some("T2".to_string()),
                },
            )
            .await
            .unwrap();
        }

        assert_eq!(store.tokens_of("A"), vec![token("T1"), token("T2")]);

        let result = save_token(
            data,
            SaveTokenRequest {
                user_id: Some("A".to_string()),
                token: None,
            },
        )
        .await;
        assert!(matches!(result, Err(AppError::InvalidRequest(_))));
    }
}
