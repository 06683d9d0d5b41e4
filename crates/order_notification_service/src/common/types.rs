/*  Copyright 2022-23, Juspay India Pvt Ltd
    This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

pub use crate::environment::AppState;

#[derive(Deserialize, Serialize, Clone, Debug, Eq, Hash, PartialEq)]
pub struct UserId(pub String);
#[derive(Deserialize, Serialize, Clone, Debug, Eq, Hash, PartialEq)]
pub struct OrderId(pub String);
#[derive(Deserialize, Serialize, Clone, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct PushToken(pub String);

#[derive(Debug, Clone, Copy, EnumString, Display, Serialize, Deserialize, Eq, Hash, PartialEq)]
pub enum OrderStatus {
    #[strum(serialize = "Requested")]
    #[serde(rename = "Requested")]
    Requested,
    #[strum(serialize = "Confirmed")]
    #[serde(rename = "Confirmed")]
    Confirmed,
    #[strum(serialize = "Out for Delivery")]
    #[serde(rename = "Out for Delivery")]
    OutForDelivery,
    #[strum(serialize = "Delivered")]
    #[serde(rename = "Delivered")]
    Delivered,
    #[strum(serialize = "Cancelled")]
    #[serde(rename = "Cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NotificationRequest {
    pub user_id: UserId,
    pub order_id: OrderId,
    pub status: OrderStatus,
}

/// What a recipient's devices get shown for one order status change.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
    pub link: Option<String>,
}

#[derive(Debug, Clone, Copy, Display, Eq, PartialEq)]
pub enum PermanentFailureReason {
    InvalidToken,
    NotRegistered,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryOutcome {
    Delivered,
    PermanentFailure(PermanentFailureReason),
    TransientFailure(String),
}

impl DeliveryOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            DeliveryOutcome::Delivered => "DELIVERED",
            DeliveryOutcome::PermanentFailure(_) => "PERMANENT_FAILURE",
            DeliveryOutcome::TransientFailure(_) => "TRANSIENT_FAILURE",
        }
    }
}

/// Per token outcomes of one multicast send, in the order the tokens were submitted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MulticastResponse {
    pub responses: Vec<(PushToken, DeliveryOutcome)>,
}

impl MulticastResponse {
    pub fn success_count(&self) -> u64 {
        self.responses
            .iter()
            .filter(|(_, outcome)| *outcome == DeliveryOutcome::Delivered)
            .count() as u64
    }

    pub fn failure_count(&self) -> u64 {
        self.responses.len() as u64 - self.success_count()
    }

    /// Tokens the provider will never deliver to again.
    pub fn stale_tokens(&self) -> Vec<PushToken> {
        self.responses
            .iter()
            .filter(|(_, outcome)| matches!(outcome, DeliveryOutcome::PermanentFailure(_)))
            .map(|(token, _)| token.to_owned())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecipientOutcome {
    NotFound,
    Sent,
    PartiallySent,
    FullyFailed,
    Errored(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecipientDispatch {
    pub user_id: UserId,
    pub order_id: OrderId,
    pub sent: u64,
    pub failed: u64,
    pub outcome: RecipientOutcome,
}

impl RecipientDispatch {
    pub fn not_found(request: NotificationRequest) -> Self {
        Self {
            user_id: request.user_id,
            order_id: request.order_id,
            sent: 0,
            failed: 1,
            outcome: RecipientOutcome::NotFound,
        }
    }

    pub fn errored(request: NotificationRequest, failed: u64, reason: String) -> Self {
        Self {
            user_id: request.user_id,
            order_id: request.order_id,
            sent: 0,
            failed,
            outcome: RecipientOutcome::Errored(reason),
        }
    }

    pub fn delivered(request: NotificationRequest, sent: u64, failed: u64) -> Self {
        let outcome = match (sent, failed) {
            (_, 0) => RecipientOutcome::Sent,
            (0, _) => RecipientOutcome::FullyFailed,
            _ => RecipientOutcome::PartiallySent,
        };
        Self {
            user_id: request.user_id,
            order_id: request.order_id,
            sent,
            failed,
            outcome,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchResult {
    pub total_sent: u64,
    pub total_failed: u64,
    pub recipients: Vec<RecipientDispatch>,
}

impl From<Vec<RecipientDispatch>> for DispatchResult {
    fn from(recipients: Vec<RecipientDispatch>) -> Self {
        let (total_sent, total_failed) = recipients
            .iter()
            .fold((0, 0), |(sent, failed), recipient| {
                (sent + recipient.sent, failed + recipient.failed)
            });
        Self {
            total_sent,
            total_failed,
            recipients,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct APISuccess {
    result: String,
}

impl Default for APISuccess {
    fn default() -> Self {
        Self {
            result: "Success".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn request(user_id: &str) -> NotificationRequest {
        NotificationRequest {
            user_id: UserId(user_id.to_string()),
            order_id: OrderId("order-1".to_string()),
            status: OrderStatus::Confirmed,
        }
    }

    #[test]
    fn order_status_uses_display_labels() {
        assert_eq!(OrderStatus::OutForDelivery.to_string(), "Out for Delivery");
        assert_eq!(
            OrderStatus::from_str("Out for Delivery"),
            Ok(OrderStatus::OutForDelivery)
        );
        assert!(OrderStatus::from_str("Shipped").is_err());
        assert_eq!(
            serde_json::from_str::<OrderStatus>(r#""Cancelled""#).unwrap(),
            OrderStatus::Cancelled
        );
    }

    #[test]
    fn multicast_response_counts_and_stale_tokens() {
        let response = MulticastResponse {
            responses: vec![
                (PushToken("t1".to_string()), DeliveryOutcome::Delivered),
                (
                    PushToken("t2".to_string()),
                    DeliveryOutcome::PermanentFailure(PermanentFailureReason::NotRegistered),
                ),
                (
                    PushToken("t3".to_string()),
                    DeliveryOutcome::TransientFailure("UNAVAILABLE".to_string()),
                ),
            ],
        };
        assert_eq!(response.success_count(), 1);
        assert_eq!(response.failure_count(), 2);
        assert_eq!(response.stale_tokens(), vec![PushToken("t2".to_string())]);
    }

    #[test]
    fn recipient_outcome_follows_counts() {
        assert_eq!(
            RecipientDispatch::delivered(request("a"), 2, 0).outcome,
            RecipientOutcome::Sent
        );
        assert_eq!(
            RecipientDispatch::delivered(request("a"), 1, 1).outcome,
            RecipientOutcome::PartiallySent
        );
        assert_eq!(
            RecipientDispatch::delivered(request("a"), 0, 2).outcome,
            RecipientOutcome::FullyFailed
        );
    }

    #[test]
    fn dispatch_result_sums_recipients() {
        let result = DispatchResult::from(vec![
            RecipientDispatch::delivered(request("a"), 2, 0),
            RecipientDispatch::not_found(request("b")),
            RecipientDispatch::errored(request("c"), 3, "boom".to_string()),
        ]);
        assert_eq!(result.total_sent, 2);
        assert_eq!(result.total_failed, 4);
        assert_eq!(result.recipients.len(), 3);
    }
}
