/*  Copyright 2022-23, Juspay India Pvt Ltd
    This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/
use crate::common::types::*;

pub const STATUS_UPDATE_TITLE: &str = "Order Status Update";
const SHORT_ORDER_REFERENCE_LENGTH: usize = 6;

/// First six characters of the order id, as customers see it on their receipts.
pub fn short_order_reference(OrderId(order_id): &OrderId) -> String {
    order_id.chars().take(SHORT_ORDER_REFERENCE_LENGTH).collect()
}

/// FCM only accepts HTTPS links for web push, so other base urls yield no link.
pub fn track_order_link(public_base_url: &str) -> Option<String> {
    public_base_url
        .starts_with("https://")
        .then(|| format!("{}/track-order", public_base_url.trim_end_matches('/')))
}

pub fn build_status_update_payload(
    order_id: &OrderId,
    status: OrderStatus,
    public_base_url: &str,
) -> NotificationPayload {
    NotificationPayload {
        title: STATUS_UPDATE_TITLE.to_string(),
        body: format!(
            "The status of your order #{} is now: {status}",
            short_order_reference(order_id)
        ),
        link: track_order_link(public_base_url),
    }
}

/// Rejects absent or blank request fields with a message naming the field.
pub fn require_non_empty(field: &str, value: Option<String>) -> Result<String, String> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(format!("Missing or empty field : {field}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_reference_takes_six_characters() {
        assert_eq!(
            short_order_reference(&OrderId("a1b2c3d4e5".to_string())),
            "a1b2c3"
        );
        assert_eq!(short_order_reference(&OrderId("abc".to_string())), "abc");
        assert_eq!(
            short_order_reference(&OrderId("ऑर्डरआईडी".to_string())).chars().count(),
            6
        );
    }

    #[test]
    fn payload_matches_storefront_wording() {
        let payload = build_status_update_payload(
            &OrderId("XYZ98765".to_string()),
            OrderStatus::OutForDelivery,
            "https://muralieggs.example/",
        );
        assert_eq!(payload.title, "Order Status Update");
        assert_eq!(
            payload.body,
            "The status of your order #XYZ987 is now: Out for Delivery"
        );
        assert_eq!(
            payload.link.as_deref(),
            Some("https://muralieggs.example/track-order")
        );
    }

    #[test]
    fn plain_http_base_url_sends_no_link() {
        let payload = build_status_update_payload(
            &OrderId("XYZ98765".to_string()),
            OrderStatus::Delivered,
            "http://localhost:5173",
        );
        assert_eq!(payload.link, None);
    }

    #[test]
    fn blank_fields_are_rejected() {
        assert!(require_non_empty("userId", None).is_err());
        assert!(require_non_empty("userId", Some("  ".to_string())).is_err());
        assert_eq!(
            require_non_empty("userId", Some("u1".to_string())),
            Ok("u1".to_string())
        );
    }
}
