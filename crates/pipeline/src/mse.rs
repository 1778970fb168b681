//! Cisco MSE streaming notification converter
//!
//! HTTP listeners configured with `decode_as = "mse"` receive whole MSE
//! documents instead of a JSON record stream. Two layouts exist:
//!
//! ```json
//! {"StreamingNotification": {"subscriptionName": "rb-loc", "deviceId": "00:1c:..", "location": {"macAddress": "00:1c:.."}}}
//! {"notifications": [{"subscriptionName": "rb-assoc", "deviceId": "00:1c:.."}]}
//! ```
//!
//! The first becomes one record (the whole document), the second one record
//! per notification.

use serde_json::Value;

use crate::error::MseError;
use crate::mac::MacAddress;

/// One converted notification
#[derive(Debug, Clone, PartialEq)]
pub struct MseRecord {
    /// Record to publish
    pub value: Value,
    /// Client MAC, used as partition key
    pub client_mac: Option<u64>,
    /// Subscription the notification belongs to
    pub subscription: Option<String>,
}

/// Convert a complete MSE body into records
///
/// # Errors
///
/// Fails when the body is not JSON or has neither known layout.
pub fn convert(body: &[u8]) -> Result<Vec<MseRecord>, MseError> {
    let document: Value = serde_json::from_slice(body)?;

    if let Some(notification) = document.get("StreamingNotification") {
        let client_mac = client_mac(notification);
        let subscription = subscription(notification);
        return Ok(vec![MseRecord {
            value: document,
            client_mac,
            subscription,
        }]);
    }

    let Some(Value::Array(notifications)) = document.get("notifications") else {
        return Err(MseError::MissingNotification);
    };

    Ok(notifications
        .iter()
        .filter(|n| n.is_object())
        .map(|n| MseRecord {
            value: n.clone(),
            client_mac: client_mac(n),
            subscription: subscription(n),
        })
        .collect())
}

fn client_mac(notification: &Value) -> Option<u64> {
    notification
        .pointer("/location/macAddress")
        .or_else(|| notification.get("deviceId"))
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<MacAddress>().ok())
        .map(MacAddress::as_u64)
}

fn subscription(notification: &Value) -> Option<String> {
    notification
        .get("subscriptionName")
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_streaming_notification() {
        let body = json!({
            "StreamingNotification": {
                "subscriptionName": "rb-loc",
                "entity": "WIRELESS_CLIENTS",
                "deviceId": "00:00:00:00:00:01",
                "location": {"macAddress": "54:26:96:db:88:01", "ipAddress": ["10.0.0.1"]}
            }
        });

        let records = convert(body.to_string().as_bytes()).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].value, body);
        assert_eq!(records[0].client_mac, Some(0x5426_96db_8801));
        assert_eq!(records[0].subscription.as_deref(), Some("rb-loc"));
    }

    #[test]
    fn test_notifications_array() {
        let body = br#"{"notifications": [
            {"subscriptionName": "rb-assoc", "deviceId": "54:26:96:db:88:02", "associated": true},
            "garbage",
            {"deviceId": "not-a-mac"}
        ]}"#;

        let records = convert(body).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].client_mac, Some(0x5426_96db_8802));
        assert_eq!(records[0].subscription.as_deref(), Some("rb-assoc"));
        assert_eq!(records[0].value["associated"], json!(true));
        assert_eq!(records[1].client_mac, None);
        assert_eq!(records[1].subscription, None);
    }

    #[test]
    fn test_invalid_bodies() {
        assert!(matches!(convert(b"{\"notifications\""), Err(MseError::Parse(_))));
        assert!(matches!(convert(b"{\"other\": 1}"), Err(MseError::MissingNotification)));
        assert!(matches!(
            convert(b"{\"notifications\": {}}"),
            Err(MseError::MissingNotification)
        ));
    }
}
