use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Response of `GET /v1/me`. Unknown fields are kept.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct UserInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Response of `GET /v1/heartbeat`, plus the round trip measured by the client.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct RemoteHeartbeat {
    pub latency_ms: u64,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_info_keeps_unknown_fields() {
        let info: UserInfo =
            serde_json::from_str(r#"{"name": "tester", "plan": "pro"}"#).unwrap();
        assert_eq!(info.name.as_deref(), Some("tester"));
        assert_eq!(info.extra["plan"], "pro");
    }

    #[test]
    fn test_remote_heartbeat_flattens() {
        let hb = RemoteHeartbeat {
            latency_ms: 12,
            fields: serde_json::from_str(r#"{"ok": true}"#).unwrap(),
        };
        let json = serde_json::to_value(&hb).unwrap();
        assert_eq!(json["ok"], true);
        assert_eq!(json["latency_ms"], 12);
    }
}
