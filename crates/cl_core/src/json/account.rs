use serde::{Deserialize, Serialize};

/// Session credentials produced by the external authenticator. The
/// launcher only reads this; tokens are redacted on every log surface.
/// Keys beyond the ones below are ignored.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Credential {
    pub name: String,
    pub uuid: String,
    pub access_token: String,
    #[serde(default)]
    pub client_token: String,
    #[serde(default)]
    pub user_properties: Option<serde_json::Value>,
    #[serde(default)]
    pub meta: Option<CredentialMeta>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct CredentialMeta {
    pub r#type: Option<String>,
    pub xuid: Option<String>,
}

impl Credential {
    /// Account flavor used for `${user_type}`.
    #[must_use]
    pub fn user_type(&self) -> &str {
        self.meta
            .as_ref()
            .and_then(|m| m.r#type.as_deref())
            .unwrap_or("msa")
    }

    #[must_use]
    pub fn xuid(&self) -> &str {
        self.meta
            .as_ref()
            .and_then(|m| m.xuid.as_deref())
            .unwrap_or("0")
    }

    #[must_use]
    pub fn user_properties_json(&self) -> String {
        self.user_properties
            .as_ref()
            .map_or_else(|| "{}".to_owned(), ToString::to_string)
    }

    /// Every value that must never appear on a log surface.
    #[must_use]
    pub fn sensitive_values(&self) -> Vec<&str> {
        let mut values = vec![
            self.access_token.as_str(),
            self.client_token.as_str(),
            self.uuid.as_str(),
        ];
        if let Some(xuid) = self.meta.as_ref().and_then(|m| m.xuid.as_deref()) {
            values.push(xuid);
        }
        values.retain(|v| !v.is_empty());
        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extra_keys_are_ignored() {
        let json = r#"{
            "name": "Steve", "uuid": "u-u-i-d", "access_token": "tok",
            "client_token": "ct", "user_properties": {},
            "meta": {"type": "msa", "xuid": "123", "demo": false},
            "some_future_key": 42
        }"#;
        let c: Credential = serde_json::from_str(json).unwrap();
        assert_eq!(c.name, "Steve");
        assert_eq!(c.user_type(), "msa");
        assert_eq!(c.xuid(), "123");
    }

    #[test]
    fn defaults_when_meta_absent() {
        let json = r#"{"name": "Alex", "uuid": "u", "access_token": "t"}"#;
        let c: Credential = serde_json::from_str(json).unwrap();
        assert_eq!(c.user_type(), "msa");
        assert_eq!(c.xuid(), "0");
        assert_eq!(c.user_properties_json(), "{}");
        assert_eq!(c.sensitive_values(), vec!["t", "u"]);
    }
}
