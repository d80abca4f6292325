//! Channel Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;
use crate::domain::value_objects::{ChannelId, ChannelStatus, ChannelType};

/// Connection settings and state for one marketplace.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelConfig {
    pub id: ChannelId,
    pub name: String,
    pub description: Option<String>,
    pub status: ChannelStatus,
    pub last_sync: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    #[serde(flatten)]
    pub credentials: Credentials,
}

/// Credentials, discriminated by the channel's auth type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Credentials {
    Oauth(OAuthCredentials),
    Api(ApiKeyCredentials),
    Webhook(WebhookCredentials),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthCredentials {
    #[serde(default)] pub client_id: String,
    #[serde(default)] pub client_secret: String,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyCredentials {
    #[serde(default)] pub access_key: String,
    #[serde(default)] pub secret_key: String,
    #[serde(default)] pub vendor_id: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookCredentials {
    #[serde(default)] pub webhook_url: String,
    pub secret_key: Option<String>,
}

/// Partial update of a channel config. Absent fields are left untouched and
/// fields that do not belong to the channel's credential variant are ignored.
#[derive(Clone, Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChannelConfigPatch {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    #[validate(length(max = 500))]
    pub description: Option<String>,
    #[validate(length(max = 256))]
    pub client_id: Option<String>,
    #[validate(length(max = 256))]
    pub client_secret: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    #[validate(length(max = 256))]
    pub access_key: Option<String>,
    #[validate(length(max = 256))]
    pub secret_key: Option<String>,
    #[validate(length(max = 64))]
    pub vendor_id: Option<String>,
    #[validate(url)]
    pub webhook_url: Option<String>,
}

fn present(value: &str) -> bool { !value.trim().is_empty() }

fn merge(target: &mut String, value: &Option<String>) {
    if let Some(v) = value { *target = v.trim().to_string(); }
}

impl ChannelConfig {
    pub fn new(id: ChannelId, name: impl Into<String>, description: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            id, name: name.into(), description: Some(description.into()),
            status: ChannelStatus::Disconnected, last_sync: None, last_error: None, credentials,
        }
    }

    pub fn channel_type(&self) -> ChannelType {
        match self.credentials {
            Credentials::Oauth(_) => ChannelType::Oauth,
            Credentials::Api(_) => ChannelType::Api,
            Credentials::Webhook(_) => ChannelType::Webhook,
        }
    }

    pub fn oauth(&self) -> Option<&OAuthCredentials> {
        match &self.credentials { Credentials::Oauth(c) => Some(c), _ => None }
    }

    pub fn oauth_mut(&mut self) -> Option<&mut OAuthCredentials> {
        match &mut self.credentials { Credentials::Oauth(c) => Some(c), _ => None }
    }

    pub fn api_key(&self) -> Option<&ApiKeyCredentials> {
        match &self.credentials { Credentials::Api(c) => Some(c), _ => None }
    }

    /// Names of the credential fields still required before this channel can connect.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        match &self.credentials {
            Credentials::Oauth(c) => {
                if !present(&c.client_id) { missing.push("clientId"); }
                if !present(&c.client_secret) { missing.push("clientSecret"); }
            }
            Credentials::Api(c) => {
                if !present(&c.access_key) { missing.push("accessKey"); }
                if !present(&c.secret_key) { missing.push("secretKey"); }
                if self.id == ChannelId::Coupang && !present(&c.vendor_id) { missing.push("vendorId"); }
            }
            Credentials::Webhook(c) => {
                if !present(&c.webhook_url) { missing.push("webhookUrl"); }
            }
        }
        missing
    }

    pub fn has_required_fields(&self) -> bool { self.missing_fields().is_empty() }

    /// Merges a partial update into this config.
    pub fn apply(&mut self, patch: &ChannelConfigPatch) {
        if let Some(name) = &patch.name { self.name = name.trim().to_string(); }
        if let Some(description) = &patch.description { self.description = Some(description.clone()); }
        match &mut self.credentials {
            Credentials::Oauth(c) => {
                merge(&mut c.client_id, &patch.client_id);
                merge(&mut c.client_secret, &patch.client_secret);
                if patch.access_token.is_some() { c.access_token = patch.access_token.clone(); }
                if patch.refresh_token.is_some() { c.refresh_token = patch.refresh_token.clone(); }
            }
            Credentials::Api(c) => {
                merge(&mut c.access_key, &patch.access_key);
                merge(&mut c.secret_key, &patch.secret_key);
                merge(&mut c.vendor_id, &patch.vendor_id);
            }
            Credentials::Webhook(c) => {
                merge(&mut c.webhook_url, &patch.webhook_url);
                if patch.secret_key.is_some() { c.secret_key = patch.secret_key.clone(); }
            }
        }
    }

    /// Status after a credentials save: `pending` once complete, otherwise `disconnected`.
    pub fn settle_after_save(&mut self) {
        self.status = if self.has_required_fields() { ChannelStatus::Pending } else { ChannelStatus::Disconnected };
    }

    /// Moves to `connected`. An incomplete config is put in `error` instead.
    pub fn mark_connected(&mut self, at: DateTime<Utc>) -> bool {
        if !self.has_required_fields() {
            self.mark_error(format!("missing required fields: {}", self.missing_fields().join(", ")));
            return false;
        }
        self.status = ChannelStatus::Connected;
        self.last_sync = Some(at);
        self.last_error = None;
        true
    }

    pub fn mark_error(&mut self, message: impl Into<String>) {
        self.status = ChannelStatus::Error;
        self.last_error = Some(message.into());
    }
}

/// The fixed list of supported marketplaces, seeded at startup.
pub fn default_channels() -> Vec<ChannelConfig> {
    let oauth = || Credentials::Oauth(OAuthCredentials::default());
    let api = || Credentials::Api(ApiKeyCredentials::default());
    let webhook = || Credentials::Webhook(WebhookCredentials::default());
    vec![
        ChannelConfig::new(ChannelId::Naver, "Naver Smart Store", "Product and order management through Naver Smart Store", oauth()),
        ChannelConfig::new(ChannelId::Coupang, "Coupang", "Sales management through the Coupang Wing seller API", api()),
        ChannelConfig::new(ChannelId::TwentyNineCm, "29CM", "Fashion catalogue sales on 29CM", webhook()),
        ChannelConfig::new(ChannelId::Ohouse, "Ohouse", "Home and interior goods on Ohouse", webhook()),
        ChannelConfig::new(ChannelId::CjOnstyle, "CJ OnStyle", "TV shopping through CJ OnStyle", api()),
        ChannelConfig::new(ChannelId::Kakao, "KakaoTalk Store", "Social commerce through KakaoTalk Store", oauth()),
        ChannelConfig::new(ChannelId::Imweb, "imweb", "imweb storefront integration", api()),
        ChannelConfig::new(ChannelId::Toss, "Toss Shopping", "Toss Shopping with simple payment", api()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coupang(ak: &str, sk: &str, vendor: &str) -> ChannelConfig {
        ChannelConfig::new(ChannelId::Coupang, "Coupang", "", Credentials::Api(ApiKeyCredentials {
            access_key: ak.into(), secret_key: sk.into(), vendor_id: vendor.into(),
        }))
    }

    #[test]
    fn test_partial_update_keeps_other_fields() {
        let mut config = coupang("AK", "SK", "V1");
        config.apply(&ChannelConfigPatch { access_key: Some("AK2".into()), ..Default::default() });
        let creds = config.api_key().unwrap();
        assert_eq!(creds.access_key, "AK2");
        assert_eq!(creds.secret_key, "SK");
        assert_eq!(creds.vendor_id, "V1");
    }

    #[test]
    fn test_required_fields_by_type() {
        assert_eq!(coupang("AK", "SK", "").missing_fields(), vec!["vendorId"]);
        let mut imweb = coupang("AK", "SK", "");
        imweb.id = ChannelId::Imweb;
        assert!(imweb.has_required_fields());

        let naver = ChannelConfig::new(ChannelId::Naver, "Naver", "", Credentials::Oauth(OAuthCredentials {
            client_id: "cid".into(), ..Default::default()
        }));
        assert_eq!(naver.missing_fields(), vec!["clientSecret"]);

        let hook = ChannelConfig::new(ChannelId::Ohouse, "Ohouse", "", Credentials::Webhook(WebhookCredentials::default()));
        assert_eq!(hook.missing_fields(), vec!["webhookUrl"]);
    }

    #[test]
    fn test_incomplete_config_cannot_connect() {
        let mut config = coupang("AK", "", "V1");
        assert!(!config.mark_connected(Utc::now()));
        assert_eq!(config.status, ChannelStatus::Error);
        assert!(config.last_sync.is_none());
    }

    #[test]
    fn test_save_moves_complete_config_to_pending() {
        let mut config = coupang("", "", "");
        config.settle_after_save();
        assert_eq!(config.status, ChannelStatus::Disconnected);
        config.apply(&ChannelConfigPatch {
            access_key: Some("AK".into()), secret_key: Some("SK".into()), vendor_id: Some("V1".into()),
            ..Default::default()
        });
        config.settle_after_save();
        assert_eq!(config.status, ChannelStatus::Pending);
    }

    #[test]
    fn test_serialized_shape_is_tagged() {
        let json = serde_json::to_value(coupang("AK", "SK", "V1")).unwrap();
        assert_eq!(json["type"], "api");
        assert_eq!(json["id"], "coupang");
        assert_eq!(json["vendorId"], "V1");
        let back: ChannelConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back.channel_type(), ChannelType::Api);
    }

    #[test]
    fn test_patch_validation_rejects_bad_webhook_url() {
        let patch = ChannelConfigPatch { webhook_url: Some("not a url".into()), ..Default::default() };
        assert!(patch.validate().is_err());
    }

    #[test]
    fn test_defaults_cover_every_channel() {
        let ids: Vec<_> = default_channels().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, ChannelId::ALL.to_vec());
    }
}
