//! Value Objects for channel integration

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Marketplace identifier. The set of channels is closed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChannelId {
    #[serde(rename = "naver")]
    Naver,
    #[serde(rename = "coupang")]
    Coupang,
    #[serde(rename = "29cm")]
    TwentyNineCm,
    #[serde(rename = "ohouse")]
    Ohouse,
    #[serde(rename = "cjonstyle")]
    CjOnstyle,
    #[serde(rename = "kakao")]
    Kakao,
    #[serde(rename = "imweb")]
    Imweb,
    #[serde(rename = "toss")]
    Toss,
}

impl ChannelId {
    pub const ALL: [ChannelId; 8] = [
        Self::Naver, Self::Coupang, Self::TwentyNineCm, Self::Ohouse,
        Self::CjOnstyle, Self::Kakao, Self::Imweb, Self::Toss,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Naver => "naver",
            Self::Coupang => "coupang",
            Self::TwentyNineCm => "29cm",
            Self::Ohouse => "ohouse",
            Self::CjOnstyle => "cjonstyle",
            Self::Kakao => "kakao",
            Self::Imweb => "imweb",
            Self::Toss => "toss",
        }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for ChannelId {
    type Err = UnknownChannel;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        Self::ALL.into_iter().find(|id| id.as_str() == s).ok_or(UnknownChannel(s))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub struct UnknownChannel(pub String);
impl std::error::Error for UnknownChannel {}
impl fmt::Display for UnknownChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "unknown channel '{}'", self.0) }
}

/// How a channel authenticates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType { Oauth, Api, Webhook }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelStatus {
    Connected,
    Pending,
    #[default]
    Disconnected,
    Error,
}

impl ChannelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Pending => "pending",
            Self::Disconnected => "disconnected",
            Self::Error => "error",
        }
    }
}

impl FromStr for ChannelStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "connected" => Ok(Self::Connected),
            "pending" => Ok(Self::Pending),
            "disconnected" => Ok(Self::Disconnected),
            "error" => Ok(Self::Error),
            other => Err(format!("invalid channel status '{other}'")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncType { Products, Orders, Inventory }

impl SyncType {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Products => "products", Self::Orders => "orders", Self::Inventory => "inventory" }
    }
}

impl FromStr for SyncType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "products" => Ok(Self::Products),
            "orders" => Ok(Self::Orders),
            "inventory" => Ok(Self::Inventory),
            other => Err(format!("invalid sync type '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn test_channel_id_parse() {
        assert_eq!("Coupang".parse::<ChannelId>().unwrap(), ChannelId::Coupang);
        assert_eq!("29cm".parse::<ChannelId>().unwrap(), ChannelId::TwentyNineCm);
        assert!("amazon".parse::<ChannelId>().is_err());
    }
    #[test]
    fn test_channel_id_serde_matches_display() {
        for id in ChannelId::ALL {
            let json = serde_json::to_string(&id).unwrap();
            assert_eq!(json, format!("\"{id}\""));
        }
    }
}
