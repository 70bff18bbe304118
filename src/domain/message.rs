//! Bus message envelope, reply codes and subjects.
//!
//! Every request and every reply on the bus is a JSON-encoded `Message`.
//! Requests put the job payload (itself JSON) in `data`; replies carry the
//! result in `data`, or an error string, plus a mandatory `code`.

use serde::{Deserialize, Serialize};

use super::error::{PipelineError, Result};

/// Reply status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum Code {
    Ok,
    Blank,
    GenericError,
    ParseError,
    NotFound,
    UserError,
    UpstreamError,
    Blacklisted,
}

impl Code {
    pub const fn as_i32(self) -> i32 {
        match self {
            Self::Ok => 1,
            Self::Blank => 0,
            Self::GenericError => -1,
            Self::ParseError => -2,
            Self::NotFound => -3,
            Self::UserError => -4,
            Self::UpstreamError => -5,
            Self::Blacklisted => -6,
        }
    }

    /// Label used for metrics.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Blank => "blank",
            Self::GenericError => "generic_error",
            Self::ParseError => "parse_error",
            Self::NotFound => "not_found",
            Self::UserError => "user_error",
            Self::UpstreamError => "upstream_error",
            Self::Blacklisted => "blacklisted",
        }
    }
}

impl From<Code> for i32 {
    fn from(code: Code) -> Self {
        code.as_i32()
    }
}

impl TryFrom<i32> for Code {
    type Error = String;

    fn try_from(value: i32) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Ok),
            0 => Ok(Self::Blank),
            -1 => Ok(Self::GenericError),
            -2 => Ok(Self::ParseError),
            -3 => Ok(Self::NotFound),
            -4 => Ok(Self::UserError),
            -5 => Ok(Self::UpstreamError),
            -6 => Ok(Self::Blacklisted),
            other => Err(format!("unknown message code {other}")),
        }
    }
}

/// The single envelope used for all bus traffic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<Code>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<String>,
}

impl Message {
    /// A request envelope around an already-encoded payload.
    pub fn request(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            error: None,
            code: Some(Code::Ok),
            reply_to_id: None,
        }
    }

    /// A successful reply.
    pub fn ok(data: impl Into<String>) -> Self {
        Self::request(data)
    }

    /// A successful reply with no data ("nothing new").
    pub fn blank() -> Self {
        Self {
            data: String::new(),
            error: None,
            code: Some(Code::Ok),
            reply_to_id: None,
        }
    }

    /// An error reply.
    pub fn failure(err: &PipelineError) -> Self {
        Self {
            data: String::new(),
            error: Some(err.to_string()),
            code: Some(err.code()),
            reply_to_id: None,
        }
    }

    /// An error reply with an explicit code and message.
    pub fn with_code(code: Code, error: impl Into<String>) -> Self {
        Self {
            data: String::new(),
            error: Some(error.into()),
            code: Some(code),
            reply_to_id: None,
        }
    }

    /// Encode a serializable payload into a successful reply.
    pub fn encode<T: Serialize>(value: &T) -> Result<Self> {
        Ok(Self::ok(serde_json::to_string(value)?))
    }

    /// Build a reply from a use-case result.
    pub fn from_result<T: Serialize>(result: Result<T>) -> Self {
        match result.and_then(|v| Self::encode(&v)) {
            Ok(msg) => msg,
            Err(e) => Self::failure(&e),
        }
    }

    /// Correlate this message with a bulk request entry.
    #[must_use]
    pub fn correlated(mut self, reply_to_id: Option<String>) -> Self {
        self.reply_to_id = reply_to_id;
        self
    }

    /// Reply code, defaulting to `Blank` for envelopes that omitted it.
    pub fn code_or_blank(&self) -> Code {
        self.code.unwrap_or(Code::Blank)
    }

    pub fn is_ok(&self) -> bool {
        self.code == Some(Code::Ok)
    }

    /// Decode the `data` field of this message.
    pub fn decode_data<T: for<'de> Deserialize<'de>>(&self) -> Result<T> {
        serde_json::from_str(&self.data).map_err(|e| PipelineError::BusMalformed(e.to_string()))
    }

    /// Serialize the envelope for the transport.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse a request envelope.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| PipelineError::BusMalformed(e.to_string()))
    }

    /// Parse a reply envelope; replies must carry a code.
    pub fn reply_from_bytes(bytes: &[u8]) -> Result<Self> {
        let msg = Self::from_bytes(bytes)?;
        if msg.code.is_none() {
            return Err(PipelineError::BusMalformed(
                "reply is missing its code".to_string(),
            ));
        }
        Ok(msg)
    }
}

/// Bus subjects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subject {
    Boot,
    Status,
    Regions,
    Auctions,
    AuctionsIntake,
    AuctionsQuery,
    Owners,
    OwnersQuery,
    Items,
    ItemsQuery,
    ItemClasses,
    PriceList,
    PriceListHistory,
    PricelistsIntake,
    DownloadAuctions,
    ComputeLiveAuctions,
    ComputePricelistHistories,
    ComputeAllLiveAuctions,
    ComputeAllPricelistHistories,
    CleanupAllExpiredManifests,
    CleanupExpiredManifest,
    CleanupAllPricelistHistories,
    CleanupPricelistHistories,
    ReceiveRealms,
    SyncAllItems,
    SyncItemIcons,
    ReceiveSyncedItems,
    SessionSecret,
    RuntimeInfo,
    GenericTestErrors,
}

impl Subject {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Boot => "boot",
            Self::Status => "status",
            Self::Regions => "regions",
            Self::Auctions => "auctions",
            Self::AuctionsIntake => "auctionsIntake",
            Self::AuctionsQuery => "auctionsQuery",
            Self::Owners => "owners",
            Self::OwnersQuery => "ownersQuery",
            Self::Items => "items",
            Self::ItemsQuery => "itemsQuery",
            Self::ItemClasses => "itemClasses",
            Self::PriceList => "priceList",
            Self::PriceListHistory => "priceListHistory",
            Self::PricelistsIntake => "pricelistsIntake",
            Self::DownloadAuctions => "downloadAuctions",
            Self::ComputeLiveAuctions => "computeLiveAuctions",
            Self::ComputePricelistHistories => "computePricelistHistories",
            Self::ComputeAllLiveAuctions => "computeAllLiveAuctions",
            Self::ComputeAllPricelistHistories => "computeAllPricelistHistories",
            Self::CleanupAllExpiredManifests => "cleanupAllExpiredManifests",
            Self::CleanupExpiredManifest => "cleanupExpiredManifest",
            Self::CleanupAllPricelistHistories => "cleanupAllPricelistHistories",
            Self::CleanupPricelistHistories => "cleanupPricelistHistories",
            Self::ReceiveRealms => "receiveRealms",
            Self::SyncAllItems => "syncAllItems",
            Self::SyncItemIcons => "syncItemIcons",
            Self::ReceiveSyncedItems => "receiveSyncedItems",
            Self::SessionSecret => "sessionSecret",
            Self::RuntimeInfo => "runtimeInfo",
            Self::GenericTestErrors => "genericTestErrors",
        }
    }
}

impl std::fmt::Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
