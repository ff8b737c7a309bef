use ethers::types::{Address, Bytes, U64, U256};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Version string sent with every `wallet_sendCalls` request
pub const SEND_CALLS_VERSION: &str = "1.0";

/// One on-chain call inside a batch
///
/// Order within a batch matters: an allowance approval must precede the call
/// that spends the approved allowance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallDescriptor {
    pub to: Address,
    pub data: Bytes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<U256>,
}

impl CallDescriptor {
    pub fn new(to: Address, data: Bytes) -> Self {
        Self { to, data, value: None }
    }

    /// Attach an explicit native value (serialized as a hex quantity)
    pub fn with_value(mut self, value: U256) -> Self {
        self.value = Some(value);
        self
    }
}

/// Parameters of a single `wallet_sendCalls` request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    pub version: String,
    pub chain_id: U64,
    pub from: Address,
    pub calls: Vec<CallDescriptor>,
    pub atomic_required: bool,
    pub capabilities: Capabilities,
}

/// Wallet capabilities requested alongside a batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    /// Third-party gas sponsorship
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_service: Option<PaymasterService>,
    /// Out-of-band collection of user attributes (email, name, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_callback: Option<DataCallback>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymasterService {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataCallback {
    pub requests: Vec<DataRequest>,
}

impl DataCallback {
    /// Request every named attribute as mandatory
    pub fn required<I, S>(kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            requests: kinds
                .into_iter()
                .map(|kind| DataRequest { kind: kind.into(), optional: false })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub optional: bool,
}

/// Response to `wallet_sendCalls`
///
/// Older wallets answer with the bare bundle id, newer ones with an object
/// that may also carry the data-callback attributes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SendCallsResponse {
    Id(String),
    Detailed {
        #[serde(alias = "callsId")]
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        capabilities: Option<ResponseCapabilities>,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseCapabilities {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_callback: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Identifier of a submitted batch, used to poll its status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchHandle {
    pub calls_id: String,
    /// Attributes returned by the data callback, if one was requested
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl From<SendCallsResponse> for BatchHandle {
    fn from(response: SendCallsResponse) -> Self {
        match response {
            SendCallsResponse::Id(calls_id) => Self { calls_id, attributes: Default::default() },
            SendCallsResponse::Detailed { id, capabilities } => Self {
                calls_id: id,
                attributes: capabilities.and_then(|c| c.data_callback).unwrap_or_default(),
            },
        }
    }
}

/// Status of a submitted batch as reported by `wallet_getCallsStatus`
///
/// Wallets report either the numeric codes (`100`, `200`, ...) or the
/// upper-case names; both decode to the same variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchStatus {
    Pending,
    Confirmed,
    /// Failed offchain
    Failed,
    /// Reverted fully onchain
    Reverted,
    PartiallyReverted,
    /// Anything the wallet reports that we do not recognise
    Unknown(String),
}

impl BatchStatus {
    pub fn from_code(code: u64) -> Self {
        match code {
            100 => Self::Pending,
            200 => Self::Confirmed,
            300 => Self::Failed,
            400 => Self::Reverted,
            500 => Self::PartiallyReverted,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "PENDING" => Self::Pending,
            "CONFIRMED" => Self::Confirmed,
            "FAILED" => Self::Failed,
            "REVERTED" => Self::Reverted,
            "PARTIALLY_REVERTED" => Self::PartiallyReverted,
            _ => Self::Unknown(name.to_string()),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "PENDING",
            Self::Confirmed => "CONFIRMED",
            Self::Failed => "FAILED",
            Self::Reverted => "REVERTED",
            Self::PartiallyReverted => "PARTIALLY_REVERTED",
            Self::Unknown(raw) => raw,
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for BatchStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for BatchStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Code(u64),
            Name(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Code(code) => Self::from_code(code),
            Raw::Name(name) => Self::from_name(&name),
        })
    }
}

/// Receipt of a transaction that carried (part of) a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub transaction_hash: String,
    /// Logs exactly as the wallet reported them
    #[serde(default)]
    pub logs: Vec<serde_json::Value>,
}

/// Result of `wallet_getCallsStatus`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallsStatus {
    pub status: BatchStatus,
    #[serde(default)]
    pub receipts: Vec<Receipt>,
}

/// Identifier of the business record a batch belongs to (booking, event type)
///
/// Passed through exactly as the view process supplied it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Number(u64),
    Text(String),
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Number(n) => write!(f, "{}", n),
            RecordId::Text(s) => f.write_str(s),
        }
    }
}

/// Which hook flow a batch belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchKind {
    BookingCreated,
    BookingCompleted,
    EventTypeCreated,
}

impl BatchKind {
    /// Event name reported to the result sink on success
    pub fn success_event(&self) -> &'static str {
        match self {
            BatchKind::BookingCreated => "booking_txhash_event",
            BatchKind::BookingCompleted => "booking_completed_txhash_event",
            BatchKind::EventTypeCreated => "txhash_event",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BatchKind::BookingCreated => "booking_created",
            BatchKind::BookingCompleted => "booking_completed",
            BatchKind::EventTypeCreated => "event_created",
        }
    }
}

/// Booking was created server-side; the user pays for it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingCreated {
    pub user_wallet_address: Address,
    pub booking_id: RecordId,
    /// Booking contract
    pub to: Address,
    /// Calldata of the booking call
    pub data: Bytes,
    /// Token amount the booking contract will pull
    #[serde(deserialize_with = "amount::deserialize")]
    pub price_at_booking: U256,
}

/// Booking was completed server-side; the user confirms it on-chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingCompleted {
    pub user_wallet_address: Address,
    pub booking_id: RecordId,
    pub to: Address,
    pub data: Bytes,
}

/// A partner created an event type that has to be registered on-chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventTypeCreated {
    pub partner_wallet_address: Address,
    pub event_type_id: RecordId,
    pub to: Address,
    pub data: Bytes,
}

/// Server-pushed event that starts a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum HookEvent {
    BookingCreated(BookingCreated),
    BookingCompleted(BookingCompleted),
    #[serde(rename = "event_created")]
    EventTypeCreated(EventTypeCreated),
}

impl HookEvent {
    pub fn kind(&self) -> BatchKind {
        match self {
            HookEvent::BookingCreated(_) => BatchKind::BookingCreated,
            HookEvent::BookingCompleted(_) => BatchKind::BookingCompleted,
            HookEvent::EventTypeCreated(_) => BatchKind::EventTypeCreated,
        }
    }

    pub fn record_id(&self) -> &RecordId {
        match self {
            HookEvent::BookingCreated(e) => &e.booking_id,
            HookEvent::BookingCompleted(e) => &e.booking_id,
            HookEvent::EventTypeCreated(e) => &e.event_type_id,
        }
    }

    /// Wallet that signs the batch
    pub fn from_address(&self) -> Address {
        match self {
            HookEvent::BookingCreated(e) => e.user_wallet_address,
            HookEvent::BookingCompleted(e) => e.user_wallet_address,
            HookEvent::EventTypeCreated(e) => e.partner_wallet_address,
        }
    }
}

/// Token amounts arrive as JSON numbers, decimal strings or hex quantities.
mod amount {
    use ethers::types::U256;
    use serde::{Deserialize, Deserializer, de::Error};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(U256::from(n)),
            Raw::Text(s) => match s.strip_prefix("0x") {
                Some(hex) => U256::from_str_radix(hex, 16).map_err(D::Error::custom),
                None => U256::from_dec_str(&s).map_err(D::Error::custom),
            },
        }
    }
}
