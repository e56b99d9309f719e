//! Event envelope carried over the real-time stream
//!
//! Wire form is one JSON object per text frame:
//! `{"type": "WALLET_UPDATE", "payload": {...}, "timestamp": 1700000000000, "source": "api"}`

use rustc_hash::FxHashSet;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Event type discriminator
///
/// Built-in types are a closed set; `Extension` names are only valid once
/// registered with an [`EventTypeRegistry`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventType {
    WalletUpdate,
    ChoreUpdate,
    TransactionUpdate,
    KidUpdate,
    AllowanceUpdate,
    GoalUpdate,
    ProfileUpdate,
    Extension(String),
}

impl EventType {
    pub const BUILTIN: [EventType; 7] = [
        EventType::WalletUpdate,
        EventType::ChoreUpdate,
        EventType::TransactionUpdate,
        EventType::KidUpdate,
        EventType::AllowanceUpdate,
        EventType::GoalUpdate,
        EventType::ProfileUpdate,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            EventType::WalletUpdate => "WALLET_UPDATE",
            EventType::ChoreUpdate => "CHORE_UPDATE",
            EventType::TransactionUpdate => "TRANSACTION_UPDATE",
            EventType::KidUpdate => "KID_UPDATE",
            EventType::AllowanceUpdate => "ALLOWANCE_UPDATE",
            EventType::GoalUpdate => "GOAL_UPDATE",
            EventType::ProfileUpdate => "PROFILE_UPDATE",
            EventType::Extension(name) => name,
        }
    }

    /// Map a wire name onto a built-in type, if it is one
    fn builtin(name: &str) -> Option<Self> {
        Some(match name {
            "WALLET_UPDATE" => EventType::WalletUpdate,
            "CHORE_UPDATE" => EventType::ChoreUpdate,
            "TRANSACTION_UPDATE" => EventType::TransactionUpdate,
            "KID_UPDATE" => EventType::KidUpdate,
            "ALLOWANCE_UPDATE" => EventType::AllowanceUpdate,
            "GOAL_UPDATE" => EventType::GoalUpdate,
            "PROFILE_UPDATE" => EventType::ProfileUpdate,
            _ => return None,
        })
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EventType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Set of event type names accepted for delivery
#[derive(Debug, Clone, Default)]
pub struct EventTypeRegistry {
    extensions: FxHashSet<String>,
}

impl EventTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the given extension names added to the built-in set
    pub fn with_extensions<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut registry = Self::new();
        for name in names {
            registry.register(name);
        }
        registry
    }

    /// Register a host-specific event type. Built-in names are ignored.
    pub fn register(&mut self, name: impl Into<String>) {
        let name = name.into();
        if EventType::builtin(&name).is_none() && !name.is_empty() {
            self.extensions.insert(name);
        }
    }

    /// Resolve a wire name, returning `None` for unregistered names
    pub fn resolve(&self, name: &str) -> Option<EventType> {
        if let Some(builtin) = EventType::builtin(name) {
            return Some(builtin);
        }
        self.extensions.contains(name).then(|| EventType::Extension(name.to_string()))
    }

    pub fn extension_count(&self) -> usize {
        self.extensions.len()
    }
}

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unknown event type: {0}")]
    UnknownType(String),
}

/// Wire shape before the type name is checked against the registry
#[derive(Debug, Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    event_type: String,
    payload: Map<String, Value>,
    timestamp: i64,
    #[serde(default)]
    source: Option<String>,
}

/// A single typed event message
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventEnvelope {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub payload: Map<String, Value>,
    /// Producer timestamp, epoch milliseconds
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl EventEnvelope {
    /// Build an envelope stamped with the current wall-clock time
    pub fn new(event_type: EventType, payload: Map<String, Value>) -> Self {
        Self { event_type, payload, timestamp: epoch_ms(), source: None }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Parse one text frame, validating structure and type name
    pub fn parse(raw: &str, registry: &EventTypeRegistry) -> Result<Self, EnvelopeError> {
        let raw: RawEnvelope = serde_json::from_str(raw)?;
        let event_type = registry
            .resolve(&raw.event_type)
            .ok_or(EnvelopeError::UnknownType(raw.event_type))?;

        Ok(Self {
            event_type,
            payload: raw.payload,
            timestamp: raw.timestamp,
            source: raw.source,
        })
    }

    pub fn to_json(&self) -> String {
        // Map<String, Value> and plain fields cannot fail to serialize
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Decode the payload into the shape registered for its type
    pub fn decode<P: TypedPayload>(&self) -> anyhow::Result<P> {
        anyhow::ensure!(
            self.event_type == P::EVENT_TYPE,
            "payload type {} requested for {} envelope",
            P::EVENT_TYPE,
            self.event_type
        );
        let payload = serde_json::from_value(Value::Object(self.payload.clone()))?;
        Ok(payload)
    }
}

/// Current time as epoch milliseconds
pub fn epoch_ms() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

/// Payload shape bound to one built-in event type
pub trait TypedPayload: DeserializeOwned + Send + 'static {
    const EVENT_TYPE: EventType;
}

macro_rules! typed_payload {
    ($(#[$meta:meta])* $name:ident => $event:ident { $($field:ident: $ty:ty),* $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Deserialize)]
        #[serde(rename_all = "camelCase")]
        pub struct $name {
            #[serde(default)]
            pub action: Option<String>,
            $(
                #[serde(default)]
                pub $field: Option<$ty>,
            )*
            #[serde(flatten)]
            pub extra: Map<String, Value>,
        }

        impl TypedPayload for $name {
            const EVENT_TYPE: EventType = EventType::$event;
        }
    };
}

typed_payload!(
    /// Balance changes on a kid's wallet
    WalletPayload => WalletUpdate { kid_id: String, wallet_id: String, balance: f64 }
);
typed_payload!(
    /// Chore created, completed, approved or deleted
    ChorePayload => ChoreUpdate { chore_id: String, kid_id: String, status: String }
);
typed_payload!(TransactionPayload => TransactionUpdate {
    transaction_id: String,
    kid_id: String,
    amount: f64,
});
typed_payload!(KidPayload => KidUpdate { kid_id: String });
typed_payload!(AllowancePayload => AllowanceUpdate {
    kid_id: String,
    amount: f64,
    frequency: String,
});
typed_payload!(
    /// Savings goal progress or lifecycle change
    GoalPayload => GoalUpdate { goal_id: String, kid_id: String, progress: f64 }
);
typed_payload!(ProfilePayload => ProfileUpdate { user_id: String });
