//! Caller identity resolution
//!
//! Works out who is on the line from whatever the SIP bridge gave us: the
//! job metadata blob, the room name, and (once they join) the participant
//! identity. All three are untrusted and parsed best-effort.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Sentinel phone number used until a real one is resolved
pub const UNKNOWN_PHONE_NUMBER: &str = "unknown";

/// Metadata keys checked in order, first non-empty wins
const METADATA_PHONE_KEYS: [&str; 3] = ["sip_from_user", "from_user", "to_user"];

const SIP_IDENTITY_PREFIX: &str = "sip_";

fn room_phone_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"_(\d{11})_").expect("room phone pattern is valid"))
}

/// Resolved caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerIdentity {
    pub phone_number: String,
    pub client_name: String,
}

impl CallerIdentity {
    pub fn is_resolved(&self) -> bool {
        self.phone_number != UNKNOWN_PHONE_NUMBER
    }
}

/// Static phone number → display name mapping
#[derive(Debug, Clone)]
pub struct PhoneDirectory {
    entries: HashMap<String, String>,
    default_name: String,
}

impl PhoneDirectory {
    pub fn new(entries: HashMap<String, String>, default_name: impl Into<String>) -> Self {
        Self {
            entries,
            default_name: default_name.into(),
        }
    }

    /// Display name for a number, or the default name
    pub fn lookup(&self, phone_number: &str) -> &str {
        self.entries
            .get(phone_number)
            .map(String::as_str)
            .unwrap_or(&self.default_name)
    }

    pub fn default_name(&self) -> &str {
        &self.default_name
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parse call metadata into a JSON object; anything else is treated as empty.
fn parse_metadata(metadata: Option<&str>) -> serde_json::Map<String, serde_json::Value> {
    let Some(raw) = metadata.map(str::trim).filter(|m| !m.is_empty()) else {
        return serde_json::Map::new();
    };

    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Object(map)) => {
            debug!("SIP metadata received: {:?}", map);
            map
        }
        Ok(other) => {
            warn!("Call metadata is not a JSON object, ignoring: {}", other);
            serde_json::Map::new()
        }
        Err(e) => {
            warn!("Could not decode call metadata as JSON: {}", e);
            serde_json::Map::new()
        }
    }
}

fn phone_from_metadata(map: &serde_json::Map<String, serde_json::Value>) -> Option<String> {
    METADATA_PHONE_KEYS.iter().find_map(|key| {
        let value = match map.get(*key)? {
            serde_json::Value::String(s) => s.trim().to_string(),
            serde_json::Value::Number(n) => n.to_string(),
            _ => return None,
        };
        (!value.is_empty()).then_some(value)
    })
}

fn phone_from_room_name(room_name: &str) -> Option<String> {
    room_phone_pattern()
        .captures(room_name)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn phone_from_participant_identity(identity: &str) -> Option<String> {
    identity
        .strip_prefix(SIP_IDENTITY_PREFIX)
        .filter(|rest| !rest.is_empty())
        .map(str::to_string)
}

/// Resolve the caller's phone number and display name.
///
/// Priority: metadata keys, then an 11-digit number between underscores in
/// the room name, then a `sip_`-prefixed participant identity. Falls back to
/// [`UNKNOWN_PHONE_NUMBER`].
pub fn resolve_caller(
    metadata: Option<&str>,
    room_name: &str,
    participant_identity: Option<&str>,
    directory: &PhoneDirectory,
) -> CallerIdentity {
    let map = parse_metadata(metadata);

    let phone_number = phone_from_metadata(&map)
        .or_else(|| phone_from_room_name(room_name))
        .or_else(|| participant_identity.and_then(phone_from_participant_identity))
        .unwrap_or_else(|| UNKNOWN_PHONE_NUMBER.to_string());

    info!("Phone number determined: {}", phone_number);

    let client_name = directory.lookup(&phone_number).to_string();
    CallerIdentity {
        phone_number,
        client_name,
    }
}
