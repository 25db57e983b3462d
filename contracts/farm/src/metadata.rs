//! Self-describing certificate metadata.
//!
//! Renders a position as an inline base64 `data:` URI holding a JSON
//! document, so the certificate needs no off-chain host.

use core::fmt::{self, Write};

use base64::{engine::general_purpose::STANDARD, Engine};
use soroban_sdk::{Env, String};

use crate::Position;

pub const URI_PREFIX: &str = "data:application/json;base64,";

const JSON_CAPACITY: usize = 512;
const URI_CAPACITY: usize = URI_PREFIX.len() + (JSON_CAPACITY + 2) / 3 * 4;

struct JsonBuffer {
    bytes: [u8; JSON_CAPACITY],
    len: usize,
}

impl JsonBuffer {
    fn new() -> Self {
        JsonBuffer {
            bytes: [0; JSON_CAPACITY],
            len: 0,
        }
    }

    fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}

impl Write for JsonBuffer {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let end = self.len + s.len();
        if end > JSON_CAPACITY {
            return Err(fmt::Error);
        }
        self.bytes[self.len..end].copy_from_slice(s.as_bytes());
        self.len = end;
        Ok(())
    }
}

/// Everything the URI shows about a position besides its stored fields.
pub struct LevelView {
    pub available_level: u32,
    pub weekly_interest_bps: u32,
    pub flowrate: i128,
}

pub fn position_uri(env: &Env, position_id: u64, position: &Position, view: &LevelView) -> String {
    let mut json = JsonBuffer::new();
    write!(
        json,
        "{{\"name\":\"Fluxora Farm Position #{}\",\
         \"description\":\"Staked liquidity earning a per-second reward stream\",\
         \"attributes\":{{\"stake_amount\":{},\"reference_value\":{},\"level\":{},\
         \"available_level\":{},\"weekly_interest_bps\":{},\"flowrate\":{},\"created_at\":{}}}}}",
        position_id,
        position.stake_amount,
        position.reference_value,
        position.level,
        view.available_level,
        view.weekly_interest_bps,
        view.flowrate,
        position.creation_time,
    )
    .expect("position metadata exceeds buffer");

    // Base64 keeps `#`, quotes and spaces in the document out of the URI.
    let mut uri = [0u8; URI_CAPACITY];
    let prefix = URI_PREFIX.as_bytes();
    uri[..prefix.len()].copy_from_slice(prefix);
    let encoded = STANDARD
        .encode_slice(json.as_slice(), &mut uri[prefix.len()..])
        .expect("position uri exceeds buffer");

    String::from_bytes(env, &uri[..prefix.len() + encoded])
}
