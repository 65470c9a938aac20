//! Player identity as carried by the QR code on the player's phone.

use percent_encoding::{NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use serde::{Deserialize, Serialize};

use crate::error::{Result, WaitlistError};

const PLAYER_URI_PREFIX: &str = "tpds://player/";

const MAX_PLAYER_ID_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerIdentity {
    pub player_id: String,
    pub display_name: Option<String>,
}

impl PlayerIdentity {
    pub fn new(player_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            player_id: player_id.into(),
            display_name: Some(display_name.into()),
        }
    }

    /// `tpds://player/{playerId}?name={urlencodedName}`
    pub fn to_uri(&self) -> String {
        let id = utf8_percent_encode(&self.player_id, NON_ALPHANUMERIC);
        match self.display_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => format!(
                "{PLAYER_URI_PREFIX}{id}?name={}",
                utf8_percent_encode(name, NON_ALPHANUMERIC)
            ),
            _ => format!("{PLAYER_URI_PREFIX}{id}"),
        }
    }

    pub fn parse_uri(uri: &str) -> Result<Self> {
        let rest = uri
            .trim()
            .strip_prefix(PLAYER_URI_PREFIX)
            .ok_or_else(|| WaitlistError::validation("not a player QR code"))?;

        let (raw_id, query) = match rest.split_once('?') {
            Some((id, query)) => (id, Some(query)),
            None => (rest, None),
        };
        let player_id = decode(raw_id)?;
        player_id_checked(&player_id)?;

        let display_name = match query {
            Some(query) => query
                .split('&')
                .filter_map(|pair| pair.split_once('='))
                .find(|(key, _)| *key == "name")
                .map(|(_, value)| decode(&value.replace('+', " ")))
                .transpose()?
                .filter(|name| !name.trim().is_empty()),
            None => None,
        };

        Ok(Self {
            player_id,
            display_name,
        })
    }
}

fn decode(raw: &str) -> Result<String> {
    percent_decode_str(raw)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|_| WaitlistError::validation("player QR code is not valid UTF-8"))
}

/// Player ids come from the client (a device UUID or `manual-*`), so only bound their shape.
pub fn player_id_checked(player_id: &str) -> Result<()> {
    if player_id.is_empty() || player_id.len() > MAX_PLAYER_ID_LEN {
        return Err(WaitlistError::validation("player id is missing or too long"));
    }
    if player_id.chars().any(|c| c.is_control() || c.is_whitespace()) {
        return Err(WaitlistError::validation("player id contains invalid characters"));
    }
    Ok(())
}
