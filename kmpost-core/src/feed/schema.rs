use crate::error::{Error, Result};
use crate::types::{Attacker, Killmail, Victim};
use serde::Deserialize;

// RedisQ wire format. Only the fields the pipeline reads are modelled; serde
// ignores the rest.

#[derive(Debug, Deserialize)]
struct Envelope {
  package: Option<Package>,
}

#[derive(Debug, Deserialize)]
struct Package {
  #[serde(rename = "killID", default)]
  kill_id: Option<u64>,
  killmail: WireKillmail,
  zkb: Zkb,
}

#[derive(Debug, Deserialize)]
struct WireKillmail {
  #[serde(default)]
  killmail_id: Option<u64>,
  solar_system_id: u64,
  victim: WireVictim,
  attackers: Vec<WireAttacker>,
}

#[derive(Debug, Deserialize)]
struct WireVictim {
  #[serde(default)]
  character_id: Option<u64>,
  corporation_id: u64,
  #[serde(default)]
  alliance_id: Option<u64>,
  ship_type_id: u64,
}

#[derive(Debug, Deserialize)]
struct WireAttacker {
  #[serde(default)]
  character_id: Option<u64>,
  #[serde(default)]
  corporation_id: Option<u64>,
  #[serde(default)]
  alliance_id: Option<u64>,
  final_blow: bool,
}

#[derive(Debug, Deserialize)]
struct Zkb {
  #[serde(rename = "totalValue")]
  total_value: f64,
}

/// Result of decoding one poll response.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
  Killmail(Killmail),
  /// The queue had nothing for us this poll.
  Empty,
  /// A structure or other unpiloted loss.
  NotNotifiable { kill_id: u64 },
}

pub fn decode(payload: &str) -> Result<Decoded> {
  let envelope: Envelope =
    serde_json::from_str(payload).map_err(|e| Error::MalformedPayload(e.to_string()))?;

  let Some(package) = envelope.package else {
    return Ok(Decoded::Empty);
  };

  let id = package
    .kill_id
    .or(package.killmail.killmail_id)
    .ok_or_else(|| Error::MalformedPayload("missing kill id".to_string()))?;

  let total_value_isk = package.zkb.total_value;
  if !total_value_isk.is_finite() || total_value_isk < 0.0 {
    return Err(Error::MalformedPayload(format!(
      "kill {id}: invalid totalValue {total_value_isk}"
    )));
  }

  let km = package.killmail;
  let Some(character_id) = km.victim.character_id else {
    return Ok(Decoded::NotNotifiable { kill_id: id });
  };

  if !km.attackers.iter().any(|a| a.final_blow) {
    return Err(Error::MalformedPayload(format!(
      "kill {id}: no final-blow attacker"
    )));
  }

  Ok(Decoded::Killmail(Killmail {
    id,
    solar_system_id: km.solar_system_id,
    victim: Victim {
      character_id,
      corporation_id: km.victim.corporation_id,
      alliance_id: km.victim.alliance_id,
      ship_type_id: km.victim.ship_type_id,
    },
    attackers: km
      .attackers
      .into_iter()
      .map(|a| Attacker {
        character_id: a.character_id,
        corporation_id: a.corporation_id,
        alliance_id: a.alliance_id,
        final_blow: a.final_blow,
      })
      .collect(),
    total_value_isk,
  }))
}
