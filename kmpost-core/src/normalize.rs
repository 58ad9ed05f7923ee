//! Derives the affiliation summary used for rendering and matching.

use crate::types::{Killmail, Side};

/// Who landed the final blow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalBlow {
  Npc,
  Pilot {
    character_id: u64,
    /// `None` only when the feed omitted the pilot's corporation.
    side: Option<Side>,
  },
}

/// Read-only view over a [`Killmail`], built fresh for every event.
#[derive(Debug, Clone, Copy)]
pub struct NormalizedKillmail<'a> {
  pub killmail: &'a Killmail,
  pub victim_side: Side,
  pub final_blow: FinalBlow,
  pub attacker_count: usize,
}

pub fn normalize(km: &Killmail) -> NormalizedKillmail<'_> {
  let victim_side = Side::of(km.victim.corporation_id, km.victim.alliance_id);

  let final_blow = match km.final_blow() {
    Some(attacker) => match attacker.character_id {
      Some(character_id) => FinalBlow::Pilot {
        character_id,
        side: match (attacker.alliance_id, attacker.corporation_id) {
          (Some(alliance), corp) => Some(Side::of(corp.unwrap_or_default(), Some(alliance))),
          (None, Some(corp)) => Some(Side::of(corp, None)),
          (None, None) => None,
        },
      },
      None => FinalBlow::Npc,
    },
    // Unreachable for decoder output; treat a hand-built killmail without a
    // final blow like an NPC kill.
    None => FinalBlow::Npc,
  };

  NormalizedKillmail {
    killmail: km,
    victim_side,
    final_blow,
    attacker_count: km.attackers.len(),
  }
}
