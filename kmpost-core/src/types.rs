pub type ChannelId = String;

/// One decoded feed event. Lives for a single consumer cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Killmail {
  pub id: u64,
  pub solar_system_id: u64,
  pub victim: Victim,
  pub attackers: Vec<Attacker>,
  pub total_value_isk: f64,
}

/// Only pilots reach this type; structure losses are dropped by the decoder.
#[derive(Debug, Clone, PartialEq)]
pub struct Victim {
  pub character_id: u64,
  pub corporation_id: u64,
  pub alliance_id: Option<u64>,
  pub ship_type_id: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attacker {
  /// `None` for NPCs.
  pub character_id: Option<u64>,
  pub corporation_id: Option<u64>,
  pub alliance_id: Option<u64>,
  pub final_blow: bool,
}

impl Killmail {
  pub fn permalink(&self) -> String {
    format!("https://zkillboard.com/kill/{}/", self.id)
  }

  /// The decoder guarantees one exists.
  pub fn final_blow(&self) -> Option<&Attacker> {
    self.attackers.iter().find(|a| a.final_blow)
  }
}

/// Entity categories the name resolver knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
  Character,
  Corporation,
  Alliance,
  SolarSystem,
}

impl EntityKind {
  pub fn label(self) -> &'static str {
    match self {
      EntityKind::Character => "character",
      EntityKind::Corporation => "corporation",
      EntityKind::Alliance => "alliance",
      EntityKind::SolarSystem => "solar system",
    }
  }
}

/// Which group a pilot fights for: their alliance if they have one, else
/// their corporation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Side {
  pub kind: EntityKind,
  pub id: u64,
}

impl Side {
  pub fn of(corporation_id: u64, alliance_id: Option<u64>) -> Self {
    match alliance_id {
      Some(id) => Side {
        kind: EntityKind::Alliance,
        id,
      },
      None => Side {
        kind: EntityKind::Corporation,
        id: corporation_id,
      },
    }
  }
}
