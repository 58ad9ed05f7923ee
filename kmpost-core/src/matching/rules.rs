use crate::error::Error;
use serde::{Deserialize, Serialize};

pub const WILDCARD: &str = "-";

/// One predicate of a filter rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
  Any,
  /// `label` is the name the administrator typed; only `id` takes part in
  /// matching.
  Id { id: u64, label: String },
}

impl Target {
  pub fn id(id: u64, label: impl Into<String>) -> Self {
    Target::Id {
      id,
      label: label.into(),
    }
  }

  pub fn is_any(&self) -> bool {
    matches!(self, Target::Any)
  }

  /// A specific target never matches an absent value.
  pub fn admits(&self, value: Option<u64>) -> bool {
    match self {
      Target::Any => true,
      Target::Id { id, .. } => value == Some(*id),
    }
  }

  pub fn label(&self) -> &str {
    match self {
      Target::Any => WILDCARD,
      Target::Id { label, .. } => label,
    }
  }

  fn id_text(&self) -> String {
    match self {
      Target::Any => WILDCARD.to_string(),
      Target::Id { id, .. } => id.to_string(),
    }
  }

  fn from_parts(label: String, id: &str) -> Result<Self, Error> {
    let id = id.trim();
    if id == WILDCARD {
      return Ok(Target::Any);
    }
    let parsed = id
      .parse::<u64>()
      .map_err(|_| Error::InvalidFilterSpec(format!("id {id:?} is neither '-' nor a number")))?;
    Ok(Target::Id { id: parsed, label })
  }
}

/// Person / corporation / alliance / solar system predicates, all of which
/// must hold for a victim to match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "FilterRuleRecord", into = "FilterRuleRecord")]
pub struct FilterRule {
  pub person: Target,
  pub corp: Target,
  pub alliance: Target,
  pub system: Target,
}

impl FilterRule {
  pub fn any() -> Self {
    Self {
      person: Target::Any,
      corp: Target::Any,
      alliance: Target::Any,
      system: Target::Any,
    }
  }

  /// `<person> <corp> <alliance> <system>`, as shown by `filter list`.
  pub fn describe(&self) -> String {
    format!(
      "<{}> <{}> <{}> <{}>",
      self.person.label(),
      self.corp.label(),
      self.alliance.label(),
      self.system.label()
    )
  }
}

// Settings-file shape: display labels and ids side by side, "-" for
// wildcards.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FilterRuleRecord {
  #[serde(default = "wildcard")]
  person: String,
  #[serde(default = "wildcard")]
  corp: String,
  #[serde(default = "wildcard")]
  alliance: String,
  #[serde(default = "wildcard")]
  system: String,
  #[serde(rename = "personID", default = "wildcard")]
  person_id: String,
  #[serde(rename = "corpID", default = "wildcard")]
  corp_id: String,
  #[serde(rename = "allianceID", default = "wildcard")]
  alliance_id: String,
  #[serde(rename = "systemID", default = "wildcard")]
  system_id: String,
}

fn wildcard() -> String {
  WILDCARD.to_string()
}

impl TryFrom<FilterRuleRecord> for FilterRule {
  type Error = Error;

  fn try_from(r: FilterRuleRecord) -> Result<Self, Self::Error> {
    Ok(Self {
      person: Target::from_parts(r.person, &r.person_id)?,
      corp: Target::from_parts(r.corp, &r.corp_id)?,
      alliance: Target::from_parts(r.alliance, &r.alliance_id)?,
      system: Target::from_parts(r.system, &r.system_id)?,
    })
  }
}

impl From<FilterRule> for FilterRuleRecord {
  fn from(rule: FilterRule) -> Self {
    Self {
      person_id: rule.person.id_text(),
      corp_id: rule.corp.id_text(),
      alliance_id: rule.alliance.id_text(),
      system_id: rule.system.id_text(),
      person: rule.person.label().to_string(),
      corp: rule.corp.label().to_string(),
      alliance: rule.alliance.label().to_string(),
      system: rule.system.label().to_string(),
    }
  }
}
