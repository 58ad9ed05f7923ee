use super::rules::{FilterRule, Target};
use crate::normalize::NormalizedKillmail;
use crate::types::Attacker;

/// Outcome of running one subscription's filters against an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchDecision {
  NoMatch,
  MatchPlain,
  /// A party named by the deciding rule was also among the attackers.
  MatchHighlighted,
}

/// First rule whose victim predicates all hold decides; an empty list
/// matches everything.
pub fn evaluate(nk: &NormalizedKillmail<'_>, rules: &[FilterRule]) -> MatchDecision {
  if rules.is_empty() {
    return MatchDecision::MatchPlain;
  }

  let Some(rule) = rules.iter().find(|r| victim_matches(nk, r)) else {
    return MatchDecision::NoMatch;
  };

  if attackers_match(&nk.killmail.attackers, rule) {
    MatchDecision::MatchHighlighted
  } else {
    MatchDecision::MatchPlain
  }
}

pub(crate) fn victim_matches(nk: &NormalizedKillmail<'_>, rule: &FilterRule) -> bool {
  let km = nk.killmail;
  rule.person.admits(Some(km.victim.character_id))
    && rule.corp.admits(Some(km.victim.corporation_id))
    && rule.alliance.admits(km.victim.alliance_id)
    && rule.system.admits(Some(km.solar_system_id))
}

// Each identity predicate is checked against the whole list on its own; the
// satisfying attackers need not be the same pilot.
fn attackers_match(attackers: &[Attacker], rule: &FilterRule) -> bool {
  any_attacker(attackers, &rule.person, |a| a.character_id)
    && any_attacker(attackers, &rule.corp, |a| a.corporation_id)
    && any_attacker(attackers, &rule.alliance, |a| a.alliance_id)
}

fn any_attacker(attackers: &[Attacker], target: &Target, pick: fn(&Attacker) -> Option<u64>) -> bool {
  target.is_any() || attackers.iter().any(|a| target.admits(pick(a)))
}
