//! Routes one killmail to every enabled channel whose filters match it.

use crate::matching::{evaluate, MatchDecision};
use crate::normalize::{normalize, FinalBlow, NormalizedKillmail};
use crate::registry::Registry;
use crate::resolve::{display_name, display_ship_name, Resolver};
use crate::transport::{Emphasis, Notification, Transport};
use crate::types::{EntityKind, Killmail, Side};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteSummary {
  pub matched: usize,
  pub delivered: usize,
}

pub struct Dispatcher<R, T> {
  resolver: R,
  transport: T,
}

impl<R: Resolver, T: Transport> Dispatcher<R, T> {
  pub fn new(resolver: R, transport: T) -> Self {
    Self {
      resolver,
      transport,
    }
  }

  /// Rendering happens at most once per killmail, on the first match.
  /// A failed delivery is logged and the remaining channels still get theirs.
  pub fn route(&self, km: &Killmail, registry: &Registry) -> RouteSummary {
    let nk = normalize(km);
    let mut rendered: Option<Notification> = None;
    let mut summary = RouteSummary::default();

    registry.for_each_enabled(|channel, filters| {
      let emphasis = match evaluate(&nk, filters) {
        MatchDecision::NoMatch => return,
        MatchDecision::MatchPlain => Emphasis::Plain,
        MatchDecision::MatchHighlighted => Emphasis::Highlighted,
      };
      summary.matched += 1;

      let base = rendered.get_or_insert_with(|| self.render(&nk));
      let notification = Notification {
        emphasis,
        ..base.clone()
      };

      match self.transport.deliver(channel, &notification) {
        Ok(()) => {
          summary.delivered += 1;
          tracing::debug!(channel = %channel, kill_id = km.id, ?emphasis, "notification delivered");
        }
        Err(e) => {
          tracing::warn!(channel = %channel, kill_id = km.id, error = %e, "delivery failed");
        }
      }
    });

    summary
  }

  fn render(&self, nk: &NormalizedKillmail<'_>) -> Notification {
    let km = nk.killmail;
    let victim = display_name(&self.resolver, EntityKind::Character, km.victim.character_id);
    let victim_side = self.side_name(nk.victim_side);
    let ship = display_ship_name(&self.resolver, km.victim.ship_type_id);

    let attacker = match nk.final_blow {
      FinalBlow::Npc => "NPC".to_string(),
      FinalBlow::Pilot { character_id, side } => {
        let name = display_name(&self.resolver, EntityKind::Character, character_id);
        match side {
          Some(side) => format!("{name} ({})", self.side_name(side)),
          None => name,
        }
      }
    };

    let permalink = km.permalink();
    Notification {
      title: permalink.clone(),
      url: permalink,
      description: format!(
        "{victim} ({victim_side}) lost {ship} to {attacker}, {} attackers total ({} ISK)",
        nk.attacker_count,
        format_isk(km.total_value_isk)
      ),
      thumbnail_url: format!(
        "https://images.evetech.net/types/{}/render?size=64",
        km.victim.ship_type_id
      ),
      emphasis: Emphasis::Plain,
    }
  }

  fn side_name(&self, side: Side) -> String {
    display_name(&self.resolver, side.kind, side.id)
  }
}

/// Two decimals, thousands separated by spaces: `1 234 567.89`.
pub fn format_isk(value: f64) -> String {
  let fixed = format!("{value:.2}");
  let (int_part, frac) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
  let (sign, digits) = match int_part.strip_prefix('-') {
    Some(rest) => ("-", rest),
    None => ("", int_part),
  };

  let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
  for (i, ch) in digits.chars().enumerate() {
    if i > 0 && (digits.len() - i) % 3 == 0 {
      grouped.push(' ');
    }
    grouped.push(ch);
  }
  format!("{sign}{grouped}.{frac}")
}
