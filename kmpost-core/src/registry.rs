//! Channel subscriptions shared between the consumer loop and the admin
//! command path.
//!
//! All state sits behind one mutex owned by [`Registry`]; callers only ever
//! receive clones. The enabled count is adjusted on enable/disable
//! transitions and mirrored into an atomic so the consumer can read it
//! without taking the lock.

use crate::error::{Error, Result};
use crate::matching::FilterRule;
use crate::types::ChannelId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
  #[serde(rename = "channelID")]
  pub channel_id: ChannelId,
  #[serde(default)]
  pub enabled: bool,
  #[serde(default)]
  pub filters: Vec<FilterRule>,
}

impl Subscription {
  pub fn new(channel_id: impl Into<ChannelId>) -> Self {
    Self {
      channel_id: channel_id.into(),
      enabled: false,
      filters: Vec::new(),
    }
  }
}

/// Persisted form: subscriptions keyed by channel id.
pub type RegistryDocument = BTreeMap<ChannelId, Subscription>;

/// Result of an enable/disable request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
  Changed,
  Unchanged,
  /// Disable requested for a channel that was never initialized.
  Unknown,
}

#[derive(Debug, Default)]
struct State {
  subs: BTreeMap<ChannelId, Subscription>,
  enabled: usize,
}

#[derive(Debug, Default)]
pub struct Registry {
  state: Mutex<State>,
  enabled_count: AtomicUsize,
}

impl Registry {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn from_document(doc: RegistryDocument) -> Self {
    let subs: BTreeMap<_, _> = doc
      .into_iter()
      .map(|(key, mut sub)| {
        // The map key is authoritative.
        sub.channel_id = key.clone();
        (key, sub)
      })
      .collect();
    let enabled = subs.values().filter(|s| s.enabled).count();
    Self {
      state: Mutex::new(State { subs, enabled }),
      enabled_count: AtomicUsize::new(enabled),
    }
  }

  pub fn to_document(&self) -> RegistryDocument {
    self.lock().subs.clone()
  }

  pub fn enabled_count(&self) -> usize {
    self.enabled_count.load(Ordering::SeqCst)
  }

  pub fn len(&self) -> usize {
    self.lock().subs.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn get(&self, channel: &str) -> Option<Subscription> {
    self.lock().subs.get(channel).cloned()
  }

  pub fn upsert(&self, channel: &str, mut sub: Subscription) {
    sub.channel_id = channel.to_string();
    let mut state = self.lock();
    let was_enabled = state.subs.get(channel).map(|s| s.enabled).unwrap_or(false);
    let now_enabled = sub.enabled;
    state.subs.insert(channel.to_string(), sub);
    self.apply_transition(&mut state, was_enabled, now_enabled);
  }

  /// Returns `false` if the channel already existed.
  pub fn init(&self, channel: &str) -> bool {
    let mut state = self.lock();
    if state.subs.contains_key(channel) {
      return false;
    }
    state
      .subs
      .insert(channel.to_string(), Subscription::new(channel));
    true
  }

  /// Enabling an unknown channel initializes it first.
  pub fn set_enabled(&self, channel: &str, enabled: bool) -> Toggle {
    let mut state = self.lock();
    let was_enabled = match state.subs.get_mut(channel) {
      Some(sub) => {
        let was = sub.enabled;
        sub.enabled = enabled;
        was
      }
      None if enabled => {
        let mut sub = Subscription::new(channel);
        sub.enabled = true;
        state.subs.insert(channel.to_string(), sub);
        false
      }
      None => return Toggle::Unknown,
    };

    if was_enabled == enabled {
      return Toggle::Unchanged;
    }
    self.apply_transition(&mut state, was_enabled, enabled);
    Toggle::Changed
  }

  /// Appends a rule and returns its 1-based position.
  pub fn add_filter(&self, channel: &str, rule: FilterRule) -> Result<usize> {
    let mut state = self.lock();
    let sub = state
      .subs
      .get_mut(channel)
      .ok_or_else(|| Error::UnknownChannel(channel.to_string()))?;
    sub.filters.push(rule);
    Ok(sub.filters.len())
  }

  /// Removes the rule at a 1-based position.
  pub fn remove_filter(&self, channel: &str, index: usize) -> Result<FilterRule> {
    let mut state = self.lock();
    let sub = state
      .subs
      .get_mut(channel)
      .ok_or_else(|| Error::UnknownChannel(channel.to_string()))?;
    if index == 0 || index > sub.filters.len() {
      return Err(Error::NoSuchFilter(index));
    }
    Ok(sub.filters.remove(index - 1))
  }

  /// Point-in-time copy of every enabled subscription.
  pub fn snapshot_enabled(&self) -> Vec<Subscription> {
    self
      .lock()
      .subs
      .values()
      .filter(|s| s.enabled)
      .cloned()
      .collect()
  }

  /// Visits a snapshot taken under the lock. The visitor runs after the lock
  /// is released, so it may block or call back into the registry.
  pub fn for_each_enabled<F>(&self, mut visitor: F)
  where
    F: FnMut(&ChannelId, &[FilterRule]),
  {
    for sub in self.snapshot_enabled() {
      visitor(&sub.channel_id, &sub.filters);
    }
  }

  fn apply_transition(&self, state: &mut State, was_enabled: bool, now_enabled: bool) {
    match (was_enabled, now_enabled) {
      (false, true) => state.enabled += 1,
      (true, false) => state.enabled = state.enabled.saturating_sub(1),
      _ => return,
    }
    self.enabled_count.store(state.enabled, Ordering::SeqCst);
  }

  fn lock(&self) -> MutexGuard<'_, State> {
    // A panic while holding the lock cannot leave a half-applied mutation:
    // every method finishes its writes before releasing.
    self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }
}
