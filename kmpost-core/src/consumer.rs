//! The feed polling loop.
//!
//! One thread runs [`Consumer::run`]; it polls, decodes and dispatches
//! sequentially. Shutdown is observed between cycles and interrupts the idle
//! sleep and error backoff. A poll in flight is bounded by the feed client's
//! timeout.

use crate::config::FeedConfig;
use crate::dispatch::{Dispatcher, RouteSummary};
use crate::error::Error;
use crate::feed::{decode, Decoded, FeedSource};
use crate::registry::Registry;
use crate::resolve::Resolver;
use crate::transport::Transport;
use std::sync::mpsc::{self, RecvTimeoutError, TryRecvError};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
  /// No channel is enabled; the feed is left alone.
  Idle,
  Polling,
  Dispatching,
}

#[derive(Debug, Clone, Copy)]
pub struct Pacing {
  pub idle_sleep: Duration,
  pub error_backoff: Duration,
}

impl Pacing {
  pub fn from_config(cfg: &FeedConfig) -> Self {
    Self {
      idle_sleep: Duration::from_millis(cfg.idle_sleep_ms),
      error_backoff: Duration::from_millis(cfg.error_backoff_ms),
    }
  }
}

/// Result of one [`Consumer::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cycle {
  pub state: LoopState,
  /// How long to wait (interruptibly) before the next step.
  pub pause: Duration,
  pub routed: Option<RouteSummary>,
}

pub struct Consumer<F, R, T> {
  source: F,
  dispatcher: Dispatcher<R, T>,
  registry: Arc<Registry>,
  pacing: Pacing,
  state: LoopState,
}

impl<F: FeedSource, R: Resolver, T: Transport> Consumer<F, R, T> {
  pub fn new(
    source: F,
    dispatcher: Dispatcher<R, T>,
    registry: Arc<Registry>,
    pacing: Pacing,
  ) -> Self {
    Self {
      source,
      dispatcher,
      registry,
      pacing,
      state: LoopState::Idle,
    }
  }

  pub fn state(&self) -> LoopState {
    self.state
  }

  pub fn step(&mut self) -> Cycle {
    if self.registry.enabled_count() == 0 {
      self.enter(LoopState::Idle);
      return self.cycle(self.pacing.idle_sleep, None);
    }
    self.enter(LoopState::Polling);

    let payload = match self.source.poll() {
      Ok(p) => p,
      Err(e @ Error::UpstreamUnavailable(_)) => {
        tracing::warn!(error = %e, "feed poll failed");
        return self.cycle(self.pacing.error_backoff, None);
      }
      Err(e) => {
        tracing::warn!(error = %e, "feed poll returned unusable data");
        return self.cycle(self.pacing.error_backoff, None);
      }
    };

    let km = match decode(&payload) {
      Ok(Decoded::Killmail(km)) => km,
      Ok(Decoded::Empty) => {
        tracing::trace!("feed queue empty");
        return self.cycle(Duration::ZERO, None);
      }
      Ok(Decoded::NotNotifiable { kill_id }) => {
        tracing::debug!(kill_id, "skipping loss without a pilot");
        return self.cycle(Duration::ZERO, None);
      }
      Err(e) => {
        tracing::warn!(error = %e, "feed payload rejected");
        return self.cycle(self.pacing.error_backoff, None);
      }
    };

    self.enter(LoopState::Dispatching);
    let routed = self.dispatcher.route(&km, &self.registry);
    tracing::debug!(
      kill_id = km.id,
      matched = routed.matched,
      delivered = routed.delivered,
      "killmail routed"
    );
    self.enter(LoopState::Polling);
    self.cycle(Duration::ZERO, Some(routed))
  }

  /// Runs until a stop message arrives or every sender is dropped.
  pub fn run(&mut self, stop_rx: &mpsc::Receiver<()>) {
    tracing::info!("feed consumer started");
    loop {
      match stop_rx.try_recv() {
        Ok(()) | Err(TryRecvError::Disconnected) => break,
        Err(TryRecvError::Empty) => {}
      }

      let cycle = self.step();
      if cycle.pause.is_zero() {
        continue;
      }
      match stop_rx.recv_timeout(cycle.pause) {
        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        Err(RecvTimeoutError::Timeout) => {}
      }
    }
    tracing::info!("feed consumer stopped");
  }

  fn enter(&mut self, next: LoopState) {
    if self.state != next {
      tracing::info!(from = ?self.state, to = ?next, "consumer state changed");
      self.state = next;
    }
  }

  fn cycle(&self, pause: Duration, routed: Option<RouteSummary>) -> Cycle {
    Cycle {
      state: self.state,
      pause,
      routed,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::Result;
  use crate::transport::Notification;
  use crate::types::EntityKind;
  use std::collections::VecDeque;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Mutex;
  use std::time::Instant;

  const KILL: &str = r#"{"package":{"killID":9,"killmail":{"solar_system_id":30000142,"victim":{"character_id":100,"corporation_id":5,"ship_type_id":587},"attackers":[{"character_id":200,"corporation_id":9,"alliance_id":77,"final_blow":true}]},"zkb":{"totalValue":1234567.891}}}"#;

  #[derive(Clone, Default)]
  struct Scripted {
    replies: Arc<Mutex<VecDeque<Result<String>>>>,
    polls: Arc<AtomicUsize>,
  }

  impl Scripted {
    fn push(&self, reply: Result<String>) {
      self.replies.lock().unwrap().push_back(reply);
    }
  }

  impl FeedSource for Scripted {
    fn poll(&self) -> Result<String> {
      self.polls.fetch_add(1, Ordering::SeqCst);
      self
        .replies
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| Ok(r#"{"package":null}"#.to_string()))
    }
  }

  struct NoNames;

  impl Resolver for NoNames {
    fn resolve_name(&self, _kind: EntityKind, _id: u64) -> Result<Option<String>> {
      Ok(None)
    }
    fn resolve_ship_name(&self, _type_id: u64) -> Result<Option<String>> {
      Ok(None)
    }
    fn resolve_id(&self, _kind: EntityKind, _text: &str) -> Result<Option<u64>> {
      Ok(None)
    }
  }

  #[derive(Clone, Default)]
  struct Counting(Arc<AtomicUsize>);

  impl Transport for Counting {
    fn deliver(&self, _channel: &str, _n: &Notification) -> Result<()> {
      self.0.fetch_add(1, Ordering::SeqCst);
      Ok(())
    }
  }

  fn pacing() -> Pacing {
    Pacing {
      idle_sleep: Duration::from_secs(60),
      error_backoff: Duration::from_millis(250),
    }
  }

  fn consumer(
    source: Scripted,
    registry: Arc<Registry>,
  ) -> (Consumer<Scripted, NoNames, Counting>, Counting) {
    let sent = Counting::default();
    let c = Consumer::new(
      source,
      Dispatcher::new(NoNames, sent.clone()),
      registry,
      pacing(),
    );
    (c, sent)
  }

  #[test]
  fn idle_without_enabled_channels_never_polls() {
    let source = Scripted::default();
    let registry = Arc::new(Registry::new());
    registry.init("1");
    let (mut c, _) = consumer(source.clone(), registry);

    for _ in 0..3 {
      let cycle = c.step();
      assert_eq!(cycle.state, LoopState::Idle);
      assert_eq!(cycle.pause, pacing().idle_sleep);
    }
    assert_eq!(source.polls.load(Ordering::SeqCst), 0);
  }

  #[test]
  fn enabling_a_channel_leaves_idle() {
    let source = Scripted::default();
    let registry = Arc::new(Registry::new());
    let (mut c, _) = consumer(source.clone(), Arc::clone(&registry));
    assert_eq!(c.step().state, LoopState::Idle);

    registry.set_enabled("1", true);
    assert_eq!(c.step().state, LoopState::Polling);
    assert_eq!(source.polls.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn empty_queue_stays_polling() {
    let source = Scripted::default();
    let registry = Arc::new(Registry::new());
    registry.set_enabled("1", true);
    let (mut c, sent) = consumer(source, registry);

    let cycle = c.step();
    assert_eq!(cycle.state, LoopState::Polling);
    assert_eq!(cycle.pause, Duration::ZERO);
    assert_eq!(cycle.routed, None);
    assert_eq!(sent.0.load(Ordering::SeqCst), 0);
  }

  #[test]
  fn killmail_is_dispatched_then_back_to_polling() {
    let source = Scripted::default();
    source.push(Ok(KILL.to_string()));
    let registry = Arc::new(Registry::new());
    registry.set_enabled("1", true);
    let (mut c, sent) = consumer(source, registry);

    let cycle = c.step();
    assert_eq!(cycle.state, LoopState::Polling);
    assert_eq!(cycle.routed, Some(RouteSummary { matched: 1, delivered: 1 }));
    assert_eq!(sent.0.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn errors_are_not_fatal() {
    let source = Scripted::default();
    source.push(Err(Error::UpstreamUnavailable("connection reset".to_string())));
    source.push(Ok("<html>502</html>".to_string()));
    source.push(Ok(KILL.to_string()));
    let registry = Arc::new(Registry::new());
    registry.set_enabled("1", true);
    let (mut c, sent) = consumer(source, registry);

    let upstream = c.step();
    assert_eq!(upstream.state, LoopState::Polling);
    assert_eq!(upstream.pause, pacing().error_backoff);

    let malformed = c.step();
    assert_eq!(malformed.state, LoopState::Polling);
    assert_eq!(malformed.pause, pacing().error_backoff);

    assert!(c.step().routed.is_some());
    assert_eq!(sent.0.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn shutdown_interrupts_idle_sleep() {
    let registry = Arc::new(Registry::new());
    let (mut c, _) = consumer(Scripted::default(), registry);
    let (stop_tx, stop_rx) = mpsc::channel();

    let started = Instant::now();
    let handle = std::thread::spawn(move || {
      c.run(&stop_rx);
      c.state()
    });
    std::thread::sleep(Duration::from_millis(50));
    stop_tx.send(()).unwrap();

    assert_eq!(handle.join().unwrap(), LoopState::Idle);
    assert!(started.elapsed() < Duration::from_secs(5));
  }

  #[test]
  fn unreadable_body_backs_off() {
    let source = Scripted::default();
    source.push(Err(Error::MalformedPayload("body is not UTF-8".to_string())));
    let registry = Arc::new(Registry::new());
    registry.set_enabled("1", true);
    let (mut c, _) = consumer(source, registry);

    assert_eq!(c.step().pause, pacing().error_backoff);
  }

  #[test]
  fn maintenance_page_does_not_spin() {
    #[derive(Clone, Default)]
    struct Maintenance(Arc<AtomicUsize>);

    impl FeedSource for Maintenance {
      fn poll(&self) -> Result<String> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok("<html>maintenance</html>".to_string())
      }
    }

    let polls = Maintenance::default();
    let registry = Arc::new(Registry::new());
    registry.set_enabled("1", true);
    let mut c = Consumer::new(
      polls.clone(),
      Dispatcher::new(NoNames, Counting::default()),
      registry,
      Pacing {
        idle_sleep: Duration::from_secs(60),
        error_backoff: Duration::from_secs(2),
      },
    );
    let (stop_tx, stop_rx) = mpsc::channel();
    let handle = std::thread::spawn(move || c.run(&stop_rx));
    std::thread::sleep(Duration::from_millis(200));
    stop_tx.send(()).unwrap();
    handle.join().unwrap();

    assert_eq!(polls.0.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn shutdown_interrupts_error_backoff() {
    let source = Scripted::default();
    source.push(Err(Error::UpstreamUnavailable("connection refused".to_string())));
    let registry = Arc::new(Registry::new());
    registry.set_enabled("1", true);
    let mut c = Consumer::new(
      source.clone(),
      Dispatcher::new(NoNames, Counting::default()),
      registry,
      Pacing {
        idle_sleep: Duration::from_secs(60),
        error_backoff: Duration::from_secs(60),
      },
    );
    let (stop_tx, stop_rx) = mpsc::channel();

    let started = Instant::now();
    let handle = std::thread::spawn(move || c.run(&stop_rx));
    std::thread::sleep(Duration::from_millis(50));
    stop_tx.send(()).unwrap();
    handle.join().unwrap();

    assert_eq!(source.polls.load(Ordering::SeqCst), 1);
    assert!(started.elapsed() < Duration::from_secs(5));
  }

  #[test]
  fn dropped_sender_stops_the_loop() {
    let registry = Arc::new(Registry::new());
    let (mut c, _) = consumer(Scripted::default(), registry);
    let (stop_tx, stop_rx) = mpsc::channel::<()>();
    drop(stop_tx);
    c.run(&stop_rx);
  }
}
