// 该文件是 Shanan （山南西风） 项目的一部分。
// src/alerts.rs - 告警去重与通知列表
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::model::Alert;
use crate::model::stream::StreamMessage;
use crate::snapshot::{SnapshotReader, SnapshotStore};
use crate::stream::{Channel, StreamError, StreamHub, Subscription};

pub const DEFAULT_ALERT_CAPACITY: usize = 5;

/// 告警身份；合成身份互不相同，永远不会被去重
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AlertKey {
  Server(String),
  Synthetic(u64),
}

impl fmt::Display for AlertKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      AlertKey::Server(id) => f.write_str(id),
      AlertKey::Synthetic(n) => write!(f, "local-{n}"),
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlertEntry {
  pub key: AlertKey,
  pub alert: Alert,
}

/// 最近告警列表，新的在前
#[derive(Debug)]
pub struct AlertDeduplicator {
  capacity: usize,
  entries: VecDeque<AlertEntry>,
  next_synthetic: u64,
}

impl Default for AlertDeduplicator {
  fn default() -> Self {
    Self::with_capacity(DEFAULT_ALERT_CAPACITY)
  }
}

impl AlertDeduplicator {
  pub fn with_capacity(capacity: usize) -> Self {
    let capacity = capacity.max(1);
    Self {
      capacity,
      entries: VecDeque::with_capacity(capacity),
      next_synthetic: 0,
    }
  }

  /// 新告警返回 `true`；已在列表中的身份不做任何事并返回 `false`
  pub fn admit(&mut self, alert: Alert) -> bool {
    let key = match &alert.id {
      Some(id) => {
        let key = AlertKey::Server(id.clone());
        if self.entries.iter().any(|entry| entry.key == key) {
          return false;
        }
        key
      }
      None => {
        self.next_synthetic += 1;
        AlertKey::Synthetic(self.next_synthetic)
      }
    };

    self.entries.push_front(AlertEntry { key, alert });
    self.entries.truncate(self.capacity);
    true
  }

  pub fn entries(&self) -> impl Iterator<Item = &AlertEntry> {
    self.entries.iter()
  }

  pub fn dismiss(&mut self, key: &AlertKey) -> bool {
    let before = self.entries.len();
    self.entries.retain(|entry| entry.key != *key);
    self.entries.len() != before
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }
}

pub type NewAlertHook = Arc<dyn Fn(&Alert) + Send + Sync>;

struct AlertBoard {
  dedup: Mutex<AlertDeduplicator>,
  store: SnapshotStore<Vec<AlertEntry>>,
  ticket: Mutex<u64>,
  on_new: Option<NewAlertHook>,
}

impl AlertBoard {
  fn new(capacity: usize, on_new: Option<NewAlertHook>) -> Self {
    Self {
      dedup: Mutex::new(AlertDeduplicator::with_capacity(capacity)),
      store: SnapshotStore::new(Vec::new()),
      ticket: Mutex::new(0),
      on_new,
    }
  }

  fn accept(&self, message: &StreamMessage) {
    let StreamMessage::Anomaly(anomaly) = message else {
      return;
    };
    let alert = anomaly.clone().into_alert();
    let admitted = {
      let mut dedup = self.dedup.lock();
      let admitted = dedup.admit(alert.clone());
      if admitted {
        self.publish(&dedup);
      }
      admitted
    };

    if admitted {
      info!(
        "告警 [{}] {}: {}",
        alert.severity, alert.rule_name, alert.caption
      );
      if let Some(hook) = &self.on_new {
        hook(&alert);
      }
    } else {
      debug!("重复告警 {:?}，忽略", alert.id);
    }
  }

  fn dismiss(&self, key: &AlertKey) -> bool {
    let mut dedup = self.dedup.lock();
    let removed = dedup.dismiss(key);
    if removed {
      self.publish(&dedup);
    }
    removed
  }

  // 调用方持有去重锁，保证快照按顺序发布
  fn publish(&self, dedup: &AlertDeduplicator) {
    let mut ticket = self.ticket.lock();
    *ticket += 1;
    self.store.publish(*ticket, dedup.entries().cloned().collect());
  }
}

/// 告警通知列表：订阅告警通道，去重后发布快照
pub struct AlertFeed {
  board: Arc<AlertBoard>,
  _subscription: Subscription,
}

impl AlertFeed {
  pub fn start(
    hub: &StreamHub,
    capacity: usize,
    on_new: Option<NewAlertHook>,
  ) -> Result<Self, StreamError> {
    let board = Arc::new(AlertBoard::new(capacity, on_new));
    let receiver = board.clone();
    let subscription = hub.subscribe(Channel::Alerts, move |message| receiver.accept(message))?;
    Ok(Self {
      board,
      _subscription: subscription,
    })
  }

  pub fn reader(&self) -> SnapshotReader<Vec<AlertEntry>> {
    self.board.store.reader()
  }

  pub fn entries(&self) -> Arc<Vec<AlertEntry>> {
    self.board.store.latest().data
  }

  pub fn dismiss(&self, key: &AlertKey) -> bool {
    self.board.dismiss(key)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::Severity;
  use crate::stream::StreamOptions;
  use crate::stream::client::tests::ScriptedConnector;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::time::Duration;
  use url::Url;

  fn alert(id: Option<&str>) -> Alert {
    Alert {
      id: id.map(str::to_string),
      severity: Severity::High,
      rule_name: "Loitering".to_string(),
      camera_id: None,
      caption: "a person waits".to_string(),
      detected_at: None,
    }
  }

  fn server(id: &str) -> AlertKey {
    AlertKey::Server(id.to_string())
  }

  fn ids(dedup: &AlertDeduplicator) -> Vec<String> {
    dedup.entries().map(|entry| entry.key.to_string()).collect()
  }

  #[test]
  fn same_identity_is_admitted_once() {
    let mut dedup = AlertDeduplicator::default();
    assert_eq!((dedup.admit(alert(Some("a1"))), dedup.admit(alert(Some("a1")))), (true, false));
    assert_eq!(dedup.len(), 1);
  }

  #[test]
  fn keeps_five_newest() {
    let mut dedup = AlertDeduplicator::default();
    for n in 1..=6 {
      assert!(dedup.admit(alert(Some(&format!("a{n}")))));
    }
    assert_eq!(ids(&dedup), vec!["a6", "a5", "a4", "a3", "a2"]);
  }

  #[test]
  fn evicted_identity_can_return() {
    let mut dedup = AlertDeduplicator::with_capacity(2);
    dedup.admit(alert(Some("a1")));
    dedup.admit(alert(Some("a2")));
    dedup.admit(alert(Some("a3")));
    assert!(dedup.admit(alert(Some("a1"))));
  }

  #[test]
  fn synthetic_identities_are_never_merged() {
    let mut dedup = AlertDeduplicator::default();
    assert!(dedup.admit(alert(None)));
    assert!(dedup.admit(alert(None)));
    assert_eq!(ids(&dedup), vec!["local-2", "local-1"]);
  }

  #[test]
  fn dismiss_removes_entry() {
    let mut dedup = AlertDeduplicator::default();
    dedup.admit(alert(Some("a1")));
    dedup.admit(alert(None));
    assert!(dedup.dismiss(&AlertKey::Synthetic(1)));
    assert!(!dedup.dismiss(&server("missing")));
    assert_eq!(ids(&dedup), vec!["a1"]);
    assert!(dedup.dismiss(&server("a1")));
    assert!(dedup.is_empty());
  }

  #[test]
  fn server_id_spelled_like_local_key_is_distinct() {
    let mut dedup = AlertDeduplicator::default();
    dedup.admit(alert(None));
    dedup.admit(alert(Some("local-1")));
    assert_eq!(dedup.len(), 2);

    assert!(dedup.dismiss(&server("local-1")));
    let left: Vec<_> = dedup.entries().map(|entry| entry.key.clone()).collect();
    assert_eq!(left, vec![AlertKey::Synthetic(1)]);
  }

  #[test]
  fn board_ignores_other_messages() {
    let board = AlertBoard::new(DEFAULT_ALERT_CAPACITY, None);
    board.accept(&StreamMessage::Pong);
    board.accept(&StreamMessage::parse(r#"{"type":"caption","caption":"hi"}"#).unwrap());
    assert!(board.store.latest().data.is_empty());
  }

  #[tokio::test(start_paused = true)]
  async fn duplicate_delivery_yields_one_notification() {
    let connector = ScriptedConnector::new();
    let feed = connector.accept();
    let hub = StreamHub::new(
      Url::parse("ws://localhost:8000/api/v1").unwrap(),
      connector,
      StreamOptions::default(),
    );
    let notified = Arc::new(AtomicUsize::new(0));
    let counter = notified.clone();
    let alerts = AlertFeed::start(
      &hub,
      DEFAULT_ALERT_CAPACITY,
      Some(Arc::new(move |_: &Alert| {
        counter.fetch_add(1, Ordering::SeqCst);
      })),
    )
    .unwrap();

    tokio::time::sleep(Duration::from_millis(1)).await;
    let message = r#"{"type":"anomaly","anomaly_id":"a1","rule_name":"Intrusion","severity":"critical"}"#;
    feed.send(Ok(message.to_string())).unwrap();
    feed.send(Ok(message.to_string())).unwrap();
    tokio::time::sleep(Duration::from_millis(1)).await;

    let entries = alerts.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].alert.severity, Severity::Critical);
    assert_eq!(notified.load(Ordering::SeqCst), 1);

    assert!(alerts.dismiss(&server("a1")));
    assert!(alerts.entries().is_empty());

    drop(alerts);
    assert_eq!(hub.channel_count(), 0);
  }
}
