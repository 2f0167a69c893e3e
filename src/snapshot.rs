// 该文件是 Shanan （山南西风） 项目的一部分。
// src/snapshot.rs - 单写多读快照
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

//! 轮询器与渲染循环之间的数据交接。
//!
//! 两者运行在互不同步的节奏上（固定间隔定时器与显示刷新节拍），
//! 写端整体替换快照，读端总是拿到最近一次完整发布的 `Arc`。

use std::sync::Arc;

use tokio::sync::watch;

/// 一次发布的快照，`ticket` 越大越新
#[derive(Debug)]
pub struct Snapshot<T> {
  pub ticket: u64,
  pub data: Arc<T>,
}

impl<T> Clone for Snapshot<T> {
  fn clone(&self) -> Self {
    Self {
      ticket: self.ticket,
      data: self.data.clone(),
    }
  }
}

#[derive(Debug)]
pub struct SnapshotStore<T> {
  tx: watch::Sender<Snapshot<T>>,
}

impl<T: Default> Default for SnapshotStore<T> {
  fn default() -> Self {
    Self::new(T::default())
  }
}

impl<T> SnapshotStore<T> {
  pub fn new(initial: T) -> Self {
    let (tx, _) = watch::channel(Snapshot {
      ticket: 0,
      data: Arc::new(initial),
    });
    Self { tx }
  }

  /// 仅当 `ticket` 比当前快照新时才替换，过期的完成结果被丢弃
  pub fn publish(&self, ticket: u64, data: T) -> bool {
    let data = Arc::new(data);
    self.tx.send_if_modified(|current| {
      if ticket > current.ticket {
        *current = Snapshot { ticket, data };
        true
      } else {
        false
      }
    })
  }

  /// 恢复为空值，保留 ticket 使旧请求仍然被视为过期
  pub fn reset(&self, empty: T) {
    let data = Arc::new(empty);
    self.tx.send_modify(|current| current.data = data);
  }

  pub fn latest(&self) -> Snapshot<T> {
    self.tx.borrow().clone()
  }

  pub fn reader(&self) -> SnapshotReader<T> {
    SnapshotReader {
      rx: self.tx.subscribe(),
    }
  }
}

/// 只读句柄，供渲染端每帧读取
#[derive(Debug)]
pub struct SnapshotReader<T> {
  rx: watch::Receiver<Snapshot<T>>,
}

impl<T> Clone for SnapshotReader<T> {
  fn clone(&self) -> Self {
    Self { rx: self.rx.clone() }
  }
}

impl<T> SnapshotReader<T> {
  pub fn latest(&self) -> Snapshot<T> {
    self.rx.borrow().clone()
  }

  /// 等待下一次发布；写端已销毁时返回 `None`
  pub async fn changed(&mut self) -> Option<Snapshot<T>> {
    self.rx.changed().await.ok()?;
    Some(self.rx.borrow_and_update().clone())
  }
}
