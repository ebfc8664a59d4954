// 该文件是 Yanqian （眼前） 项目的一部分。
// src/session.rs - 单帧在途的检测会话
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

//! 检测会话在独立的工作线程上逐帧运行流水线。
//!
//! 同一时刻最多只有一帧在处理，处理期间送入的新帧直接丢弃而不排队。
//! 每帧的结果以新的 `Arc<FrameReport>` 整体替换上一份结果。
//! [`Session::stop`] 之后在途帧的结果被丢弃，新帧也不再接受，
//! 直到 [`Session::restart`]。

use std::{
  panic::{self, AssertUnwindSafe},
  sync::{
    Arc, Condvar, Mutex, MutexGuard,
    atomic::{AtomicBool, AtomicU64, Ordering},
    mpsc::{self, Sender},
  },
  thread::{self, JoinHandle},
  time::{Duration, Instant},
};

use tracing::{debug, info, warn};

use crate::{
  frame::RawFrame,
  model::InferenceAdapter,
  pipeline::{FrameReport, Pipeline},
};

/// [`Session::offer`] 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
  /// 帧已交给工作线程
  Accepted,
  /// 上一帧仍在处理，本帧被丢弃
  Busy,
  /// 会话已停止，本帧被丢弃
  Inactive,
}

struct Job {
  index: u64,
  epoch: u64,
  frame: RawFrame,
}

struct Shared {
  in_flight: AtomicBool,
  active: AtomicBool,
  epoch: AtomicU64,
  latest: Mutex<Option<Arc<FrameReport>>>,
  idle: Condvar,
}

impl Shared {
  fn lock_latest(&self) -> MutexGuard<'_, Option<Arc<FrameReport>>> {
    // 持锁方只做赋值，中毒后数据仍然完整
    self
      .latest
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
  }
}

/// 离开作用域时清除在途标记，工作线程因 panic 退出时同样生效
struct InFlightGuard<'a>(&'a Shared);

impl Drop for InFlightGuard<'_> {
  fn drop(&mut self) {
    let _latest = self.0.lock_latest();
    self.0.in_flight.store(false, Ordering::Release);
    self.0.idle.notify_all();
  }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
  payload
    .downcast_ref::<&str>()
    .copied()
    .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
    .unwrap_or("未知错误")
}

pub struct Session {
  shared: Arc<Shared>,
  jobs: Option<Sender<Job>>,
  worker: Option<JoinHandle<()>>,
}

impl Session {
  pub fn start<M>(pipeline: Pipeline<M>) -> std::io::Result<Self>
  where
    M: InferenceAdapter + Send + 'static,
  {
    Self::start_with_sink(pipeline, |_| {})
  }

  /// 与 [`Session::start`] 相同，另外每发布一份结果就交给 `sink`
  pub fn start_with_sink<M, S>(pipeline: Pipeline<M>, mut sink: S) -> std::io::Result<Self>
  where
    M: InferenceAdapter + Send + 'static,
    S: FnMut(Arc<FrameReport>) + Send + 'static,
  {
    let shared = Arc::new(Shared {
      in_flight: AtomicBool::new(false),
      active: AtomicBool::new(true),
      epoch: AtomicU64::new(0),
      latest: Mutex::new(None),
      idle: Condvar::new(),
    });
    let (tx, rx) = mpsc::channel::<Job>();

    let worker_shared = Arc::clone(&shared);
    let worker = thread::Builder::new()
      .name("yanqian-session".to_string())
      .spawn(move || {
        info!("会话工作线程启动");
        for job in rx {
          let _guard = InFlightGuard(&worker_shared);
          let run = AssertUnwindSafe(|| pipeline.run(job.index, &job.frame));
          let report = panic::catch_unwind(run).unwrap_or_else(|payload| {
            let message = panic_message(payload.as_ref());
            warn!("第 {} 帧处理时发生 panic: {}", job.index, message);
            FrameReport::failed(job.index, format!("处理时发生 panic: {}", message))
          });
          let report = Arc::new(report);

          let published = {
            let mut latest = worker_shared.lock_latest();
            let current = worker_shared.epoch.load(Ordering::Acquire);
            if job.epoch == current && worker_shared.active.load(Ordering::Acquire) {
              *latest = Some(Arc::clone(&report));
              true
            } else {
              debug!("会话已停止, 丢弃第 {} 帧的结果", job.index);
              false
            }
          };
          if published {
            sink(report);
          }
        }
        info!("会话工作线程退出");
      })?;

    Ok(Self {
      shared,
      jobs: Some(tx),
      worker: Some(worker),
    })
  }

  /// 送入一帧，若已有帧在处理则直接丢弃
  pub fn offer(&self, index: u64, frame: RawFrame) -> Offer {
    let epoch = match self.admit() {
      Ok(epoch) => epoch,
      Err(offer) => return offer,
    };

    let job = Job {
      index,
      epoch,
      frame,
    };
    match self.jobs.as_ref().map(|jobs| jobs.send(job)) {
      Some(Ok(())) => Offer::Accepted,
      _ => {
        warn!("会话工作线程不可用, 丢弃第 {} 帧", index);
        self.shared.in_flight.store(false, Ordering::Release);
        Offer::Inactive
      }
    }
  }

  /// 在 `stop` 使用的同一把锁下检查状态并占用在途标记，返回本帧所属的轮次
  fn admit(&self) -> Result<u64, Offer> {
    let _latest = self.shared.lock_latest();
    if !self.shared.active.load(Ordering::Acquire) {
      return Err(Offer::Inactive);
    }
    if self
      .shared
      .in_flight
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .is_err()
    {
      return Err(Offer::Busy);
    }
    Ok(self.shared.epoch.load(Ordering::Acquire))
  }

  /// 最近一次发布的结果
  pub fn latest(&self) -> Option<Arc<FrameReport>> {
    self.shared.lock_latest().clone()
  }

  pub fn is_active(&self) -> bool {
    self.shared.active.load(Ordering::Acquire)
  }

  pub fn is_busy(&self) -> bool {
    self.shared.in_flight.load(Ordering::Acquire)
  }

  /// 停止接收新帧，在途帧的结果将被丢弃
  pub fn stop(&self) {
    let _latest = self.shared.lock_latest();
    self.shared.active.store(false, Ordering::Release);
    self.shared.epoch.fetch_add(1, Ordering::AcqRel);
    info!("会话已停止");
  }

  pub fn restart(&self) {
    let _latest = self.shared.lock_latest();
    self.shared.active.store(true, Ordering::Release);
    info!("会话已重新开始");
  }

  /// 等待在途帧处理结束，超时返回 `false`
  pub fn wait_idle(&self, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    let mut guard = self.shared.lock_latest();
    while self.shared.in_flight.load(Ordering::Acquire) {
      let now = Instant::now();
      if now >= deadline {
        return false;
      }
      guard = match self.shared.idle.wait_timeout(guard, deadline - now) {
        Ok((guard, _)) => guard,
        Err(poisoned) => poisoned.into_inner().0,
      };
    }
    true
  }
}

impl Drop for Session {
  fn drop(&mut self) {
    self.shared.active.store(false, Ordering::Release);
    drop(self.jobs.take());
    if let Some(worker) = self.worker.take()
      && worker.join().is_err()
    {
      warn!("会话工作线程异常退出");
    }
  }
}
