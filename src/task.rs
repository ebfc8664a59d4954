// 该文件是 Yanqian （眼前） 项目的一部分。
// src/task.rs - 任务运行方式
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

use std::{
  sync::{
    Arc,
    mpsc::{self, Receiver},
  },
  thread,
  time::{Duration, Instant},
};
use tracing::{debug, info, warn};

use crate::{
  frame::RawFrame,
  model::InferenceAdapter,
  output::Render,
  pipeline::{FrameReport, Pipeline},
  session::{Offer, Session},
};

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(self, input: I, pipeline: Pipeline<M>, output: O) -> Result<(), Self::Error>;
}

pub struct OneShotTask;

impl<
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = RawFrame>,
  M: InferenceAdapter,
  O: Render<Error = RE>,
> Task<I, M, O> for OneShotTask
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, pipeline: Pipeline<M>, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!(
      "输入帧获取成功 ({}x{}), 开始处理...",
      frame.width(),
      frame.height()
    );
    let now = Instant::now();
    let processed = pipeline.process(&frame)?;
    let elapsed = now.elapsed();
    info!("处理完成，耗时: {:.2?}", elapsed);

    let report = FrameReport {
      index: 0,
      width: processed.width,
      height: processed.height,
      detections: processed.detections.into(),
      timings: Some(processed.timings),
      diagnostic: None,
    };
    output.render_result(&report)?;
    info!("输出完成");

    Ok(())
  }
}

/// 对同一帧重复处理并统计平均耗时，前两次作为预热不计入
pub struct RepeatShotTask {
  repeat: usize,
}

const DEFAULT_REPEAT_TIMES: usize = 1000;
const WARMUP_RUNS: usize = 2;

impl Default for RepeatShotTask {
  fn default() -> Self {
    Self {
      repeat: DEFAULT_REPEAT_TIMES,
    }
  }
}

fn average_after_warmup(samples: &[Duration]) -> Duration {
  let counted = samples.len().saturating_sub(WARMUP_RUNS).max(1);
  samples.iter().skip(WARMUP_RUNS).sum::<Duration>() / counted as u32
}

impl RepeatShotTask {
  pub fn with_repeat(mut self, repeat: usize) -> Self {
    self.repeat = repeat;
    self
  }
}

impl<
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = RawFrame>,
  M: InferenceAdapter,
  O: Render<Error = RE>,
> Task<I, M, O> for RepeatShotTask
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, pipeline: Pipeline<M>, output: O) -> Result<(), Self::Error> {
    if self.repeat <= WARMUP_RUNS {
      anyhow::bail!("重复次数必须大于 {}", WARMUP_RUNS);
    }

    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始处理...");
    let mut times = Vec::with_capacity(self.repeat);
    let mut inference = Vec::with_capacity(self.repeat);
    for i in 0..self.repeat {
      let now = Instant::now();
      let report = pipeline.run(i as u64, &frame);
      let elapsed = now.elapsed();
      debug!("({})处理完成，耗时: {:.2?}", i, elapsed);
      output.render_result(&report)?;
      if let Some(timings) = report.timings {
        inference.push(timings.inference);
      }
      times.push(elapsed);
    }

    warn!("平均处理时间: {:.2?}", average_after_warmup(&times));
    warn!("平均推理时间: {:.2?}", average_after_warmup(&inference));

    Ok(())
  }
}

/// 持续从输入取帧交给检测会话，处理中到达的帧被丢弃
#[derive(Default, Debug)]
pub struct ContinuousTask {
  frame_number: Option<usize>,
}

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

impl ContinuousTask {
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }
}

fn drain_reports<O: Render>(
  reports: &Receiver<Arc<FrameReport>>,
  output: &O,
) -> Result<usize, O::Error> {
  let mut rendered = 0;
  for report in reports.try_iter() {
    output.render_result(&report)?;
    rendered += 1;
  }
  Ok(rendered)
}

impl<
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = RawFrame>,
  M: InferenceAdapter + Send + 'static,
  O: Render<Error = RE>,
> Task<I, M, O> for ContinuousTask
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, pipeline: Pipeline<M>, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let (tx, rx) = mpsc::channel();

    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      let _ = tx.send(());
      thread::spawn(|| {
        thread::sleep(SHUTDOWN_TIMEOUT);
        warn!("强制退出程序");
        std::process::exit(1);
      });
    })?;

    let (report_tx, report_rx) = mpsc::channel();
    let session = Session::start_with_sink(pipeline, move |report| {
      let _ = report_tx.send(report);
    })?;

    let mut accepted = 0usize;
    let mut dropped = 0usize;
    let mut rendered = 0usize;
    for (frame_index, frame) in input.enumerate() {
      match session.offer(frame_index as u64, frame) {
        Offer::Accepted => {
          accepted += 1;
          debug!("第 {} 帧已提交", frame_index);
        }
        Offer::Busy => {
          dropped += 1;
          debug!("上一帧仍在处理，丢弃第 {} 帧", frame_index);
        }
        Offer::Inactive => {
          warn!("会话已停止，退出任务循环");
          break;
        }
      }

      rendered += drain_reports(&report_rx, &output)?;

      if self.frame_number.is_some_and(|n| accepted >= n) {
        info!("达到指定帧数 {}, 退出任务循环", accepted);
        break;
      }
      if rx.try_recv().is_ok() {
        warn!("中断信号接收，退出任务循环");
        session.stop();
        break;
      }
    }

    if !session.wait_idle(SHUTDOWN_TIMEOUT) {
      warn!("等待在途帧超时");
    }
    drop(session);
    rendered += drain_reports(&report_rx, &output)?;

    info!(
      "任务完成，提交 {} 帧，丢弃 {} 帧，输出 {} 帧",
      accepted, dropped, rendered
    );
    Ok(())
  }
}
