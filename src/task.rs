// 该文件是 Shanan （山南西风） 项目的一部分。
// src/task.rs - 任务调度
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
  sync::mpsc::{self, Receiver},
  thread,
  time::{Duration, Instant},
};

use rayon::prelude::*;
use tracing::{error, info, warn};

use crate::{output::Render, pipeline::Pipeline};

pub trait Task<I, P, O>: Sized {
  type Error;
  fn run_task(self, input: I, pipeline: P, output: O) -> Result<(), Self::Error>;
}

/// 安装 Ctrl-C 处理：首次信号通知任务循环退出，30 秒后仍未退出则强制结束进程
fn interrupt_channel() -> anyhow::Result<Receiver<()>> {
  let (tx, rx) = mpsc::channel();
  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    let _ = tx.send(());
    thread::spawn(|| {
      thread::sleep(Duration::from_secs(30));
      warn!("强制退出程序");
      std::process::exit(1);
    });
  })?;
  Ok(rx)
}

pub struct OneShotTask;

impl<
  F,
  D,
  PE: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  P: Pipeline<Input = F, Output = D, Error = PE>,
  O: Render<F, D, Error = RE>,
> Task<I, P, O> for OneShotTask
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, pipeline: P, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let record = input.next().ok_or_else(|| anyhow::anyhow!("没有输入记录"))?;
    let now = Instant::now();
    let result = pipeline.process(&record)?;
    let elapsed = now.elapsed();
    info!("处理完成，耗时: {:.2?}", elapsed);
    output.render_result(&record, &result)?;
    info!("输出完成，耗时: {:.2?}", now.elapsed());

    Ok(())
  }
}

/// 对首条记录重复处理，统计平均耗时
pub struct RepeatShotTask {
  repeat_times: usize,
}

impl Default for RepeatShotTask {
  fn default() -> Self {
    Self { repeat_times: 1000 }
  }
}

impl RepeatShotTask {
  pub fn with_repeat_times(mut self, repeat_times: usize) -> Self {
    self.repeat_times = repeat_times;
    self
  }
}

impl<
  F,
  D,
  PE: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  P: Pipeline<Input = F, Output = D, Error = PE>,
  O: Render<F, D, Error = RE>,
> Task<I, P, O> for RepeatShotTask
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, pipeline: P, output: O) -> Result<(), Self::Error> {
    // 前两次计入缓存构建等预热开销，不参与平均
    const WARMUP: usize = 2;

    info!("开始任务...");
    let record = input.next().ok_or_else(|| anyhow::anyhow!("没有输入记录"))?;
    let mut times = Vec::with_capacity(self.repeat_times);
    for i in 0..self.repeat_times {
      let now = Instant::now();
      let result = pipeline.process(&record)?;
      let elapsed = now.elapsed();
      info!("({})处理完成，耗时: {:.2?}", i, elapsed);
      output.render_result(&record, &result)?;
      times.push(elapsed);
    }

    if times.len() > WARMUP {
      warn!(
        "平均处理时间: {:.2?}",
        times.iter().skip(WARMUP).sum::<Duration>() / (times.len() - WARMUP) as u32
      );
    } else {
      warn!("重复次数不足 {}，不统计平均处理时间", WARMUP + 1);
    }

    Ok(())
  }
}

#[derive(Default, Debug)]
pub struct ContinuousTask {
  frame_number: Option<usize>,
}

impl ContinuousTask {
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }
}

impl<
  F,
  D,
  PE: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  P: Pipeline<Input = F, Output = D, Error = PE>,
  O: Render<F, D, Error = RE>,
> Task<I, P, O> for ContinuousTask
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, pipeline: P, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let rx = interrupt_channel()?;

    let mut frame_index = 0usize;
    let mut now = Instant::now();
    for record in input {
      frame_index = frame_index.wrapping_add(1);
      info!("处理第 {} 条记录", frame_index);
      let result = pipeline.process(&record)?;
      let elapsed_a = now.elapsed();
      output.render_result(&record, &result)?;
      let elapsed_b = now.elapsed();
      now = Instant::now();
      info!("处理完成，耗时: {:.2?} / {:.2?}", elapsed_a, elapsed_b);
      if self.frame_number.is_some_and(|n| frame_index >= n) {
        info!("达到指定记录数 {}, 退出任务循环", frame_index);
        break;
      }
      if rx.try_recv().is_ok() {
        warn!("中断信号接收，退出任务循环");
        break;
      }
    }

    info!("任务完成，退出");
    Ok(())
  }
}

/// 在线程池上并行处理记录，按输入顺序输出。
///
/// 单条记录的处理错误会记录日志后跳过，不影响同批其他记录。
#[derive(Debug)]
pub struct BatchTask {
  num_threads: usize,
  chunk_size: usize,
  frame_number: Option<usize>,
  handle_interrupt: bool,
}

impl Default for BatchTask {
  fn default() -> Self {
    Self {
      num_threads: 0,
      chunk_size: 64,
      frame_number: None,
      handle_interrupt: true,
    }
  }
}

impl BatchTask {
  /// 0 表示使用 rayon 默认线程数
  pub fn with_num_threads(mut self, num_threads: usize) -> Self {
    self.num_threads = num_threads;
    self
  }

  pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
    self.chunk_size = chunk_size.max(1);
    self
  }

  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  pub fn with_interrupt(mut self, handle_interrupt: bool) -> Self {
    self.handle_interrupt = handle_interrupt;
    self
  }
}

impl<
  F: Sync,
  D: Send,
  PE: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  P: Pipeline<Input = F, Output = D, Error = PE> + Sync,
  O: Render<F, D, Error = RE>,
> Task<I, P, O> for BatchTask
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, pipeline: P, output: O) -> Result<(), Self::Error> {
    let pool = rayon::ThreadPoolBuilder::new()
      .num_threads(self.num_threads)
      .build()?;
    info!(
      "开始批处理任务: {} 个线程, 每批 {} 条",
      pool.current_num_threads(),
      self.chunk_size
    );
    let rx = if self.handle_interrupt {
      Some(interrupt_channel()?)
    } else {
      None
    };

    let limit = self.frame_number.unwrap_or(usize::MAX);
    let mut input = input.take(limit);
    let (mut processed, mut failed) = (0usize, 0usize);
    let started = Instant::now();
    loop {
      let chunk: Vec<F> = input.by_ref().take(self.chunk_size).collect();
      if chunk.is_empty() {
        break;
      }

      let results: Vec<Result<D, PE>> =
        pool.install(|| chunk.par_iter().map(|record| pipeline.process(record)).collect());

      for (record, result) in chunk.iter().zip(results) {
        processed += 1;
        match result {
          Ok(result) => output.render_result(record, &result)?,
          Err(e) => {
            failed += 1;
            error!("第 {} 条记录处理失败: {}", processed, e);
          }
        }
      }

      if rx.as_ref().is_some_and(|rx| rx.try_recv().is_ok()) {
        warn!("中断信号接收，退出任务循环");
        break;
      }
    }

    info!(
      "批处理完成: {} 条记录, 失败 {} 条, 耗时 {:.2?}",
      processed,
      failed,
      started.elapsed()
    );
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use std::{convert::Infallible, sync::Mutex};

  use thiserror::Error;

  use super::*;

  #[derive(Error, Debug)]
  #[error("负数输入 {0}")]
  struct Negative(i64);

  struct Square;

  impl Pipeline for Square {
    type Input = i64;
    type Output = i64;
    type Error = Negative;

    fn process(&self, input: &i64) -> Result<i64, Negative> {
      if *input < 0 {
        return Err(Negative(*input));
      }
      Ok(input * input)
    }
  }

  #[derive(Default)]
  struct Collect(Mutex<Vec<(i64, i64)>>);

  impl Render<i64, i64> for &Collect {
    type Error = Infallible;

    fn render_result(&self, frame: &i64, result: &i64) -> Result<(), Infallible> {
      self.0.lock().unwrap().push((*frame, *result));
      Ok(())
    }
  }

  #[derive(Error, Debug)]
  #[error("拒绝")]
  struct Refuse;

  struct Reject;

  impl Render<i64, i64> for Reject {
    type Error = Refuse;

    fn render_result(&self, _: &i64, _: &i64) -> Result<(), Refuse> {
      Err(Refuse)
    }
  }

  fn batch() -> BatchTask {
    BatchTask::default()
      .with_num_threads(4)
      .with_chunk_size(3)
      .with_interrupt(false)
  }

  #[test]
  fn batch_preserves_input_order() {
    let sink = Collect::default();
    batch().run_task(0..20i64, Square, &sink).unwrap();
    let got = sink.0.into_inner().unwrap();
    let expected: Vec<_> = (0..20i64).map(|x| (x, x * x)).collect();
    assert_eq!(got, expected);
  }

  #[test]
  fn batch_skips_failed_records() {
    let sink = Collect::default();
    batch()
      .run_task(vec![1i64, -2, 3].into_iter(), Square, &sink)
      .unwrap();
    assert_eq!(sink.0.into_inner().unwrap(), vec![(1, 1), (3, 9)]);
  }

  #[test]
  fn batch_respects_frame_number() {
    let sink = Collect::default();
    batch()
      .with_frame_number(Some(5))
      .run_task(0..100i64, Square, &sink)
      .unwrap();
    assert_eq!(sink.0.into_inner().unwrap().len(), 5);
  }

  #[test]
  fn output_errors_abort_the_batch() {
    assert!(batch().run_task(0..4i64, Square, Reject).is_err());
  }

  #[test]
  fn one_shot_processes_first_record_only() {
    let sink = Collect::default();
    OneShotTask.run_task(7..10i64, Square, &sink).unwrap();
    assert_eq!(sink.0.into_inner().unwrap(), vec![(7, 49)]);
  }

  #[test]
  fn one_shot_propagates_pipeline_error() {
    let sink = Collect::default();
    assert!(OneShotTask.run_task(-1..0i64, Square, &sink).is_err());
  }

  #[test]
  fn repeat_shot_runs_requested_times() {
    let sink = Collect::default();
    RepeatShotTask::default()
      .with_repeat_times(5)
      .run_task(3..4i64, Square, &sink)
      .unwrap();
    assert_eq!(sink.0.into_inner().unwrap(), vec![(3, 9); 5]);
  }
}
