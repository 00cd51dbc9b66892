//! 训练流程.
//!
//! 训练循环只依赖 [`SegModel`] 与 [`MetricAccumulator`] 两个抽象, 与具体的网络和后端无关:
//!
//! 1. 每一轮在训练集上逐批调用 [`SegModel::train_step`], 累计损失与指标,
//!   然后推进学习率调度;
//! 2. 每 `val_interval` 轮在验证集上逐批调用 [`SegModel::eval_step`],
//!   并交给 [`Checkpointer`] 判断是否为新的最优;
//! 3. 结束后可选地在测试集上评估一次.
//!
//! 每一轮的损失为该轮所有批损失之和.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use ndarray::Array4;

use crate::dataset::{Batch, SliceDataset, Split};
use crate::error::{ConfigError, TrainError};

pub mod checkpoint;
pub mod metric;
pub mod schedule;
pub mod scores;

pub use checkpoint::Checkpointer;
pub use metric::{DiceMetric, MetricAccumulator};
pub use schedule::StepLr;
pub use scores::{RunSummary, ScoreWriter};

/// 单个批次的输出.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutput {
    /// 批损失.
    pub loss: f64,

    /// 经过 sigmoid 的预测概率, 形状与标签一致.
    pub prediction: Array4<f32>,
}

/// 可训练的分割模型.
pub trait SegModel {
    /// 后端错误.
    type Error: std::error::Error + 'static;

    /// 前向, 反向并更新一次参数.
    fn train_step(&mut self, batch: &Batch) -> Result<StepOutput, Self::Error>;

    /// 仅前向, 不更新参数.
    fn eval_step(&self, batch: &Batch) -> Result<StepOutput, Self::Error>;

    /// 推进学习率调度, 每轮训练后调用一次.
    fn advance_schedule(&mut self);

    /// 当前学习率.
    fn learning_rate(&self) -> f64;

    /// 保存权重. `path` 不含扩展名, 返回实际写出的文件.
    fn save(&self, path: &Path) -> Result<PathBuf, Self::Error>;
}

/// 训练流程所处阶段.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Phase {
    /// 训练.
    Train,

    /// 验证.
    Validate,

    /// 保存最优模型.
    Checkpoint,

    /// 测试.
    Test,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Train => "training",
            Self::Validate => "validation",
            Self::Checkpoint => "checkpointing",
            Self::Test => "testing",
        })
    }
}

/// 各阶段的逐轮记录.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingState {
    /// 每轮训练损失.
    pub train_loss: Vec<f64>,

    /// 每轮训练指标.
    pub train_dice: Vec<f64>,

    /// 每次验证的损失.
    pub val_loss: Vec<f64>,

    /// 每次验证的指标.
    pub val_dice: Vec<f64>,

    /// 测试损失. 未测试时为 `None`.
    pub test_loss: Option<f64>,

    /// 测试指标. 未测试时为 `None`.
    pub test_dice: Option<f64>,
}

/// 训练循环参数.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LoopConfig {
    /// 训练轮数.
    pub epochs: usize,

    /// 验证间隔 (轮).
    pub val_interval: usize,
}

impl LoopConfig {
    /// 检查参数.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.epochs == 0 {
            Err(ConfigError::ZeroEpochs)
        } else if self.val_interval == 0 {
            Err(ConfigError::ZeroInterval)
        } else {
            Ok(())
        }
    }

    /// 第 `epoch` 轮 (从 1 开始) 之后是否验证?
    #[inline]
    pub fn validates_at(&self, epoch: usize) -> bool {
        epoch % self.val_interval == 0
    }
}

/// 在一个划分上跑完所有批, 返回 (损失和, 指标).
fn run_pass<E, A: MetricAccumulator>(
    batches: impl Iterator<Item = Batch>,
    metric: &mut A,
    mut step: impl FnMut(&Batch) -> Result<StepOutput, E>,
) -> Result<(f64, f64), E> {
    metric.reset();
    let mut loss = 0.0;
    for batch in batches {
        let out = step(&batch)?;
        loss += out.loss;
        metric.accumulate(out.prediction.view(), batch.masks.view());
    }
    let value = metric.aggregate();
    metric.reset();
    Ok((loss, value))
}

/// 训练循环.
#[derive(Copy, Clone, Debug)]
pub struct TrainingLoop {
    config: LoopConfig,
}

impl TrainingLoop {
    /// 构建, 非法参数立即报错.
    pub fn new(config: LoopConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// 参数.
    #[inline]
    pub fn config(&self) -> LoopConfig {
        self.config
    }

    /// 训练 `epochs` 轮, 返回逐轮记录. 最优指标由 `checkpointer` 持有.
    pub fn run<M: SegModel, A: MetricAccumulator>(
        &self,
        model: &mut M,
        dataset: &SliceDataset,
        metric: &mut A,
        checkpointer: &mut Checkpointer,
    ) -> Result<TrainingState, TrainError<M::Error>> {
        dataset.require_nonempty(&[Split::Train, Split::Val])?;
        log::info!(
            "starting training: {} epoch(s), {} train / {} val batch(es) per epoch",
            self.config.epochs,
            dataset.batch_count(Split::Train),
            dataset.batch_count(Split::Val)
        );

        let mut state = TrainingState::default();
        for epoch in 1..=self.config.epochs {
            let (loss, dice) = run_pass(dataset.batches(Split::Train), metric, |b| {
                model.train_step(b)
            })
            .map_err(|source| TrainError::Model {
                phase: Phase::Train,
                epoch,
                source,
            })?;
            state.train_loss.push(loss);
            state.train_dice.push(dice);

            model.advance_schedule();
            log::info!(
                "epoch {epoch}, learning rate: {:.3e}, train loss: {loss:.4}, train dice: {dice:.4}",
                model.learning_rate()
            );

            if !self.config.validates_at(epoch) {
                continue;
            }

            let (loss, dice) = run_pass(dataset.batches(Split::Val), metric, |b| {
                model.eval_step(b)
            })
            .map_err(|source| TrainError::Model {
                phase: Phase::Validate,
                epoch,
                source,
            })?;
            state.val_loss.push(loss);
            state.val_dice.push(dice);
            log::info!("epoch {epoch}, val loss: {loss:.4}, val dice: {dice:.4}");

            let improved = checkpointer
                .observe(dice, epoch, &*model)
                .map_err(|source| TrainError::Model {
                    phase: Phase::Checkpoint,
                    epoch,
                    source,
                })?;
            if improved {
                log::info!("best metric: {dice:.4} at epoch: {epoch}");
            }
        }

        log::info!(
            "training completed, best metric: {:.4} at epoch: {}",
            checkpointer.best_metric(),
            checkpointer.best_epoch()
        );
        if let Some(path) = checkpointer.saved_to() {
            log::info!("best model saved at: `{}`", path.display());
        }
        Ok(state)
    }

    /// 在测试集上评估一次, 结果写入 `state`, 并返回 (损失和, 指标).
    pub fn test<M: SegModel, A: MetricAccumulator>(
        &self,
        model: &M,
        dataset: &SliceDataset,
        metric: &mut A,
        state: &mut TrainingState,
    ) -> Result<(f64, f64), TrainError<M::Error>> {
        dataset.require_nonempty(&[Split::Test])?;
        log::info!("starting testing on {} sample(s)", dataset.len(Split::Test));
        let start = Instant::now();
        let (loss, dice) = run_pass(dataset.batches(Split::Test), metric, |b| {
            model.eval_step(b)
        })
        .map_err(|source| TrainError::Model {
            phase: Phase::Test,
            epoch: self.config.epochs,
            source,
        })?;
        log::info!(
            "test loss: {loss:.4}, test dice: {dice:.4}, time: {:?}",
            start.elapsed()
        );

        state.test_loss = Some(loss);
        state.test_dice = Some(dice);
        Ok((loss, dice))
    }
}
