//! 最优模型记录.

use std::path::{Path, PathBuf};

use ordered_float::OrderedFloat;

use crate::train::SegModel;

/// 记录验证指标的最优值, 并在严格提升时保存模型.
///
/// 初始最优值为 `0.0` (第 0 轮), 因此 Dice 为 0 的验证不会触发保存.
/// `NaN` 永远不算提升. 未指定保存路径时只记录, 不写盘.
#[derive(Debug, Clone)]
pub struct Checkpointer {
    path: Option<PathBuf>,
    best: (OrderedFloat<f64>, usize),
    saves: usize,
    saved_to: Option<PathBuf>,
}

impl Checkpointer {
    /// 新建. `path` 为 `None` 时不保存权重.
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path,
            best: (OrderedFloat(0.0), 0),
            saves: 0,
            saved_to: None,
        }
    }

    /// 提交第 `epoch` 轮 (从 1 开始) 的验证指标.
    ///
    /// 指标严格优于此前最优时更新记录, 必要时保存 `model`, 并返回 `true`.
    pub fn observe<M: SegModel>(
        &mut self,
        metric: f64,
        epoch: usize,
        model: &M,
    ) -> Result<bool, M::Error> {
        if metric.is_nan() {
            log::warn!("epoch {epoch}: validation metric is NaN, ignored");
            return Ok(false);
        }
        let metric = OrderedFloat(metric);
        if metric <= self.best.0 {
            return Ok(false);
        }

        self.best = (metric, epoch);
        if let Some(path) = &self.path {
            let written = model.save(path)?;
            log::info!("saved new best model to `{}`", written.display());
            self.saved_to = Some(written);
            self.saves += 1;
        }
        Ok(true)
    }

    /// 最优指标. 尚无提升时为 0.
    #[inline]
    pub fn best_metric(&self) -> f64 {
        self.best.0.into_inner()
    }

    /// 最优指标所在轮次. 尚无记录时为 0.
    #[inline]
    pub fn best_epoch(&self) -> usize {
        self.best.1
    }

    /// 实际保存的次数.
    #[inline]
    pub fn saves(&self) -> usize {
        self.saves
    }

    /// 最近一次写出的权重文件.
    #[inline]
    pub fn saved_to(&self) -> Option<&Path> {
        self.saved_to.as_deref()
    }
}
