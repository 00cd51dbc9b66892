//! 分割指标累积器.

use ndarray::{ArrayView4, Axis};

/// 跨批次累积的指标. 每一轮开始前调用 `reset`.
pub trait MetricAccumulator {
    /// 累积一个批次. 两者形状均为 `[n, c, H, W]`, `prediction` 为概率.
    fn accumulate(&mut self, prediction: ArrayView4<f32>, target: ArrayView4<f32>);

    /// 读取当前聚合值.
    fn aggregate(&self) -> f64;

    /// 清空.
    fn reset(&mut self);
}

/// 平均 Dice 系数.
///
/// 对每个样本的每个通道计算 `2 * Σ(p * g) / (Σp + Σg)`. 真值全为背景的通道不计入;
/// 一个也没有计入时聚合值为 `0.0`.
#[derive(Debug, Clone, Default)]
pub struct DiceMetric {
    sum: f64,
    count: usize,
}

impl DiceMetric {
    /// 新建.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// 已计入的 (样本, 通道) 个数.
    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }
}

impl MetricAccumulator for DiceMetric {
    fn accumulate(&mut self, prediction: ArrayView4<f32>, target: ArrayView4<f32>) {
        debug_assert_eq!(prediction.shape(), target.shape());
        for (p, g) in prediction.outer_iter().zip(target.outer_iter()) {
            for (pc, gc) in p.axis_iter(Axis(0)).zip(g.axis_iter(Axis(0))) {
                let g_sum: f64 = gc.iter().map(|v| *v as f64).sum();
                if g_sum <= 0.0 {
                    continue;
                }
                let p_sum: f64 = pc.iter().map(|v| *v as f64).sum();
                let inter: f64 = pc
                    .iter()
                    .zip(gc.iter())
                    .map(|(a, b)| (*a as f64) * (*b as f64))
                    .sum();
                self.sum += 2.0 * inter / (p_sum + g_sum);
                self.count += 1;
            }
        }
    }

    fn aggregate(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}
