//! 损失函数.

use burn::prelude::*;
use burn::tensor::activation::sigmoid;

/// 分子分母的平滑项.
const SMOOTH: f32 = 1e-5;

/// Dice 损失.
///
/// 先对 `logits` 取 sigmoid, 对每个样本的每个通道计算
/// `1 - (2 * Σ(p * g) + ε) / (Σp + Σg + ε)`, 再取平均. 返回单元素张量.
pub fn dice_loss<B: Backend>(logits: Tensor<B, 4>, target: Tensor<B, 4>) -> Tensor<B, 1> {
    let [n, c, h, w] = logits.dims();
    let p = sigmoid(logits).reshape([n * c, h * w]);
    let g = target.reshape([n * c, h * w]);

    let inter = (p.clone() * g.clone()).sum_dim(1);
    let denom = p.sum_dim(1) + g.sum_dim(1);
    let dice = (inter * 2.0 + SMOOTH) / (denom + SMOOTH);
    (dice.neg() + 1.0).mean()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::ElementConversion;

    fn loss_of(logits: Vec<f32>, target: Vec<f32>) -> f32 {
        let device = Default::default();
        let shape = [1, 1, 2, 2];
        let logits = Tensor::<NdArray, 4>::from_data(TensorData::new(logits, shape), &device);
        let target = Tensor::<NdArray, 4>::from_data(TensorData::new(target, shape), &device);
        dice_loss(logits, target).into_scalar().elem::<f32>()
    }

    #[test]
    fn test_dice_loss_bounds() {
        let target = vec![1.0, 1.0, 0.0, 0.0];
        let good = loss_of(vec![20.0, 20.0, -20.0, -20.0], target.clone());
        let bad = loss_of(vec![-20.0, -20.0, 20.0, 20.0], target.clone());
        assert!(good < 1e-3, "{good}");
        assert!(bad > 0.99, "{bad}");

        // 全零 logits: p = 0.5, 1 - 2 * 1 / (2 + 2)
        let half = loss_of(vec![0.0; 4], target);
        assert!((half - 0.5).abs() < 1e-4, "{half}");
    }

    #[test]
    fn test_empty_target() {
        // 真值为空且预测也为空时, 平滑项让损失接近 0.
        let loss = loss_of(vec![-30.0; 4], vec![0.0; 4]);
        assert!(loss < 0.01, "{loss}");
    }
}
