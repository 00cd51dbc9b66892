//! 残差 UNet.

use burn::nn::conv::{Conv2d, ConvTranspose2d, ConvTranspose2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig};
use burn::prelude::*;
use burn::tensor::activation::relu;

use super::{conv1x1, conv3x3, SegmentationNet};

/// 两个 3x3 卷积 + 批归一化, 加残差分支.
///
/// 步长不为 1 时第一个卷积负责下采样, 残差分支同样用带步长的 3x3 卷积对齐;
/// 仅通道数变化时残差分支为 1x1 卷积.
#[derive(Module, Debug)]
pub struct ResidualUnit<B: Backend> {
    conv1: Conv2d<B>,
    norm1: BatchNorm<B, 2>,
    conv2: Conv2d<B>,
    norm2: BatchNorm<B, 2>,
    residual: Option<Conv2d<B>>,
}

impl<B: Backend> ResidualUnit<B> {
    pub fn new(in_ch: usize, out_ch: usize, stride: usize, device: &B::Device) -> Self {
        let residual = if stride != 1 {
            Some(conv3x3([in_ch, out_ch], stride, device))
        } else if in_ch != out_ch {
            Some(conv1x1([in_ch, out_ch], device))
        } else {
            None
        };
        Self {
            conv1: conv3x3([in_ch, out_ch], stride, device),
            norm1: BatchNormConfig::new(out_ch).init(device),
            conv2: conv3x3([out_ch, out_ch], 1, device),
            norm2: BatchNormConfig::new(out_ch).init(device),
            residual,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let res = match &self.residual {
            Some(conv) => conv.forward(x.clone()),
            None => x.clone(),
        };
        let y = relu(self.norm1.forward(self.conv1.forward(x)));
        let y = self.norm2.forward(self.conv2.forward(y));
        relu(y + res)
    }
}

/// 上采样 2 倍. 最外层只有转置卷积, 直接输出 logits.
#[derive(Module, Debug)]
pub struct UpBlock<B: Backend> {
    deconv: ConvTranspose2d<B>,
    norm: Option<BatchNorm<B, 2>>,
    unit: Option<ResidualUnit<B>>,
}

impl<B: Backend> UpBlock<B> {
    fn new(in_ch: usize, out_ch: usize, last: bool, device: &B::Device) -> Self {
        let deconv = ConvTranspose2dConfig::new([in_ch, out_ch], [2, 2])
            .with_stride([2, 2])
            .init(device);
        if last {
            return Self {
                deconv,
                norm: None,
                unit: None,
            };
        }
        Self {
            deconv,
            norm: Some(BatchNormConfig::new(out_ch).init(device)),
            unit: Some(ResidualUnit::new(out_ch, out_ch, 1, device)),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.deconv.forward(x);
        match (&self.norm, &self.unit) {
            (Some(norm), Some(unit)) => unit.forward(relu(norm.forward(x))),
            _ => x,
        }
    }
}

/// [`UNet`] 配置.
#[derive(Config, Debug)]
pub struct UNetConfig {
    /// 各层通道数, 最后一个为最底层.
    #[config(default = "vec![16, 32, 64, 128, 256]")]
    pub channels: Vec<usize>,

    /// 输入通道数.
    #[config(default = 1)]
    pub in_channels: usize,

    /// 输出通道数.
    #[config(default = 1)]
    pub out_channels: usize,
}

impl UNetConfig {
    /// 初始化网络. 输入边长须为 `2^(channels.len() - 1)` 的倍数.
    pub fn init<B: Backend>(&self, device: &B::Device) -> UNet<B> {
        let c = &self.channels;
        assert!(c.len() >= 2, "UNet needs at least two levels");
        let depth = c.len() - 1;

        let mut down = Vec::with_capacity(depth);
        let mut in_ch = self.in_channels;
        for &out_ch in &c[..depth] {
            down.push(ResidualUnit::new(in_ch, out_ch, 2, device));
            in_ch = out_ch;
        }
        let bottom = ResidualUnit::new(c[depth - 1], c[depth], 1, device);

        // 从最深层往外: 输入为 (上一层输出 + 同层跳跃) 通道.
        let mut up = Vec::with_capacity(depth);
        let mut prev = c[depth];
        for i in (0..depth).rev() {
            let out_ch = if i == 0 { self.out_channels } else { c[i - 1] };
            up.push(UpBlock::new(prev + c[i], out_ch, i == 0, device));
            prev = out_ch;
        }

        UNet { down, bottom, up }
    }
}

/// 残差 UNet.
#[derive(Module, Debug)]
pub struct UNet<B: Backend> {
    down: Vec<ResidualUnit<B>>,
    bottom: ResidualUnit<B>,
    up: Vec<UpBlock<B>>,
}

impl<B: Backend> SegmentationNet<B> for UNet<B> {
    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut skips = Vec::with_capacity(self.down.len());
        let mut x = input;
        for unit in &self.down {
            x = unit.forward(x);
            skips.push(x.clone());
        }
        x = self.bottom.forward(x);
        for (block, skip) in self.up.iter().zip(skips.into_iter().rev()) {
            x = block.forward(Tensor::cat(vec![x, skip], 1));
        }
        x
    }
}
