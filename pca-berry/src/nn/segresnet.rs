//! SegResNet: 组归一化残差编码器 + 轻量解码器.

use burn::nn::conv::{Conv2d, ConvTranspose2d, ConvTranspose2dConfig};
use burn::nn::{Dropout, DropoutConfig, GroupNorm, GroupNormConfig};
use burn::prelude::*;
use burn::tensor::activation::relu;

use super::{conv1x1, conv3x3, SegmentationNet};

/// 预激活残差块: `GN -> ReLU -> conv -> GN -> ReLU -> conv`, 再加输入.
#[derive(Module, Debug)]
pub struct ResBlock<B: Backend> {
    norm1: GroupNorm<B>,
    conv1: Conv2d<B>,
    norm2: GroupNorm<B>,
    conv2: Conv2d<B>,
}

impl<B: Backend> ResBlock<B> {
    fn new(channels: usize, groups: usize, device: &B::Device) -> Self {
        Self {
            norm1: GroupNormConfig::new(groups, channels).init(device),
            conv1: conv3x3([channels, channels], 1, device),
            norm2: GroupNormConfig::new(groups, channels).init(device),
            conv2: conv3x3([channels, channels], 1, device),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let y = self.conv1.forward(relu(self.norm1.forward(x.clone())));
        let y = self.conv2.forward(relu(self.norm2.forward(y)));
        y + x
    }
}

/// 编码器的一层. 除第一层外先以步长 2 的卷积下采样并加倍通道.
#[derive(Module, Debug)]
pub struct DownLayer<B: Backend> {
    downsample: Option<Conv2d<B>>,
    blocks: Vec<ResBlock<B>>,
}

impl<B: Backend> DownLayer<B> {
    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = match &self.downsample {
            Some(conv) => conv.forward(x),
            None => x,
        };
        self.blocks.iter().fold(x, |x, block| block.forward(x))
    }
}

/// 解码器的一层: 转置卷积上采样并减半通道, 与跳跃连接相加.
#[derive(Module, Debug)]
pub struct UpLayer<B: Backend> {
    upsample: ConvTranspose2d<B>,
    blocks: Vec<ResBlock<B>>,
}

impl<B: Backend> UpLayer<B> {
    fn forward(&self, x: Tensor<B, 4>, skip: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.upsample.forward(x) + skip;
        self.blocks.iter().fold(x, |x, block| block.forward(x))
    }
}

/// [`SegResNet`] 配置.
#[derive(Config, Debug)]
pub struct SegResNetConfig {
    /// 第一层通道数, 之后每层加倍.
    #[config(default = 16)]
    pub init_filters: usize,

    /// 编码器每层的残差块个数.
    #[config(default = "vec![1, 2, 2, 4]")]
    pub blocks_down: Vec<usize>,

    /// 解码器每层的残差块个数, 从最深层开始.
    #[config(default = "vec![1, 1, 1]")]
    pub blocks_up: Vec<usize>,

    /// 组归一化的分组数.
    #[config(default = 8)]
    pub num_groups: usize,

    /// 首层卷积后的 dropout 概率.
    #[config(default = 0.2)]
    pub dropout: f64,

    /// 输入通道数.
    #[config(default = 1)]
    pub in_channels: usize,

    /// 输出通道数.
    #[config(default = 1)]
    pub out_channels: usize,
}

impl SegResNetConfig {
    /// 初始化网络. 输入边长须为 `2^(blocks_down.len() - 1)` 的倍数.
    pub fn init<B: Backend>(&self, device: &B::Device) -> SegResNet<B> {
        let g = self.num_groups;
        let filters = |level: usize| self.init_filters << level;

        let down = self
            .blocks_down
            .iter()
            .enumerate()
            .map(|(level, &n)| DownLayer {
                downsample: (level > 0)
                    .then(|| conv3x3([filters(level - 1), filters(level)], 2, device)),
                blocks: (0..n).map(|_| ResBlock::new(filters(level), g, device)).collect(),
            })
            .collect::<Vec<_>>();

        let top = down.len().saturating_sub(1);
        let up = self
            .blocks_up
            .iter()
            .take(top)
            .enumerate()
            .map(|(i, &n)| {
                let ch = filters(top - i - 1);
                UpLayer {
                    upsample: ConvTranspose2dConfig::new([ch * 2, ch], [2, 2])
                        .with_stride([2, 2])
                        .init(device),
                    blocks: (0..n).map(|_| ResBlock::new(ch, g, device)).collect(),
                }
            })
            .collect();

        SegResNet {
            conv_init: conv3x3([self.in_channels, self.init_filters], 1, device),
            dropout: DropoutConfig::new(self.dropout).init(),
            down,
            up,
            head_norm: GroupNormConfig::new(g, self.init_filters).init(device),
            head: conv1x1([self.init_filters, self.out_channels], device),
        }
    }
}

/// SegResNet.
#[derive(Module, Debug)]
pub struct SegResNet<B: Backend> {
    conv_init: Conv2d<B>,
    dropout: Dropout,
    down: Vec<DownLayer<B>>,
    up: Vec<UpLayer<B>>,
    head_norm: GroupNorm<B>,
    head: Conv2d<B>,
}

impl<B: Backend> SegmentationNet<B> for SegResNet<B> {
    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x = self.dropout.forward(self.conv_init.forward(input));
        let mut skips = Vec::with_capacity(self.down.len());
        for layer in &self.down {
            x = layer.forward(x);
            skips.push(x.clone());
        }
        // 最深层本身就是 x.
        skips.pop();
        for (layer, skip) in self.up.iter().zip(skips.into_iter().rev()) {
            x = layer.forward(x, skip);
        }
        self.head.forward(relu(self.head_norm.forward(x)))
    }
}
