//! 基于 `burn` 的分割网络与训练器.
//!
//! - [`UNet`]: 残差单元构成的编码-解码网络, 跳跃连接按通道拼接;
//! - [`SegResNet`]: 组归一化残差块, 跳跃连接按元素相加;
//! - [`BurnSegmenter`]: 把任意网络包装成 [`SegModel`](crate::train::SegModel).
//!
//! 两种网络均为单通道输入、单通道 logits 输出.

use std::fmt;
use std::str::FromStr;

use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::PaddingConfig2d;
use burn::prelude::*;

use crate::error::ConfigError;

mod learner;
mod loss;
mod segresnet;
mod unet;

pub use learner::{adam, adam_segmenter, BackendError, BurnSegmenter};
pub use loss::dice_loss;
pub use segresnet::{SegResNet, SegResNetConfig};
pub use unet::{UNet, UNetConfig};

cfg_if::cfg_if! {
    if #[cfg(feature = "wgpu")] {
        /// 训练后端.
        pub type TrainBackend = burn::backend::Autodiff<burn::backend::Wgpu>;
    } else {
        /// 训练后端.
        pub type TrainBackend = burn::backend::Autodiff<burn::backend::NdArray>;
    }
}

/// 训练后端的设备.
pub type TrainDevice = <TrainBackend as Backend>::Device;

/// 分割网络: `[n, 1, H, W]` -> `[n, 1, H, W]` logits.
pub trait SegmentationNet<B: Backend>: Module<B> {
    /// 前向.
    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4>;
}

/// 可选网络.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum ModelKind {
    /// [`UNet`].
    #[default]
    UNet,

    /// [`SegResNet`].
    SegResNet,
}

impl ModelKind {
    /// 命令行与输出文件中使用的名字.
    pub const fn name(self) -> &'static str {
        match self {
            Self::UNet => "unet",
            Self::SegResNet => "segresnet",
        }
    }

    /// 输入边长必须是该值的倍数.
    pub const fn size_multiple(self) -> usize {
        match self {
            Self::UNet => 16,
            Self::SegResNet => 8,
        }
    }

    /// 检查输入边长.
    pub fn check_size(self, size: usize) -> Result<(), ConfigError> {
        let multiple = self.size_multiple();
        if size == 0 || size % multiple != 0 {
            Err(ConfigError::InvalidSize { size, multiple })
        } else {
            Ok(())
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "unet" => Ok(Self::UNet),
            "segresnet" => Ok(Self::SegResNet),
            _ => Err(ConfigError::UnknownModel(s.to_string())),
        }
    }
}

/// 3x3 卷积, 填充 1.
pub(crate) fn conv3x3<B: Backend>(
    channels: [usize; 2],
    stride: usize,
    device: &B::Device,
) -> Conv2d<B> {
    Conv2dConfig::new(channels, [3, 3])
        .with_stride([stride, stride])
        .with_padding(PaddingConfig2d::Explicit(1, 1))
        .init(device)
}

/// 1x1 卷积.
pub(crate) fn conv1x1<B: Backend>(channels: [usize; 2], device: &B::Device) -> Conv2d<B> {
    Conv2dConfig::new(channels, [1, 1])
        .with_padding(PaddingConfig2d::Valid)
        .init(device)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_kind() {
        assert_eq!("unet".parse::<ModelKind>().unwrap(), ModelKind::UNet);
        assert_eq!("SegResNet".parse::<ModelKind>().unwrap(), ModelKind::SegResNet);
        assert_eq!(
            "vnet".parse::<ModelKind>().unwrap_err(),
            ConfigError::UnknownModel("vnet".to_string())
        );
        assert_eq!(ModelKind::SegResNet.to_string(), "segresnet");
    }

    #[test]
    fn test_check_size() {
        assert!(ModelKind::UNet.check_size(256).is_ok());
        assert!(ModelKind::UNet.check_size(40).is_err());
        assert!(ModelKind::SegResNet.check_size(40).is_ok());
        assert_eq!(
            ModelKind::SegResNet.check_size(0).unwrap_err(),
            ConfigError::InvalidSize {
                size: 0,
                multiple: 8
            }
        );
    }
}
