#![warn(missing_docs)] // <= 合适时移除它.
// #![warn(clippy::missing_docs_in_private_items)]  // <= too strict.

//! 核心库. 在前列腺 MRI 体数据上训练二维病灶 (或前列腺) 分割网络.
//!
//! 流程:
//!
//! 1. [`dataset::paths`] 递归扫描图像目录 (`.nii` / `.nii.gz`) 和标签目录
//!   (`lesion_mask.npy` / `prostate_mask.npy`);
//! 2. [`dataset::pairing`] 按病例编号把图像与标签配对, 多出、缺失或重复的病例会直接报错;
//! 3. [`data::Volume`] 读取体数据并转换为 `(z, h, w)` 的 `u8` 数组,
//!   [`dataset::SliceDataset`] 取出固定 z 索引处的切片, 缩放、归一化后划分为训练/验证/测试集;
//! 4. [`train::TrainingLoop`] 驱动任意 [`train::SegModel`] 训练, 周期性验证,
//!   由 [`train::Checkpointer`] 保存最优模型, 最后由 [`train::ScoreWriter`] 写出曲线;
//! 5. [`nn`] 提供基于 `burn` 的 UNet / SegResNet 实现.
//!
//! # 注意
//!
//! 1. 体素值以 "截断后回绕" 的方式转换为 `u8`: 256 -> 0, 300 -> 44, -1 -> 255.
//!   这与常见的饱和转换不同, 但需要保持一致.
//! 2. 每个病例只贡献一个切片, 因此各划分的大小以病例数计.
//!
//! # 特性
//!
//! - `rayon`: 并行加载病例;
//! - `wgpu`: 使用 GPU 后端训练.

/// 二维索引, 同时也可一定程度上用作非负整数向量.
pub type Idx2d = (usize, usize);

/// 三维索引, 同时也可一定程度上用作非负整数向量.
pub type Idx3d = (usize, usize, usize);

pub mod consts;

/// 体数据读取与切片变换.
pub mod data;

pub mod dataset;
pub mod error;
pub mod nn;
pub mod prelude;
pub mod train;

pub use data::Volume;
pub use error::{ConfigError, DatasetError, LoadError, PersistError, TrainError};
