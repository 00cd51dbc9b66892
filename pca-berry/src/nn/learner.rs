//! 把 `burn` 网络接到训练循环上.

use std::fs;
use std::io;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use burn::module::AutodiffModule;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkGzFileRecorder};
use burn::tensor::activation::sigmoid;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::ElementConversion;
use ndarray::Array4;

use super::{dice_loss, SegmentationNet};
use crate::dataset::Batch;
use crate::train::{SegModel, StepLr, StepOutput};

/// 后端错误.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// 无法读出张量数据.
    #[error("failed to read tensor data: {0}")]
    Data(String),

    /// 读出的数据与形状不符.
    #[error("tensor data does not match its shape: {0}")]
    Shape(#[from] ndarray::ShapeError),

    /// 创建权重目录失败.
    #[error("failed to create `{path}`: {source}")]
    Io {
        /// 出错目录.
        path: PathBuf,
        /// 底层错误.
        #[source]
        source: io::Error,
    },

    /// 写权重失败.
    #[error("failed to record model to `{path}`: {reason}")]
    Record {
        /// 权重文件.
        path: PathBuf,
        /// 底层错误描述.
        reason: String,
    },
}

/// 训练所用的 Adam 配置: `beta_1 = 0.5`, `beta_2 = 0.999`.
pub fn adam() -> AdamConfig {
    AdamConfig::new().with_beta_1(0.5).with_beta_2(0.999)
}

fn to_tensor<B: Backend>(array: &Array4<f32>, device: &B::Device) -> Tensor<B, 4> {
    let (n, c, h, w) = array.dim();
    let values: Vec<f32> = array.iter().copied().collect();
    Tensor::from_data(TensorData::new(values, [n, c, h, w]), device)
}

fn to_array<B: Backend>(tensor: Tensor<B, 4>) -> Result<Array4<f32>, BackendError> {
    let [n, c, h, w] = tensor.dims();
    let values = tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| BackendError::Data(format!("{e:?}")))?;
    Ok(Array4::from_shape_vec((n, c, h, w), values)?)
}

/// 单批前向: 返回 (损失, 概率).
fn forward_batch<B: Backend, M: SegmentationNet<B>>(
    model: &M,
    batch: &Batch,
    device: &B::Device,
) -> (Tensor<B, 1>, Tensor<B, 4>) {
    let logits = model.forward(to_tensor(&batch.images, device));
    let loss = dice_loss(logits.clone(), to_tensor(&batch.masks, device));
    (loss, sigmoid(logits))
}

/// 任意 `burn` 分割网络 + 优化器 + 学习率调度.
#[derive(Debug)]
pub struct BurnSegmenter<B: AutodiffBackend, M, O> {
    model: M,
    optim: O,
    schedule: StepLr,
    device: B::Device,
    _backend: PhantomData<B>,
}

impl<B, M, O> BurnSegmenter<B, M, O>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + SegmentationNet<B>,
    O: Optimizer<M, B>,
{
    /// 构建.
    pub fn new(model: M, optim: O, schedule: StepLr, device: B::Device) -> Self {
        log::info!(
            "model has {} parameter(s), device: {:?}",
            model.num_params(),
            device
        );
        Self {
            model,
            optim,
            schedule,
            device,
            _backend: PhantomData,
        }
    }

    /// 当前网络.
    #[inline]
    pub fn model(&self) -> &M {
        &self.model
    }
}

/// 以 [`adam`] 为优化器构建.
pub fn adam_segmenter<B, M>(
    model: M,
    schedule: StepLr,
    device: B::Device,
) -> BurnSegmenter<B, M, impl Optimizer<M, B>>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + SegmentationNet<B>,
{
    BurnSegmenter::new(model, adam().init::<B, M>(), schedule, device)
}

impl<B, M, O> SegModel for BurnSegmenter<B, M, O>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + SegmentationNet<B>,
    M::InnerModule: SegmentationNet<B::InnerBackend>,
    O: Optimizer<M, B>,
{
    type Error = BackendError;

    fn train_step(&mut self, batch: &Batch) -> Result<StepOutput, Self::Error> {
        let (loss, prob) = forward_batch::<B, _>(&self.model, batch, &self.device);
        let value: f64 = loss.clone().into_scalar().elem();
        let prediction = to_array(prob.detach())?;

        let grads = GradientsParams::from_grads(loss.backward(), &self.model);
        self.model = self
            .optim
            .step(self.schedule.lr(), self.model.clone(), grads);
        Ok(StepOutput {
            loss: value,
            prediction,
        })
    }

    fn eval_step(&self, batch: &Batch) -> Result<StepOutput, Self::Error> {
        let model = self.model.valid();
        let (loss, prob) = forward_batch::<B::InnerBackend, _>(&model, batch, &self.device);
        Ok(StepOutput {
            loss: loss.into_scalar().elem(),
            prediction: to_array(prob)?,
        })
    }

    fn advance_schedule(&mut self) {
        self.schedule.step();
    }

    fn learning_rate(&self) -> f64 {
        self.schedule.lr()
    }

    fn save(&self, path: &Path) -> Result<PathBuf, Self::Error> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| BackendError::Io {
                path: parent.to_owned(),
                source,
            })?;
        }
        let recorder = NamedMpkGzFileRecorder::<FullPrecisionSettings>::default();
        self.model
            .valid()
            .save_file(path, &recorder)
            .map_err(|e| BackendError::Record {
                path: path.to_owned(),
                reason: format!("{e:?}"),
            })?;
        Ok(path.with_extension("mpk.gz"))
    }
}
