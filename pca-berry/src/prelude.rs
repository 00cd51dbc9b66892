//! 🍇欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::{Idx2d, Idx3d};

pub use crate::consts::MaskKind;
pub use crate::data::transform::SliceTransform;
pub use crate::data::Volume;

pub use crate::dataset::{
    discover_cases, CasePair, Pairing, SliceDataset, SliceDatasetConfig, Split, SplitRatio,
};

pub use crate::error::{ConfigError, DatasetError, LoadError, PersistError, TrainError};

pub use crate::nn::{
    adam_segmenter, BurnSegmenter, ModelKind, SegResNetConfig, TrainBackend, TrainDevice,
    UNetConfig,
};

pub use crate::train::{
    Checkpointer, DiceMetric, LoopConfig, MetricAccumulator, RunSummary, ScoreWriter, SegModel,
    StepLr, TrainingLoop, TrainingState,
};
