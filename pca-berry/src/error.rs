//! 运行时错误.
//!
//! 所有错误都会携带触发它的路径/病例/轮次信息, 以便在终止前打印诊断.

use std::io;
use std::path::PathBuf;

use crate::dataset::Split;
use crate::train::Phase;

/// 打开单个体数据文件时的错误.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// 文件不存在.
    #[error("volume `{0}` does not exist")]
    NotFound(PathBuf),

    /// 不是可读的 nifti 文件.
    #[error("failed to read nifti volume `{path}`: {source}")]
    Nifti {
        /// 出错文件.
        path: PathBuf,
        /// 底层错误.
        #[source]
        source: nifti::NiftiError,
    },

    /// 不是可读的 npy 文件, 或元素类型不受支持.
    #[error("failed to read npy array `{path}`: {reason}")]
    Npy {
        /// 出错文件.
        path: PathBuf,
        /// 底层错误描述.
        reason: String,
    },

    /// 维度不足三维.
    #[error("volume `{path}` has {ndim} dimension(s), at least 3 are required")]
    TooFewDims {
        /// 出错文件.
        path: PathBuf,
        /// 实际维数.
        ndim: usize,
    },

    /// 文件扩展名无法识别.
    #[error("`{0}` is neither a `.nii`/`.nii.gz` volume nor a `.npy` array")]
    UnknownFormat(PathBuf),
}

/// 构建切片数据集时的错误.
#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    /// 没有任何可用的 (图像, 标签) 对.
    #[error("no image/mask pairs found (images: `{img_dir}`, masks: `{mask_dir}`)")]
    Empty {
        /// 图像根目录.
        img_dir: PathBuf,
        /// 标签根目录.
        mask_dir: PathBuf,
    },

    /// 同一根目录下出现重复的病例编号.
    #[error("case `{case}` appears more than once (`{first}` and `{second}`)")]
    DuplicateCase {
        /// 病例编号.
        case: String,
        /// 先出现的文件.
        first: PathBuf,
        /// 后出现的文件.
        second: PathBuf,
    },

    /// 病例仅存在于其中一侧.
    #[error("case `{case}` has no matching {missing} (found `{path}`)")]
    UnmatchedCase {
        /// 病例编号.
        case: String,
        /// 缺失的一侧, "image" 或 "mask".
        missing: &'static str,
        /// 存在一侧的文件.
        path: PathBuf,
    },

    /// 按排序顺序配对时两侧数量不一致.
    #[error("found {images} image volume(s) but {masks} mask array(s)")]
    CountMismatch {
        /// 图像个数.
        images: usize,
        /// 标签个数.
        masks: usize,
    },

    /// 切片索引越界.
    #[error("slice {index} is out of range for `{path}` with depth {depth}")]
    SliceOutOfRange {
        /// 出错文件.
        path: PathBuf,
        /// 请求的切片索引.
        index: usize,
        /// 体数据深度.
        depth: usize,
    },

    /// 图像切片与标签切片形状不一致.
    #[error("slice shape {image:?} of `{image_path}` differs from {mask:?} of `{mask_path}`")]
    ShapeMismatch {
        /// 图像文件.
        image_path: PathBuf,
        /// 图像切片形状.
        image: (usize, usize),
        /// 标签文件.
        mask_path: PathBuf,
        /// 标签切片形状.
        mask: (usize, usize),
    },

    /// 加载失败.
    #[error(transparent)]
    Load(#[from] LoadError),

    /// 扫描目录时的底层 I/O 错误.
    #[error("failed to scan `{path}`: {source}")]
    Io {
        /// 出错目录.
        path: PathBuf,
        /// 底层错误.
        #[source]
        source: io::Error,
    },
}

/// 配置错误. 在启动阶段即被发现.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// 未知模型名.
    #[error("unknown model `{0}`, expected `unet` or `segresnet`")]
    UnknownModel(String),

    /// 缩放尺寸不被所选模型支持.
    #[error("size {size} must be a positive multiple of {multiple}")]
    InvalidSize {
        /// 缩放尺寸.
        size: usize,
        /// 模型要求的倍数.
        multiple: usize,
    },

    /// 划分比例非法.
    #[error("invalid split ratio train={train}, val={val}")]
    InvalidRatio {
        /// 训练集比例.
        train: f64,
        /// 验证集比例.
        val: f64,
    },

    /// 批大小为零.
    #[error("batch size must be positive")]
    ZeroBatch,

    /// 训练轮数为零.
    #[error("epochs must be positive")]
    ZeroEpochs,

    /// 验证间隔为零.
    #[error("validation interval must be positive")]
    ZeroInterval,

    /// 某一划分没有任何样本.
    #[error("the {split} split has no samples, add cases or adjust the split ratio")]
    EmptySplit {
        /// 为空的划分.
        split: Split,
    },
}

/// 训练循环中的错误.
#[derive(Debug, thiserror::Error)]
pub enum TrainError<E: std::error::Error + 'static> {
    /// 模型后端在第 `epoch` 轮出错. 轮次从 1 开始.
    #[error("model failed during {phase} at epoch {epoch}")]
    Model {
        /// 出错阶段.
        phase: Phase,
        /// 出错轮次.
        epoch: usize,
        /// 底层错误.
        #[source]
        source: E,
    },

    /// 非法配置.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// 写出分数或摘要时的错误.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    /// 底层 I/O 错误.
    #[error("failed to write `{path}`: {source}")]
    Io {
        /// 出错路径.
        path: PathBuf,
        /// 底层错误.
        #[source]
        source: io::Error,
    },

    /// 写 npy 失败.
    #[error("failed to write npy array `{path}`: {source}")]
    Npy {
        /// 出错路径.
        path: PathBuf,
        /// 底层错误.
        #[source]
        source: ndarray_npy::WriteNpyError,
    },

    /// 序列化摘要失败.
    #[error("failed to serialize `{path}`: {source}")]
    Json {
        /// 出错路径.
        path: PathBuf,
        /// 底层错误.
        #[source]
        source: serde_json::Error,
    },
}
