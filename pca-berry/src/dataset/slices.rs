//! 固定切片索引的二维训练数据集.
//!
//! 每个病例只贡献一个样本: 图像体数据与所选标签在同一 z 索引处的切片.

use std::fmt;
use std::path::Path;

use ndarray::{s, Array2, Array4, ArrayView2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::consts::MaskKind;
use crate::data::transform::SliceTransform;
use crate::data::Volume;
use crate::dataset::pairing::CasePair;
use crate::error::{ConfigError, DatasetError};

/// 数据集划分.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Split {
    /// 训练集.
    Train,

    /// 验证集.
    Val,

    /// 测试集.
    Test,
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Train => "train",
            Self::Val => "val",
            Self::Test => "test",
        })
    }
}

/// 按病例数划分的比例. 测试集为剩余部分.
///
/// 默认 `train = 0.7`, `val = 0.15`, 即测试集约占 `0.15`.
#[derive(Copy, Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SplitRatio {
    /// 训练集比例.
    pub train: f64,

    /// 验证集比例.
    pub val: f64,
}

impl Default for SplitRatio {
    fn default() -> Self {
        Self {
            train: 0.7,
            val: 0.15,
        }
    }
}

impl SplitRatio {
    /// 构建比例. 两者都必须在 `[0, 1]` 内, 且和不超过 1.
    pub fn new(train: f64, val: f64) -> Result<Self, ConfigError> {
        let valid = |r: f64| (0.0..=1.0).contains(&r);
        if valid(train) && valid(val) && train + val <= 1.0 + f64::EPSILON {
            Ok(Self { train, val })
        } else {
            Err(ConfigError::InvalidRatio { train, val })
        }
    }

    /// 对 `n` 个病例计算 (训练, 验证, 测试) 个数. 小数部分向下取整.
    pub fn counts(&self, n: usize) -> (usize, usize, usize) {
        let n_train = ((n as f64) * self.train).floor() as usize;
        let n_val = (((n as f64) * self.val).floor() as usize).min(n - n_train);
        (n_train, n_val, n - n_train - n_val)
    }
}

/// 数据集构建参数.
#[derive(Copy, Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SliceDatasetConfig {
    /// 批大小.
    pub batch_size: usize,

    /// 缩放后的正方形边长.
    pub size: usize,

    /// 从每个体数据中取出的 z 索引.
    pub slice_index: usize,

    /// 使用哪一种标签.
    pub mask: MaskKind,

    /// 划分比例.
    pub split: SplitRatio,

    /// 划分前打乱病例所用的种子. `None` 表示保持配对顺序.
    pub shuffle_seed: Option<u64>,
}

/// 一个二维样本: 归一化后的图像切片与缩放后的标签切片, 形状均为 (size, size).
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// 病例编号.
    pub case: String,

    /// 图像切片.
    pub image: Array2<f32>,

    /// 标签切片.
    pub mask: Array2<f32>,
}

/// 一个批次. 两个张量形状均为 `[n, 1, size, size]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// 图像.
    pub images: Array4<f32>,

    /// 标签.
    pub masks: Array4<f32>,
}

impl Batch {
    /// 由若干样本拼接. `samples` 不能为空.
    fn stack(samples: &[Sample]) -> Self {
        let (h, w) = samples[0].image.dim();
        let mut images = Array4::zeros((samples.len(), 1, h, w));
        let mut masks = Array4::zeros((samples.len(), 1, h, w));
        for (i, sample) in samples.iter().enumerate() {
            images.slice_mut(s![i, 0, .., ..]).assign(&sample.image);
            masks.slice_mut(s![i, 0, .., ..]).assign(&sample.mask);
        }
        Self { images, masks }
    }

    /// 批内样本个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.images.shape()[0]
    }

    /// 批是否为空?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 取出第 `index` 层切片, 越界时报告 `path`.
fn pick_slice<'a>(
    volume: &'a Volume,
    path: &Path,
    index: usize,
) -> Result<ArrayView2<'a, u8>, DatasetError> {
    volume
        .slice_at(index)
        .ok_or_else(|| DatasetError::SliceOutOfRange {
            path: path.to_owned(),
            index,
            depth: volume.depth(),
        })
}

/// 加载单个病例并生成样本.
pub fn load_sample(
    pair: &CasePair,
    slice_index: usize,
    transform: &SliceTransform,
) -> Result<Sample, DatasetError> {
    let image = Volume::open(&pair.image)?;
    let mask = Volume::open(&pair.mask)?;

    let image_slice = pick_slice(&image, &pair.image, slice_index)?;
    let mask_slice = pick_slice(&mask, &pair.mask, slice_index)?;

    if image_slice.dim() != mask_slice.dim() {
        return Err(DatasetError::ShapeMismatch {
            image_path: pair.image.clone(),
            image: image_slice.dim(),
            mask_path: pair.mask.clone(),
            mask: mask_slice.dim(),
        });
    }

    Ok(Sample {
        case: pair.case.clone(),
        image: transform.image(image_slice),
        mask: transform.mask(mask_slice),
    })
}

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

        /// 借助 `rayon` 并行加载所有病例, 结果顺序与输入一致.
        fn load_all(
            pairs: &[CasePair],
            slice_index: usize,
            transform: &SliceTransform,
        ) -> Result<Vec<Sample>, DatasetError> {
            pairs
                .par_iter()
                .map(|p| load_sample(p, slice_index, transform))
                .collect()
        }
    } else {
        /// 依次加载所有病例.
        fn load_all(
            pairs: &[CasePair],
            slice_index: usize,
            transform: &SliceTransform,
        ) -> Result<Vec<Sample>, DatasetError> {
            pairs
                .iter()
                .map(|p| load_sample(p, slice_index, transform))
                .collect()
        }
    }
}

/// 三个互不相交的样本集合, 各自可以反复按批迭代.
#[derive(Debug, Clone)]
pub struct SliceDataset {
    batch_size: usize,
    train: Vec<Sample>,
    val: Vec<Sample>,
    test: Vec<Sample>,
}

impl SliceDataset {
    /// 从已配对的病例构建数据集.
    pub fn build(pairs: &[CasePair], config: &SliceDatasetConfig) -> Result<Self, DatasetError> {
        let transform = SliceTransform::new(config.size);
        let mut pairs = pairs.to_vec();
        if let Some(seed) = config.shuffle_seed {
            pairs.shuffle(&mut StdRng::seed_from_u64(seed));
        }

        let samples = load_all(&pairs, config.slice_index, &transform)?;
        log::debug!("loaded {} slice samples", samples.len());
        Ok(Self::from_samples(samples, config.batch_size, config.split))
    }

    /// 从已有样本按比例划分.
    pub fn from_samples(mut samples: Vec<Sample>, batch_size: usize, split: SplitRatio) -> Self {
        let (n_train, n_val, _) = split.counts(samples.len());
        let test = samples.split_off(n_train + n_val);
        let val = samples.split_off(n_train);
        Self {
            batch_size: batch_size.max(1),
            train: samples,
            val,
            test,
        }
    }

    /// 检查 `splits` 中的每个划分都至少有一个样本.
    pub fn require_nonempty(&self, splits: &[Split]) -> Result<(), ConfigError> {
        match splits.iter().find(|s| self.samples(**s).is_empty()) {
            Some(&split) => Err(ConfigError::EmptySplit { split }),
            None => Ok(()),
        }
    }

    /// 批大小.
    #[inline]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// 获取某一划分的全部样本.
    #[inline]
    pub fn samples(&self, split: Split) -> &[Sample] {
        match split {
            Split::Train => &self.train,
            Split::Val => &self.val,
            Split::Test => &self.test,
        }
    }

    /// 某一划分的样本个数.
    #[inline]
    pub fn len(&self, split: Split) -> usize {
        self.samples(split).len()
    }

    /// 某一划分的批个数 (包括末尾不足一批的部分).
    #[inline]
    pub fn batch_count(&self, split: Split) -> usize {
        self.len(split).div_ceil(self.batch_size)
    }

    /// 按固定顺序迭代某一划分的所有批次. 每次调用都从头开始.
    pub fn batches(&self, split: Split) -> impl ExactSizeIterator<Item = Batch> + '_ {
        self.samples(split).chunks(self.batch_size).map(Batch::stack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{discover_cases, Pairing};
    use ndarray::Array3;
    use ndarray_npy::write_npy;
    use nifti::writer::WriterOptions;
    use std::fs::create_dir_all;

    /// 在 `root/images/{case}/t2.nii` 和 `root/masks/{case}/*_mask.npy`
    /// 下生成 `n` 个病例. 每个体数据形状为 \[x = 12, y = 10, z = depth\].
    fn write_cases(root: &Path, n: usize, depth: usize) {
        for i in 0..n {
            let case = format!("case_{i:02}");
            let img_dir = root.join("images").join(&case);
            let mask_dir = root.join("masks").join(&case);
            create_dir_all(&img_dir).unwrap();
            create_dir_all(&mask_dir).unwrap();

            let img = Array3::<u8>::from_shape_fn((12, 10, depth), |(x, y, z)| {
                (x * 7 + y * 3 + z + i) as u8
            });
            WriterOptions::new(img_dir.join("t2.nii"))
                .write_nifti(&img)
                .unwrap();

            let lesion = Array3::<u8>::from_shape_fn((12, 10, depth), |(x, y, _)| {
                u8::from(x < 4 && y < 4)
            });
            let prostate = Array3::<u8>::from_shape_fn((12, 10, depth), |(x, _, _)| {
                u8::from(x >= 6)
            });
            write_npy(mask_dir.join("lesion_mask.npy"), &lesion).unwrap();
            write_npy(mask_dir.join("prostate_mask.npy"), &prostate).unwrap();
        }
    }

    fn config(batch_size: usize, slice_index: usize) -> SliceDatasetConfig {
        SliceDatasetConfig {
            batch_size,
            size: 16,
            slice_index,
            mask: MaskKind::Prostate,
            split: SplitRatio::new(0.5, 0.25).unwrap(),
            shuffle_seed: None,
        }
    }

    fn pairs(root: &Path, mask: MaskKind) -> Vec<CasePair> {
        discover_cases(root.join("images"), root.join("masks"), mask, Pairing::ByCaseId).unwrap()
    }

    #[test]
    fn test_split_counts() {
        let r = SplitRatio::new(0.5, 0.25).unwrap();
        assert_eq!(r.counts(10), (5, 2, 3));
        assert_eq!(r.counts(0), (0, 0, 0));
        assert_eq!(SplitRatio::default().counts(1), (0, 0, 1));
        assert_eq!(SplitRatio::new(1.0, 0.0).unwrap().counts(5), (5, 0, 0));
        assert!(SplitRatio::new(0.8, 0.3).is_err());
        assert!(SplitRatio::new(-0.1, 0.3).is_err());
    }

    #[test]
    fn test_require_nonempty() {
        let sample = Sample {
            case: "case_00".to_string(),
            image: Array2::zeros((4, 4)),
            mask: Array2::zeros((4, 4)),
        };
        let ds = SliceDataset::from_samples(vec![sample], 2, SplitRatio::default());
        assert_eq!(ds.len(Split::Test), 1);
        assert!(ds.require_nonempty(&[Split::Test]).is_ok());
        assert_eq!(
            ds.require_nonempty(&[Split::Train, Split::Val]),
            Err(ConfigError::EmptySplit {
                split: Split::Train
            })
        );
        assert_eq!(
            ds.require_nonempty(&[Split::Test, Split::Val]),
            Err(ConfigError::EmptySplit { split: Split::Val })
        );
        assert!(ds.require_nonempty(&[]).is_ok());
    }

    #[test]
    fn test_build_and_batches() {
        let dir = tempfile::tempdir().unwrap();
        write_cases(dir.path(), 8, 5);
        let ds = SliceDataset::build(&pairs(dir.path(), MaskKind::Prostate), &config(3, 2)).unwrap();

        assert_eq!(ds.len(Split::Train), 4);
        assert_eq!(ds.len(Split::Val), 2);
        assert_eq!(ds.len(Split::Test), 2);
        assert_eq!(ds.batch_count(Split::Train), 2);

        let sizes: Vec<_> = ds.batches(Split::Train).map(|b| b.len()).collect();
        assert_eq!(sizes, [3, 1]);
        let first = ds.batches(Split::Train).next().unwrap();
        assert_eq!(first.images.shape(), &[3, 1, 16, 16]);
        assert_eq!(first.masks.shape(), &[3, 1, 16, 16]);
        assert!(first.masks.iter().all(|p| *p == 0.0 || *p == 1.0));
        assert!(first.images.iter().all(|p| (0.0..=1.0).contains(p)));

        // 每次迭代得到相同内容.
        let again = ds.batches(Split::Train).next().unwrap();
        assert_eq!(first, again);

        // 三个划分互不相交.
        let mut cases: Vec<_> = [Split::Train, Split::Val, Split::Test]
            .iter()
            .flat_map(|s| ds.samples(*s).iter().map(|x| x.case.clone()))
            .collect();
        cases.sort();
        cases.dedup();
        assert_eq!(cases.len(), 8);
    }

    #[test]
    fn test_shuffle_is_seeded() {
        let dir = tempfile::tempdir().unwrap();
        write_cases(dir.path(), 6, 3);
        let p = pairs(dir.path(), MaskKind::Lesion);
        let mut cfg = config(2, 0);
        cfg.shuffle_seed = Some(7);
        let a = SliceDataset::build(&p, &cfg).unwrap();
        let b = SliceDataset::build(&p, &cfg).unwrap();
        let names = |d: &SliceDataset| {
            d.samples(Split::Train)
                .iter()
                .map(|s| s.case.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(names(&a), names(&b));
    }

    #[test]
    fn test_slice_out_of_range() {
        let dir = tempfile::tempdir().unwrap();
        write_cases(dir.path(), 2, 3);
        let err = SliceDataset::build(&pairs(dir.path(), MaskKind::Lesion), &config(1, 3)).unwrap_err();
        assert!(matches!(
            err,
            DatasetError::SliceOutOfRange { index: 3, depth: 3, .. }
        ));
    }

    #[test]
    fn test_shape_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        write_cases(dir.path(), 1, 3);
        let bad = Array3::<u8>::zeros((5, 5, 3));
        write_npy(
            dir.path().join("masks/case_00/lesion_mask.npy"),
            &bad,
        )
        .unwrap();
        let err = SliceDataset::build(&pairs(dir.path(), MaskKind::Lesion), &config(1, 0)).unwrap_err();
        assert!(matches!(err, DatasetError::ShapeMismatch { .. }));
    }
}
