//! 数据集操作.
//!
//! 从目录扫描到可按批迭代的切片数据集:
//! [`paths`] 查找文件, [`pairing`] 按病例配对, [`slices`] 加载、切片并划分.

use std::path::Path;

pub mod pairing;
pub mod paths;
pub mod slices;

pub use pairing::{case_id, pair_cases, CasePair, Pairing};
pub use paths::{list_mask_paths, list_volume_paths, MaskPaths};
pub use slices::{Batch, Sample, SliceDataset, SliceDatasetConfig, Split, SplitRatio};

use crate::consts::MaskKind;
use crate::error::DatasetError;

impl MaskPaths {
    /// 按标签种类选出一组路径.
    #[inline]
    pub fn select(&self, kind: MaskKind) -> &[std::path::PathBuf] {
        match kind {
            MaskKind::Lesion => &self.lesion,
            MaskKind::Prostate => &self.prostate,
        }
    }
}

/// 扫描 `img_dir` 和 `mask_dir`, 按 `pairing` 配对所选标签.
///
/// 任何一侧为空, 或配对结果为空, 都会返回错误.
pub fn discover_cases<P: AsRef<Path>, Q: AsRef<Path>>(
    img_dir: P,
    mask_dir: Q,
    mask: MaskKind,
    pairing: Pairing,
) -> Result<Vec<CasePair>, DatasetError> {
    let (img_dir, mask_dir) = (img_dir.as_ref(), mask_dir.as_ref());
    let io_err = |path: &Path| {
        let path = path.to_owned();
        move |source| DatasetError::Io { path, source }
    };

    let images = list_volume_paths(img_dir).map_err(io_err(img_dir))?;
    let masks = list_mask_paths(mask_dir).map_err(io_err(mask_dir))?;
    log::info!(
        "found {} image volume(s) under `{}`, {} lesion / {} prostate mask(s) under `{}`",
        images.len(),
        img_dir.display(),
        masks.lesion.len(),
        masks.prostate.len(),
        mask_dir.display()
    );

    pair_cases(img_dir, &images, mask_dir, masks.select(mask), pairing)
}

impl SliceDataset {
    /// 扫描目录, 配对并构建数据集.
    pub fn from_dirs<P: AsRef<Path>, Q: AsRef<Path>>(
        img_dir: P,
        mask_dir: Q,
        pairing: Pairing,
        config: &SliceDatasetConfig,
    ) -> Result<Self, DatasetError> {
        let pairs = discover_cases(img_dir, mask_dir, config.mask, pairing)?;
        log::info!("paired {} case(s)", pairs.len());
        Self::build(&pairs, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{create_dir_all, File};

    #[test]
    fn test_empty_dirs_are_config_errors() {
        let dir = tempfile::tempdir().unwrap();
        let err = discover_cases(
            dir.path().join("images"),
            dir.path().join("masks"),
            MaskKind::Lesion,
            Pairing::ByCaseId,
        )
        .unwrap_err();
        assert!(matches!(err, DatasetError::Empty { .. }));
    }

    #[test]
    fn test_select_mask_kind() {
        let dir = tempfile::tempdir().unwrap();
        for case in ["p1", "p2"] {
            let img = dir.path().join("images").join(case);
            let msk = dir.path().join("masks").join(case);
            create_dir_all(&img).unwrap();
            create_dir_all(&msk).unwrap();
            File::create(img.join("t2.nii")).unwrap();
            File::create(msk.join("prostate_mask.npy")).unwrap();
        }
        let root = dir.path();
        let pairs = discover_cases(
            root.join("images"),
            root.join("masks"),
            MaskKind::Prostate,
            Pairing::ByCaseId,
        )
        .unwrap();
        assert_eq!(pairs.len(), 2);
        assert!(pairs.iter().all(|p| p.mask.ends_with("prostate_mask.npy")));

        // 没有病灶标签, 每个图像都找不到配对.
        let err = discover_cases(
            root.join("images"),
            root.join("masks"),
            MaskKind::Lesion,
            Pairing::ByCaseId,
        )
        .unwrap_err();
        assert!(matches!(err, DatasetError::UnmatchedCase { .. }));
    }
}
