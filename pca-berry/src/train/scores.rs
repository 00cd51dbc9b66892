//! 训练曲线与运行摘要的落盘.
//!
//! 每次运行写入 `root/{base}` 目录; 目录已存在时依次尝试 `{base}_1`, `{base}_2`, ...,
//! 从不覆盖旧结果.

use std::fs;
use std::path::{Path, PathBuf};

use ndarray::Array1;
use ndarray_npy::write_npy;

use crate::consts::scores;
use crate::dataset::SliceDatasetConfig;
use crate::error::PersistError;
use crate::train::TrainingState;

/// 一次运行的配置与结果摘要, 以 json 保存.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct RunSummary {
    /// 模型名.
    pub model: String,

    /// 数据集配置.
    pub dataset: SliceDatasetConfig,

    /// 训练轮数.
    pub epochs: usize,

    /// 验证间隔.
    pub val_interval: usize,

    /// 初始学习率.
    pub learning_rate: f64,

    /// 各划分的样本数: (训练, 验证, 测试).
    pub samples: (usize, usize, usize),

    /// 最优验证指标.
    pub best_metric: f64,

    /// 最优验证指标所在轮次.
    pub best_epoch: usize,

    /// 权重文件, 未保存时为 `None`.
    pub weights: Option<PathBuf>,
}

/// 分数写出器.
#[derive(Debug, Clone)]
pub struct ScoreWriter {
    root: PathBuf,
}

impl ScoreWriter {
    /// 以 `root` 为根目录.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_owned(),
        }
    }

    /// 根目录.
    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 创建并返回一个尚不存在的输出目录.
    pub fn unique_dir(&self, base: &str) -> Result<PathBuf, PersistError> {
        fs::create_dir_all(&self.root).map_err(io_err(&self.root))?;
        let mut dir = self.root.join(base);
        let mut n = 1usize;
        while dir.exists() {
            dir = self.root.join(format!("{base}_{n}"));
            n += 1;
        }
        fs::create_dir(&dir).map_err(io_err(&dir))?;
        Ok(dir)
    }

    /// 写出所有曲线与摘要, 返回输出目录.
    ///
    /// 测试分数数组在未运行测试时长度为 0.
    pub fn write(
        &self,
        base: &str,
        state: &TrainingState,
        summary: &RunSummary,
    ) -> Result<PathBuf, PersistError> {
        let dir = self.unique_dir(base)?;
        let curves: [(&str, &[f64]); 6] = [
            (scores::TRAIN_DICE, state.train_dice.as_slice()),
            (scores::TRAIN_LOSS, state.train_loss.as_slice()),
            (scores::VAL_DICE, state.val_dice.as_slice()),
            (scores::VAL_LOSS, state.val_loss.as_slice()),
            (scores::TEST_DICE, state.test_dice.as_slice()),
            (scores::TEST_LOSS, state.test_loss.as_slice()),
        ];
        for (name, values) in curves {
            let path = dir.join(name);
            write_npy(&path, &Array1::from(values.to_vec()))
                .map_err(|source| PersistError::Npy { path, source })?;
        }

        let path = dir.join(scores::SUMMARY);
        let json = serde_json::to_string_pretty(summary).map_err(|source| PersistError::Json {
            path: path.clone(),
            source,
        })?;
        fs::write(&path, json).map_err(io_err(&path))?;
        log::info!("scores written to `{}`", dir.display());
        Ok(dir)
    }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> PersistError {
    let path = path.to_owned();
    move |source| PersistError::Io { path, source }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::MaskKind;
    use crate::dataset::SplitRatio;
    use ndarray_npy::read_npy;

    fn summary() -> RunSummary {
        RunSummary {
            model: "unet".to_string(),
            dataset: SliceDatasetConfig {
                batch_size: 2,
                size: 32,
                slice_index: 1,
                mask: MaskKind::Lesion,
                split: SplitRatio::default(),
                shuffle_seed: None,
            },
            epochs: 2,
            val_interval: 1,
            learning_rate: 1e-3,
            samples: (4, 1, 1),
            best_metric: 0.5,
            best_epoch: 2,
            weights: None,
        }
    }

    #[test]
    fn test_unique_dir() {
        let dir = tempfile::tempdir().unwrap();
        let w = ScoreWriter::new(dir.path().join("scores"));
        let names: Vec<_> = (0..3)
            .map(|_| w.unique_dir("unet").unwrap())
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["unet", "unet_1", "unet_2"]);
        assert_eq!(w.unique_dir("prostate-unet").unwrap(), w.root().join("prostate-unet"));
    }

    #[test]
    fn test_write() {
        let dir = tempfile::tempdir().unwrap();
        let w = ScoreWriter::new(dir.path());
        let state = TrainingState {
            train_loss: vec![1.5, 1.0],
            train_dice: vec![0.1, 0.2],
            val_loss: vec![0.9, 0.8],
            val_dice: vec![0.3, 0.4],
            test_loss: None,
            test_dice: None,
        };
        let out = w.write("unet", &state, &summary()).unwrap();

        let train_loss: Array1<f64> = read_npy(out.join(scores::TRAIN_LOSS)).unwrap();
        assert_eq!(train_loss.to_vec(), [1.5, 1.0]);
        let val_dice: Array1<f64> = read_npy(out.join(scores::VAL_DICE)).unwrap();
        assert_eq!(val_dice.to_vec(), [0.3, 0.4]);
        let test_dice: Array1<f64> = read_npy(out.join(scores::TEST_DICE)).unwrap();
        assert!(test_dice.is_empty());

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(out.join(scores::SUMMARY)).unwrap()).unwrap();
        assert_eq!(json["model"], "unet");
        assert_eq!(json["dataset"]["mask"], "lesion");
        assert_eq!(json["best_epoch"], 2);

        // 再写一次不会覆盖.
        let again = w.write("unet", &state, &summary()).unwrap();
        assert_eq!(again, dir.path().join("unet_1"));
    }
}
