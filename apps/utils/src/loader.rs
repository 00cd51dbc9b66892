//! 数据目录的定位. 命令行参数优先, 其次环境变量, 最后是默认相对路径.

use pca_berry::consts::{DEFAULT_IMG_DIR, DEFAULT_MASK_DIR};
use std::env;
use std::path::PathBuf;

/// 图像目录对应的环境变量.
pub const IMG_DIR_VAR: &str = "PCA_IMG_DIR";

/// 标签目录对应的环境变量.
pub const MASK_DIR_VAR: &str = "PCA_MASK_DIR";

fn dir_from(flag: Option<PathBuf>, var: Option<String>, default: &str) -> PathBuf {
    match (flag, var) {
        (Some(d), _) => d,
        (None, Some(v)) if !v.is_empty() => PathBuf::from(v),
        _ => PathBuf::from(default),
    }
}

/// 获取图像目录.
///
/// 1. 若给出 `flag`, 则返回其值;
/// 2. 若环境变量 `$PCA_IMG_DIR` 非空, 则返回其值;
/// 3. 否则, 返回 `data/images`.
pub fn img_dir_or_env(flag: Option<PathBuf>) -> PathBuf {
    let dir = dir_from(flag, env::var(IMG_DIR_VAR).ok(), DEFAULT_IMG_DIR);
    log::debug!("image directory: `{}`", dir.display());
    dir
}

/// 获取标签目录.
///
/// 1. 若给出 `flag`, 则返回其值;
/// 2. 若环境变量 `$PCA_MASK_DIR` 非空, 则返回其值;
/// 3. 否则, 返回 `data_2`.
pub fn mask_dir_or_env(flag: Option<PathBuf>) -> PathBuf {
    let dir = dir_from(flag, env::var(MASK_DIR_VAR).ok(), DEFAULT_MASK_DIR);
    log::debug!("mask directory: `{}`", dir.display());
    dir
}
