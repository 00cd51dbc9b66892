//! 图像与标签的病例配对.
//!
//! 默认按病例编号显式连接, 任何一侧多出或重复的病例都会立即报错.
//! 旧的按排序下标配对方式仍可选用, 但只检查数量.

use std::collections::btree_map::{BTreeMap, Entry};
use std::path::{Path, PathBuf};

use itertools::{EitherOrBoth, Itertools};

use crate::error::DatasetError;

/// 配对策略.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pairing {
    /// 按 [`case_id`] 连接.
    #[default]
    ByCaseId,

    /// 按排序后的下标一一对应.
    BySortOrder,
}

/// 一个病例的图像与所选标签.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CasePair {
    /// 病例编号.
    pub case: String,

    /// 图像体数据路径.
    pub image: PathBuf,

    /// 标签数组路径.
    pub mask: PathBuf,
}

/// 去掉体数据/数组扩展名.
fn strip_known_ext(name: &str) -> &str {
    [".nii.gz", ".nii", ".npy"]
        .iter()
        .find_map(|ext| name.strip_suffix(ext))
        .unwrap_or(name)
}

/// 由文件路径得到病例编号.
///
/// 1. 文件位于 `root` 的子目录中时, 编号为其所在目录相对 `root` 的路径,
///   各级以 `/` 连接, 如 `root/p01/t2.nii` -> `p01`;
/// 2. 文件直接位于 `root` 下时, 编号为去掉扩展名的文件名,
///   如 `root/p01.nii.gz` -> `p01`.
pub fn case_id(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    match rel.parent() {
        Some(parent) if parent.components().next().is_some() => parent
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .join("/"),
        _ => rel
            .file_name()
            .map(|f| strip_known_ext(&f.to_string_lossy()).to_string())
            .unwrap_or_default(),
    }
}

/// 建立 病例编号 -> 路径 的有序映射, 拒绝重复编号.
fn index_by_case(root: &Path, paths: &[PathBuf]) -> Result<BTreeMap<String, PathBuf>, DatasetError> {
    let mut map = BTreeMap::new();
    for p in paths {
        match map.entry(case_id(root, p)) {
            Entry::Vacant(v) => {
                v.insert(p.clone());
            }
            Entry::Occupied(o) => {
                return Err(DatasetError::DuplicateCase {
                    case: o.key().clone(),
                    first: o.get().clone(),
                    second: p.clone(),
                })
            }
        }
    }
    Ok(map)
}

/// 将 `img_root` 下的 `images` 与 `mask_root` 下的 `masks` 配对.
///
/// 结果为空时返回 [`DatasetError::Empty`].
pub fn pair_cases(
    img_root: &Path,
    images: &[PathBuf],
    mask_root: &Path,
    masks: &[PathBuf],
    pairing: Pairing,
) -> Result<Vec<CasePair>, DatasetError> {
    let pairs = match pairing {
        Pairing::ByCaseId => {
            let images = index_by_case(img_root, images)?;
            let masks = index_by_case(mask_root, masks)?;
            let mut pairs = Vec::with_capacity(images.len());
            for joined in images.into_iter().merge_join_by(masks, |a, b| a.0.cmp(&b.0)) {
                match joined {
                    EitherOrBoth::Both((case, image), (_, mask)) => {
                        pairs.push(CasePair { case, image, mask })
                    }
                    EitherOrBoth::Left((case, path)) => {
                        return Err(DatasetError::UnmatchedCase {
                            case,
                            missing: "mask",
                            path,
                        })
                    }
                    EitherOrBoth::Right((case, path)) => {
                        return Err(DatasetError::UnmatchedCase {
                            case,
                            missing: "image",
                            path,
                        })
                    }
                }
            }
            pairs
        }
        Pairing::BySortOrder => {
            if images.len() != masks.len() {
                return Err(DatasetError::CountMismatch {
                    images: images.len(),
                    masks: masks.len(),
                });
            }
            images
                .iter()
                .zip(masks)
                .map(|(image, mask)| CasePair {
                    case: case_id(img_root, image),
                    image: image.clone(),
                    mask: mask.clone(),
                })
                .collect()
        }
    };

    if pairs.is_empty() {
        return Err(DatasetError::Empty {
            img_dir: img_root.to_owned(),
            mask_dir: mask_root.to_owned(),
        });
    }
    Ok(pairs)
}
