//! 在目录树中递归查找体数据文件与标签文件.
//!
//! 所有返回的路径序列都按完整路径的字典序排列, 保证多次扫描的结果确定.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::consts::{LESION_MASK_FILE, PROSTATE_MASK_FILE};
use crate::data::VolumeFormat;

/// 同一标签目录下的两组标签路径.
///
/// 两组路径各自独立排序. 下标相同的两项是否属于同一病例由目录结构决定,
/// 这里不做检查.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaskPaths {
    /// 所有 `lesion_mask.npy`.
    pub lesion: Vec<PathBuf>,

    /// 所有 `prostate_mask.npy`.
    pub prostate: Vec<PathBuf>,
}

/// 以 `.` 开头的文件或目录, 如 `.ipynb_checkpoints`.
fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|f| f.to_str())
        .is_some_and(|f| f.starts_with('.'))
}

/// 递归访问 `dir` 下所有非隐藏文件. 目录不存在时什么也不做.
fn walk<F: FnMut(PathBuf)>(dir: &Path, visit: &mut F) -> io::Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if is_hidden(&path) {
            continue;
        }
        if path.is_dir() {
            walk(&path, visit)?;
        } else {
            visit(path);
        }
    }
    Ok(())
}

fn sort_dedup(paths: &mut Vec<PathBuf>) {
    paths.sort_unstable();
    paths.dedup();
}

/// 递归查找 `directory` 下所有 `.nii` / `.nii.gz` 文件, 按字典序返回.
///
/// 目录不存在或不含体数据时返回空序列, 不报错. 隐藏文件和隐藏目录会被跳过.
pub fn list_volume_paths<P: AsRef<Path>>(directory: P) -> io::Result<Vec<PathBuf>> {
    let mut ans = Vec::new();
    walk(directory.as_ref(), &mut |p: PathBuf| {
        if VolumeFormat::from_path(&p) == Some(VolumeFormat::Nifti) {
            ans.push(p);
        }
    })?;
    sort_dedup(&mut ans);
    Ok(ans)
}

/// 一次遍历查找 `directory` 下所有病灶标签和前列腺标签文件, 两组分别按字典序返回.
pub fn list_mask_paths<P: AsRef<Path>>(directory: P) -> io::Result<MaskPaths> {
    let mut ans = MaskPaths::default();
    walk(directory.as_ref(), &mut |p: PathBuf| {
        match p.file_name().and_then(|f| f.to_str()) {
            Some(LESION_MASK_FILE) => ans.lesion.push(p),
            Some(PROSTATE_MASK_FILE) => ans.prostate.push(p),
            _ => {}
        }
    })?;
    sort_dedup(&mut ans.lesion);
    sort_dedup(&mut ans.prostate);
    Ok(ans)
}
