//! 体数据加载.
//!
//! 无论来源是 nifti 图像还是预先提取的 npy 标签数组, 加载后统一以 `u8`
//! 存储, 并统一按 (z, H, W) 模式访问.

use std::path::Path;

use ndarray::{Array3, ArrayD, ArrayView2, ArrayView3, Axis, Ix3};
use ndarray_npy::{ReadNpyError, ReadableElement};
use nifti::{IntoNdArray, NiftiObject, ReaderOptions};
use num::traits::AsPrimitive;

use crate::error::LoadError;
use crate::{Idx2d, Idx3d};

pub mod transform;

/// 将任意数值先截断为整数, 再按 256 取模转换为 `u8`.
///
/// 即 `256 -> 0`, `300 -> 44`, `-1 -> 255`. 有损, 但与图像/标签的存储约定一致.
#[inline]
pub fn wrap_to_u8<T: AsPrimitive<i64>>(value: T) -> u8 {
    value.as_() as u8
}

/// 体数据文件的格式, 由扩展名决定.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum VolumeFormat {
    /// `.nii` 或 `.nii.gz`.
    Nifti,

    /// `.npy`.
    Npy,
}

impl VolumeFormat {
    /// 从路径推断格式. 无法识别时返回 `None`.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        if name.ends_with(".nii") || name.ends_with(".nii.gz") {
            Some(Self::Nifti)
        } else if name.ends_with(".npy") {
            Some(Self::Npy)
        } else {
            None
        }
    }
}

/// 内存中的三维体数据, 体素以 `u8` 保存.
///
/// 原始文件按 \[x, y, z, ...\] 组织, 这里转换成 (z, H, W) 并以行优先存储.
#[derive(Debug, Clone, PartialEq)]
pub struct Volume {
    data: Array3<u8>,
}

impl Volume {
    /// 按扩展名打开体数据文件.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, LoadError> {
        let path = path.as_ref();
        match VolumeFormat::from_path(path) {
            Some(VolumeFormat::Nifti) => Self::open_nifti(path),
            Some(VolumeFormat::Npy) => Self::open_npy(path),
            None => Err(LoadError::UnknownFormat(path.to_owned())),
        }
    }

    /// 打开 nii 文件格式的体数据. 读取器已应用缩放斜率, 随后转换为 `u8`.
    pub fn open_nifti<P: AsRef<Path>>(path: P) -> Result<Self, LoadError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(LoadError::NotFound(path.to_owned()));
        }
        let nifti_err = |source| LoadError::Nifti {
            path: path.to_owned(),
            source,
        };
        let obj = ReaderOptions::new().read_file(path).map_err(nifti_err)?;
        let raw = obj.into_volume().into_ndarray::<f64>().map_err(nifti_err)?;
        Self::from_native(raw.mapv(wrap_to_u8), path)
    }

    /// 打开 npy 文件格式的体数据. 支持所有整数、浮点和布尔元素类型.
    pub fn open_npy<P: AsRef<Path>>(path: P) -> Result<Self, LoadError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(LoadError::NotFound(path.to_owned()));
        }

        macro_rules! try_dtypes {
            ($($t: ty),+) => {
                $(
                    if let Some(arr) = read_npy_as::<$t>(path)? {
                        return Self::from_native(arr.mapv(wrap_to_u8), path);
                    }
                )+
            };
        }

        try_dtypes!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);
        if let Some(arr) = read_npy_as::<bool>(path)? {
            return Self::from_native(arr.mapv(u8::from), path);
        }
        Err(LoadError::Npy {
            path: path.to_owned(),
            reason: "unsupported element type".to_string(),
        })
    }

    /// 从 \[x, y, z, ...\] 组织的数组创建. 第四维及之后的维度只取索引 0.
    fn from_native(mut data: ArrayD<u8>, path: &Path) -> Result<Self, LoadError> {
        if data.ndim() < 3 {
            return Err(LoadError::TooFewDims {
                path: path.to_owned(),
                ndim: data.ndim(),
            });
        }
        while data.ndim() > 3 {
            data = data.index_axis_move(Axis(3), 0);
        }
        let ndim = data.ndim();
        let data = data
            .into_dimensionality::<Ix3>()
            .map_err(|_| LoadError::TooFewDims {
                path: path.to_owned(),
                ndim,
            })?;
        Ok(Self::from_xyz(data))
    }

    /// 从 \[x, y, z\] 组织的数组直接创建.
    pub fn from_xyz(data: Array3<u8>) -> Self {
        // [x, y, z] -> [z, H, W]
        let data = data.permuted_axes([2, 1, 0]);
        let data = if data.is_standard_layout() {
            data
        } else {
            data.as_standard_layout().into_owned()
        };
        debug_assert!(data.is_standard_layout());
        Self { data }
    }

    /// 获取数据形状大小 (z, H, W).
    #[inline]
    pub fn shape(&self) -> Idx3d {
        self.data.dim()
    }

    /// 获取水平切片个数.
    #[inline]
    pub fn depth(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    /// 获取水平切片形状 (H, W).
    #[inline]
    pub fn slice_shape(&self) -> Idx2d {
        let (_, h, w) = self.shape();
        (h, w)
    }

    /// 获取 z 空间的第 `z_index` 层切片视图. 越界时返回 `None`.
    #[inline]
    pub fn slice_at(&self, z_index: usize) -> Option<ArrayView2<'_, u8>> {
        (z_index < self.depth()).then(|| self.data.index_axis(Axis(0), z_index))
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView3<'_, u8> {
        self.data.view()
    }
}

/// 尝试以元素类型 `T` 读取 npy 文件. 类型不匹配时返回 `Ok(None)`.
fn read_npy_as<T: ReadableElement>(path: &Path) -> Result<Option<ArrayD<T>>, LoadError> {
    match ndarray_npy::read_npy::<_, ArrayD<T>>(path) {
        Ok(arr) => Ok(Some(arr)),
        Err(ReadNpyError::WrongDescriptor(_)) => Ok(None),
        Err(e) => Err(LoadError::Npy {
            path: path.to_owned(),
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array, Array3, ArrayD, IxDyn};
    use ndarray_npy::write_npy;
    use nifti::writer::WriterOptions;

    #[test]
    fn test_wrap_to_u8() {
        assert_eq!(wrap_to_u8(0i32), 0);
        assert_eq!(wrap_to_u8(255i32), 255);
        assert_eq!(wrap_to_u8(256i32), 0);
        assert_eq!(wrap_to_u8(300i64), 44);
        assert_eq!(wrap_to_u8(-1i16), 255);
        assert_eq!(wrap_to_u8(7.9f32), 7);
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            VolumeFormat::from_path(Path::new("a/t2.nii")),
            Some(VolumeFormat::Nifti)
        );
        assert_eq!(
            VolumeFormat::from_path(Path::new("a/t2.nii.gz")),
            Some(VolumeFormat::Nifti)
        );
        assert_eq!(
            VolumeFormat::from_path(Path::new("a/lesion_mask.npy")),
            Some(VolumeFormat::Npy)
        );
        assert_eq!(VolumeFormat::from_path(Path::new("a/readme.txt")), None);
    }

    #[test]
    fn test_axes_are_permuted() {
        // x = 2, y = 3, z = 4
        let xyz = Array3::from_shape_fn((2, 3, 4), |(x, y, z)| (x + 10 * y + 50 * z) as u8);
        let v = Volume::from_xyz(xyz.clone());
        assert_eq!(v.shape(), (4, 3, 2));
        assert_eq!(v.depth(), 4);
        assert_eq!(v.slice_shape(), (3, 2));
        let sli = v.slice_at(3).unwrap();
        for ((h, w), &p) in sli.indexed_iter() {
            assert_eq!(p, xyz[(w, h, 3)]);
        }
        assert!(v.slice_at(4).is_none());
    }

    #[test]
    fn test_nifti_round_trip_wraps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("case.nii");
        let values: Vec<i16> = (0..24).map(|i| i * 20 - 40).collect();
        let native = Array::from_shape_vec((2, 3, 4), values.clone()).unwrap();
        WriterOptions::new(&path).write_nifti(&native).unwrap();

        let v = Volume::open(&path).unwrap();
        assert_eq!(v.shape(), (4, 3, 2));
        let expected = native.mapv(wrap_to_u8);
        for ((x, y, z), &p) in expected.indexed_iter() {
            assert_eq!(v.data()[(z, y, x)], p);
        }
    }

    #[test]
    fn test_npy_dtypes() {
        let dir = tempfile::tempdir().unwrap();

        let f = dir.path().join("prostate_mask.npy");
        let arr = Array3::<f64>::from_shape_fn((3, 3, 2), |(x, _, z)| (x * z) as f64);
        write_npy(&f, &arr).unwrap();
        let v = Volume::open(&f).unwrap();
        assert_eq!(v.shape(), (2, 3, 3));
        assert_eq!(v.data()[(1, 0, 2)], 2);

        let b = dir.path().join("lesion_mask.npy");
        let arr = Array3::<bool>::from_shape_fn((2, 2, 2), |(x, y, z)| x == y && y == z);
        write_npy(&b, &arr).unwrap();
        let v = Volume::open(&b).unwrap();
        assert_eq!(v.data().iter().filter(|p| **p == 1).count(), 2);
    }

    #[test]
    fn test_extra_dims_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let f = dir.path().join("four.npy");
        let arr = ArrayD::<u8>::from_shape_fn(IxDyn(&[2, 2, 3, 2]), |ix| (ix[2] + 10 * ix[3]) as u8);
        write_npy(&f, &arr).unwrap();
        let v = Volume::open(&f).unwrap();
        assert_eq!(v.shape(), (3, 2, 2));
        assert!(v.data().iter().all(|p| *p < 10));
    }

    #[test]
    fn test_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Volume::open(dir.path().join("missing.nii")),
            Err(LoadError::NotFound(_))
        ));
        assert!(matches!(
            Volume::open(dir.path().join("notes.txt")),
            Err(LoadError::UnknownFormat(_))
        ));

        let flat = dir.path().join("flat.npy");
        write_npy(&flat, &Array::from_elem((4, 4), 1u8)).unwrap();
        assert!(matches!(
            Volume::open(&flat),
            Err(LoadError::TooFewDims { ndim: 2, .. })
        ));

        let junk = dir.path().join("junk.nii");
        std::fs::write(&junk, b"definitely not a nifti header").unwrap();
        assert!(matches!(Volume::open(&junk), Err(LoadError::Nifti { .. })));
    }
}
