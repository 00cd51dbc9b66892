//! 二维切片变换: 缩放与归一化.

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};
use ndarray::{Array2, ArrayView2};

/// 将 (H, W) 切片转换为灰度图像. 图像坐标为 (x = W, y = H).
fn to_gray_image(slice: ArrayView2<u8>) -> GrayImage {
    let (h, w) = slice.dim();
    GrayImage::from_fn(w as u32, h as u32, |x, y| Luma([slice[(y as usize, x as usize)]]))
}

/// 使用 `filter` 将切片缩放为 `size * size`, 像素值保持 `u8` 量化后转为 `f32`.
///
/// 空切片返回全零图像.
fn resize_with(slice: ArrayView2<u8>, size: usize, filter: FilterType) -> Array2<f32> {
    let (h, w) = slice.dim();
    if h == 0 || w == 0 {
        return Array2::zeros((size, size));
    }
    let img = to_gray_image(slice);
    let img = imageops::resize(&img, size as u32, size as u32, filter);
    Array2::from_shape_fn((size, size), |(h, w)| img.get_pixel(w as u32, h as u32)[0] as f32)
}

/// 双线性缩放.
#[inline]
pub fn resize_bilinear(slice: ArrayView2<u8>, size: usize) -> Array2<f32> {
    resize_with(slice, size, FilterType::Triangle)
}

/// 最近邻缩放. 不会引入原图中不存在的像素值, 因此适用于标签.
#[inline]
pub fn resize_nearest(slice: ArrayView2<u8>, size: usize) -> Array2<f32> {
    resize_with(slice, size, FilterType::Nearest)
}

/// 就地除以自身最大值. 最大值不为正时保持不变, 不会产生 NaN.
///
/// 返回所用的最大值, 以便复原.
pub fn normalize_by_max(img: &mut Array2<f32>) -> f32 {
    let max = img.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if max > 0.0 {
        img.mapv_inplace(|p| p / max);
    }
    max
}

/// 从三维体数据中取出的切片到模型输入的变换.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SliceTransform {
    size: usize,
}

impl SliceTransform {
    /// 构建变换, `size` 为目标正方形边长.
    #[inline]
    pub fn new(size: usize) -> Self {
        Self { size }
    }

    /// 目标边长.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// 图像切片: 双线性缩放后除以自身最大值.
    pub fn image(&self, slice: ArrayView2<u8>) -> Array2<f32> {
        let mut img = resize_bilinear(slice, self.size);
        normalize_by_max(&mut img);
        img
    }

    /// 标签切片: 最近邻缩放, 不归一化.
    #[inline]
    pub fn mask(&self, slice: ArrayView2<u8>) -> Array2<f32> {
        resize_nearest(slice, self.size)
    }
}
