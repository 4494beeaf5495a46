//! 在线几何增广.
//!
//! 所有变换同时作用于全部输入通道与真值标签, 且共享同一组随机参数,
//! 保证图像与标签的空间对应关系不被破坏. 2D/2.5D 变换集与 3D
//! (仿射引导) 变换集互斥, 以带标签的枚举表达.

use crate::consts::{
    DEFAULT_ELASTIC_ALPHA, DEFAULT_ELASTIC_SIGMA, DEFAULT_ROTATION_DEG, DEFAULT_SCALE_DEVIATION,
    DEFAULT_SHEAR, DEFAULT_SHIFT_FRACTION, DEFAULT_ZOOM_RANGE,
};

mod planar;
mod spatial3d;

pub use planar::augment_planar;
pub use spatial3d::{augment_spatial3d, random_permutation};

/// 弹性形变参数.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElasticOptions {
    /// 位移场幅度.
    pub alpha: f32,

    /// 噪声场高斯平滑的标准差. 越大形变越平缓.
    pub sigma: f32,
}

impl Default for ElasticOptions {
    #[inline]
    fn default() -> Self {
        Self {
            alpha: DEFAULT_ELASTIC_ALPHA,
            sigma: DEFAULT_ELASTIC_SIGMA,
        }
    }
}

/// 2D/2.5D 变换集. 每项独立开关; 施加顺序固定为
/// 上下翻转 → 左右翻转 → 弹性 → 旋转 → 平移 → 错切 → 缩放.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanarOptions {
    /// 上下翻转 (出现概率 1/2).
    pub flip_vertical: bool,

    /// 左右翻转 (出现概率 1/2).
    pub flip_horizontal: bool,

    /// 弹性形变. 仅支持第三维长度为 1 的 patch.
    pub elastic: Option<ElasticOptions>,

    /// 旋转最大角度 (度), 实际角度在 `[-v, v]` 内均匀抽取.
    pub rotation_deg: Option<f32>,

    /// 平移最大幅度 (相对各维边长的比例), 两个方向独立抽取.
    pub shift_fraction: Option<(f32, f32)>,

    /// 错切最大强度.
    pub shear: Option<f32>,

    /// 缩放区间, 两个方向独立抽取.
    pub zoom_range: Option<(f32, f32)>,
}

impl PlanarOptions {
    /// 启用全部变换并取各自的默认参数 (2D 训练常用配置).
    pub fn all_defaults() -> Self {
        Self {
            flip_vertical: true,
            flip_horizontal: true,
            elastic: Some(ElasticOptions::default()),
            rotation_deg: Some(DEFAULT_ROTATION_DEG),
            shift_fraction: Some((DEFAULT_SHIFT_FRACTION, DEFAULT_SHIFT_FRACTION)),
            shear: Some(DEFAULT_SHEAR),
            zoom_range: Some(DEFAULT_ZOOM_RANGE),
        }
    }

    /// 是否有任一变换被启用.
    pub fn any_enabled(&self) -> bool {
        self.flip_vertical
            || self.flip_horizontal
            || self.elastic.is_some()
            || self.rotation_deg.is_some()
            || self.shift_fraction.is_some()
            || self.shear.is_some()
            || self.zoom_range.is_some()
    }
}

/// 3D 路径变换参数: 逐轴随机翻转加仿射引导的缩放扰动.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spatial3dOptions {
    /// 是否允许逐空间轴随机翻转 (每轴独立, 概率 1/2).
    pub flip: bool,

    /// 缩放扰动幅度: 各世界轴缩放因子在 `[1 - v, 1 + v]` 内均匀抽取,
    /// 再经记录的仿射变换映射到体素轴. `None` 表示不缩放.
    pub scale_deviation: Option<f32>,
}

impl Default for Spatial3dOptions {
    #[inline]
    fn default() -> Self {
        Self {
            flip: true,
            scale_deviation: Some(DEFAULT_SCALE_DEVIATION),
        }
    }
}

/// 增广方式. 2D/2.5D 与 3D 两套变换互斥, 由枚举保证.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum AugmentKind {
    /// 不做增广.
    #[default]
    None,

    /// 2D/2.5D 变换集.
    Planar(PlanarOptions),

    /// 3D 仿射引导变换集.
    Spatial3d(Spatial3dOptions),
}

impl AugmentKind {
    /// 是否实际启用了任何变换.
    pub fn is_active(&self) -> bool {
        match self {
            AugmentKind::None => false,
            AugmentKind::Planar(p) => p.any_enabled(),
            AugmentKind::Spatial3d(s) => s.flip || s.scale_deviation.is_some(),
        }
    }
}
