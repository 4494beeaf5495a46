//! 通用常量.

/// 单通道标签值.
pub mod gray {
    /// 真值标签中, 背景的体素值.
    pub const BACKGROUND: u8 = 0;

    /// 二值化后, 前景的体素值.
    pub const FOREGROUND: u8 = 1;

    /// BRATS 风格数据集中, 坏死/非增强肿瘤核心的标签值.
    pub const BRATS_NECROTIC: u8 = 1;

    /// BRATS 风格数据集中, 瘤周水肿的标签值.
    pub const BRATS_EDEMA: u8 = 2;

    /// BRATS 风格数据集中, 增强肿瘤的标签值.
    pub const BRATS_ENHANCING: u8 = 4;

    /// 体素是否是背景?
    #[inline]
    pub const fn is_background(p: u8) -> bool {
        matches!(p, BACKGROUND)
    }

    /// 体素是否是前景 (任意非背景标签)?
    #[inline]
    pub const fn is_foreground(p: u8) -> bool {
        !is_background(p)
    }
}

/// 旋转增广默认的最大角度 (度).
pub const DEFAULT_ROTATION_DEG: f32 = 20.0;

/// 平移增广默认的最大幅度 (相对边长的比例).
pub const DEFAULT_SHIFT_FRACTION: f32 = 0.10;

/// 错切增广默认的最大强度.
pub const DEFAULT_SHEAR: f32 = 0.05;

/// 缩放增广默认的缩放区间.
pub const DEFAULT_ZOOM_RANGE: (f32, f32) = (0.9, 1.1);

/// 弹性形变默认的位移幅度.
pub const DEFAULT_ELASTIC_ALPHA: f32 = 720.0;

/// 弹性形变默认的高斯平滑标准差.
pub const DEFAULT_ELASTIC_SIGMA: f32 = 10.0;

/// 3D 增广默认的缩放扰动幅度.
pub const DEFAULT_SCALE_DEVIATION: f32 = 0.25;
