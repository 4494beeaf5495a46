//! 后备存储: 按记录号随机访问的只读体数据源.
//!
//! 一次运行只打开一次, 只读访问, 运行结束后关闭. 多个生成器实例
//! 可以并发地从同一存储取数, 读侧无需写锁协调.

use ndarray::{Array2, Array3, Array4};

use crate::error::StoreError;
use crate::Idx3d;

mod mem;
mod npz;

pub use mem::MemVolumeStore;
pub use npz::NpzVolumeStore;

/// 按记录号随机访问的只读体数据存储.
///
/// 每条记录包含一个多通道扫描 `(c, x, y, z)`、一个单通道真值
/// `(x, y, z)` 以及一个 4x4 仿射变换. 任何取数失败都不做重试,
/// 错误直接向上传播.
pub trait VolumeStore {
    /// 记录总数.
    fn records(&self) -> usize;

    /// 每条记录的扫描通道数.
    fn channels(&self) -> usize;

    /// 第 `record` 条记录的空间形状.
    ///
    /// 记录号越界时 panic. 多数数据集所有记录形状一致,
    /// 但实现允许逐记录不同.
    fn spatial_shape(&self, record: usize) -> Idx3d;

    /// 取回第 `record` 条记录的多通道扫描, 形状 `(c, x, y, z)`.
    fn scan(&self, record: usize) -> Result<Array4<f32>, StoreError>;

    /// 取回第 `record` 条记录的真值标签, 形状 `(x, y, z)`.
    fn truth(&self, record: usize) -> Result<Array3<u8>, StoreError>;

    /// 取回第 `record` 条记录的 4x4 仿射变换.
    fn affine(&self, record: usize) -> Result<Array2<f32>, StoreError>;

    /// 存储是否为空.
    #[inline]
    fn is_empty(&self) -> bool {
        self.records() == 0
    }
}
