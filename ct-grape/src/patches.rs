//! patch 索引构建与抽取.
//!
//! patch 起点带符号: 负起点 (来自随机相位偏移或 aggressive 余量覆盖)
//! 代表 patch 部分越过体数据低端边界, 越界体素在抽取时补零.

use itertools::iproduct;
use ndarray::{s, Array3, Array4, ArrayView3, ArrayView4, Axis};
use rand::Rng;

use crate::error::ConfigError;
use crate::{Idx3d, Ori3d};

/// 逐维计算 patch 起点的等差序列, 再做笛卡尔积, 枚举覆盖体数据的
/// 所有 patch 起点.
///
/// 每一维的步长为 `patch[d] - overlap[d]` (最小为 1, 保证前进);
/// 序列从 `start[d]` (缺省 0) 开始, 只要 patch 远端不越过体数据远端
/// 就继续. `aggressive` 模式额外补一个贴齐远端边缘的起点, 即使它与
/// 前一个 patch 的重叠超过 overlap 的要求.
///
/// 当某一维上 `patch > volume` 且非 aggressive 时, 没有任何合法
/// patch, 返回 [`ConfigError::PatchExceedsVolume`].
pub fn compute_patch_indices(
    volume: Idx3d,
    patch: Idx3d,
    overlap: [i64; 3],
    start: Option<Ori3d>,
    aggressive: bool,
) -> Result<Vec<Ori3d>, ConfigError> {
    let vol = [volume.0 as i64, volume.1 as i64, volume.2 as i64];
    let pat = [patch.0 as i64, patch.1 as i64, patch.2 as i64];

    let mut axes: [Vec<i64>; 3] = Default::default();
    for d in 0..3 {
        if pat[d] > vol[d] && !aggressive {
            return Err(ConfigError::PatchExceedsVolume {
                dim: d,
                patch,
                volume,
            });
        }

        // overlap 大于等于 patch 时也必须前进.
        let step = (pat[d] - overlap[d]).max(1);
        let mut origins = Vec::new();
        let mut o = start.map_or(0, |s| s[d]);
        while o + pat[d] <= vol[d] {
            origins.push(o);
            o += step;
        }
        if aggressive {
            let far = vol[d] - pat[d];
            if origins.last() != Some(&far) {
                origins.push(far);
            }
        }
        debug_assert!(!origins.is_empty());
        axes[d] = origins;
    }

    Ok(iproduct!(&axes[0], &axes[1], &axes[2])
        .map(|(&a, &b, &c)| [a, b, c])
        .collect())
}

/// 抽取一个随机的负向起始偏移: 各维在 `(-bound[d], 0]` 内均匀取值.
/// `bound[d] == 0` 的维度偏移恒为 0.
pub fn random_nd_offset<R: Rng + ?Sized>(bound: Idx3d, rng: &mut R) -> Ori3d {
    let bound = [bound.0 as i64, bound.1 as i64, bound.2 as i64];
    let mut off = [0i64; 3];
    for d in 0..3 {
        if bound[d] > 0 {
            off[d] = -rng.gen_range(0..bound[d]);
        }
    }
    off
}

/// 单维裁剪结果: 源区间与目标区间的下界及公共长度.
#[derive(Debug, Clone, Copy)]
struct DimCopy {
    src_lo: usize,
    dst_lo: usize,
    len: usize,
}

/// 计算第 `d` 维上 patch 与体数据的重叠区间.
/// patch 完全在体数据之外时 `len == 0`.
fn clip_dim(vol: usize, patch: usize, origin: i64) -> DimCopy {
    let lo = origin.max(0);
    let hi = (origin + patch as i64).min(vol as i64);
    if hi <= lo {
        return DimCopy {
            src_lo: 0,
            dst_lo: 0,
            len: 0,
        };
    }
    DimCopy {
        src_lo: lo as usize,
        dst_lo: (lo - origin) as usize,
        len: (hi - lo) as usize,
    }
}

/// 从 3D 体数据中抽取起点为 `origin`、形状为 `patch` 的子块.
/// 越界区域以 `T::default()` (对数值类型即 0) 填充.
pub fn patch_from_volume<T: Copy + Default>(
    data: ArrayView3<'_, T>,
    patch: Idx3d,
    origin: Ori3d,
) -> Array3<T> {
    let mut out = Array3::from_elem(patch, T::default());
    let shape = data.shape();
    let dims = [
        clip_dim(shape[0], patch.0, origin[0]),
        clip_dim(shape[1], patch.1, origin[1]),
        clip_dim(shape[2], patch.2, origin[2]),
    ];
    if dims.iter().any(|d| d.len == 0) {
        return out;
    }

    let src = data.slice(s![
        dims[0].src_lo..dims[0].src_lo + dims[0].len,
        dims[1].src_lo..dims[1].src_lo + dims[1].len,
        dims[2].src_lo..dims[2].src_lo + dims[2].len,
    ]);
    out.slice_mut(s![
        dims[0].dst_lo..dims[0].dst_lo + dims[0].len,
        dims[1].dst_lo..dims[1].dst_lo + dims[1].len,
        dims[2].dst_lo..dims[2].dst_lo + dims[2].len,
    ])
    .assign(&src);
    out
}

/// 从通道在前的 4D 数据 `(c, x, y, z)` 中抽取空间子块, 通道维保持完整.
/// 越界区域补零.
pub fn patch_from_channels<T: Copy + Default>(
    data: ArrayView4<'_, T>,
    patch: Idx3d,
    origin: Ori3d,
) -> Array4<T> {
    let channels = data.len_of(Axis(0));
    let mut out = Array4::from_elem((channels, patch.0, patch.1, patch.2), T::default());
    for (c, plane) in data.axis_iter(Axis(0)).enumerate() {
        out.index_axis_mut(Axis(0), c)
            .assign(&patch_from_volume(plane, patch, origin));
    }
    out
}
