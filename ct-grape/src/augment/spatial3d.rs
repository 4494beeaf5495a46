//! 3D 变换: 逐轴随机翻转、仿射引导的缩放扰动与空间轴随机置换.

use ndarray::{s, Array2, Array3, Array4, ArrayView3, Axis};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::augment::Spatial3dOptions;
use crate::error::ConfigError;

/// 三线性采样, 越界贡献按 0 计.
fn sample_trilinear(vol: &ArrayView3<'_, f32>, u: f32, v: f32, w: f32) -> f32 {
    let dim = vol.dim();
    let u0 = u.floor();
    let v0 = v.floor();
    let w0 = w.floor();
    let fu = u - u0;
    let fv = v - v0;
    let fw = w - w0;
    let mut acc = 0.0;
    for (du, wu) in [(0i64, 1.0 - fu), (1, fu)] {
        for (dv, wv) in [(0i64, 1.0 - fv), (1, fv)] {
            for (dw, ww) in [(0i64, 1.0 - fw), (1, fw)] {
                let x = u0 as i64 + du;
                let y = v0 as i64 + dv;
                let z = w0 as i64 + dw;
                if x >= 0
                    && y >= 0
                    && z >= 0
                    && (x as usize) < dim.0
                    && (y as usize) < dim.1
                    && (z as usize) < dim.2
                {
                    acc += wu * wv * ww * vol[(x as usize, y as usize, z as usize)];
                }
            }
        }
    }
    acc
}

/// 最近邻采样, 越界取 0.
fn sample_nearest(vol: &ArrayView3<'_, u8>, u: f32, v: f32, w: f32) -> u8 {
    let dim = vol.dim();
    let x = u.round();
    let y = v.round();
    let z = w.round();
    if x >= 0.0
        && y >= 0.0
        && z >= 0.0
        && (x as usize) < dim.0
        && (y as usize) < dim.1
        && (z as usize) < dim.2
    {
        vol[(x as usize, y as usize, z as usize)]
    } else {
        0
    }
}

/// 世界轴缩放因子映射到体素轴.
///
/// 对每个体素轴取仿射矩阵中对应列上绝对值最大的分量所在的世界轴,
/// 即该体素轴主要对齐的解剖方向. 不假定仿射是轴对齐的,
/// 但斜切较大时映射只是近似.
fn voxel_factors(affine: &Array2<f32>, world: [f32; 3]) -> [f32; 3] {
    let mut factors = [1.0f32; 3];
    for (j, f) in factors.iter_mut().enumerate() {
        let mut best = 0;
        let mut best_abs = -1.0f32;
        for i in 0..3 {
            let a = affine[(i, j)].abs();
            if a > best_abs {
                best_abs = a;
                best = i;
            }
        }
        *f = world[best];
    }
    factors
}

/// 以体数据中心为不动点, 按逐轴因子重采样.
/// 因子大于 1 表示内容被放大.
fn scale_in_place(scan: &mut Array4<f32>, truth: &mut Array3<u8>, factors: [f32; 3]) {
    let (channels, x, y, z) = scan.dim();
    let center = [
        (x as f32 - 1.0) / 2.0,
        (y as f32 - 1.0) / 2.0,
        (z as f32 - 1.0) / 2.0,
    ];
    let source = |p: (usize, usize, usize)| -> (f32, f32, f32) {
        (
            center[0] + (p.0 as f32 - center[0]) / factors[0],
            center[1] + (p.1 as f32 - center[1]) / factors[1],
            center[2] + (p.2 as f32 - center[2]) / factors[2],
        )
    };

    for c in 0..channels {
        let vol = scan.slice(s![c, .., .., ..]).to_owned();
        let view = vol.view();
        let scaled = Array3::from_shape_fn((x, y, z), |p| {
            let (u, v, w) = source(p);
            sample_trilinear(&view, u, v, w)
        });
        scan.slice_mut(s![c, .., .., ..]).assign(&scaled);
    }
    let vol = truth.to_owned();
    let view = vol.view();
    let scaled = Array3::from_shape_fn(vol.dim(), |p| {
        let (u, v, w) = source(p);
        sample_nearest(&view, u, v, w)
    });
    *truth = scaled;
}

/// 对一个样本施加 3D 变换集.
///
/// 先做逐空间轴随机翻转 (每轴独立, 概率 1/2), 再按记录的仿射矩阵
/// 把世界轴缩放扰动映射到体素轴并重采样. 扫描用三线性插值,
/// 真值用最近邻插值.
pub fn augment_spatial3d<R: Rng + ?Sized>(
    scan: &mut Array4<f32>,
    truth: &mut Array3<u8>,
    affine: &Array2<f32>,
    opts: &Spatial3dOptions,
    rng: &mut R,
) {
    if opts.flip {
        for d in 0..3 {
            if rng.gen_bool(0.5) {
                scan.invert_axis(Axis(d + 1));
                truth.invert_axis(Axis(d));
            }
        }
    }
    if let Some(dev) = opts.scale_deviation {
        if dev > 0.0 {
            let world = [
                rng.gen_range(1.0 - dev..=1.0 + dev),
                rng.gen_range(1.0 - dev..=1.0 + dev),
                rng.gen_range(1.0 - dev..=1.0 + dev),
            ];
            scale_in_place(scan, truth, voxel_factors(affine, world));
        }
    }
}

/// 空间三轴随机置换, 附带逐轴随机翻转 (48 种位姿等概率).
///
/// 要求三个空间维度等长, 否则返回
/// [`ConfigError::NonCubicPermutation`]. 置换后数组重排为标准布局.
pub fn random_permutation<R: Rng + ?Sized>(
    scan: &mut Array4<f32>,
    truth: &mut Array3<u8>,
    rng: &mut R,
) -> Result<(), ConfigError> {
    let (_, x, y, z) = scan.dim();
    if x != y || y != z {
        return Err(ConfigError::NonCubicPermutation { shape: (x, y, z) });
    }

    let mut order = [0usize, 1, 2];
    order.shuffle(rng);

    let permuted_scan = scan
        .view()
        .permuted_axes([0, order[0] + 1, order[1] + 1, order[2] + 1])
        .as_standard_layout()
        .into_owned();
    let permuted_truth = truth
        .view()
        .permuted_axes(order)
        .as_standard_layout()
        .into_owned();
    *scan = permuted_scan;
    *truth = permuted_truth;

    for d in 0..3 {
        if rng.gen_bool(0.5) {
            scan.invert_axis(Axis(d + 1));
            truth.invert_axis(Axis(d));
        }
    }
    Ok(())
}
