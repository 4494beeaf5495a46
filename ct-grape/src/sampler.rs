//! 样本枚举: 记录号与 patch 起点的笛卡尔积.

use rand::Rng;

use crate::config::PatchingConfig;
use crate::error::ConfigError;
use crate::patches::{compute_patch_indices, random_nd_offset};
use crate::{Idx3d, Ori3d};

/// 生成器消费的基本单元: 一条记录加一个可选的 patch 起点
/// (`None` 表示整体数据样本).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    /// 后备存储中的记录号.
    pub record: usize,

    /// patch 起点. `None` 表示整条记录作为一个样本.
    pub origin: Option<Ori3d>,
}

/// 构建一个 epoch 的完整样本池.
///
/// 给定 patch 规则时, 逐记录调用 patch 索引构建器 (记录形状由
/// `shape_of` 给出, 允许逐记录不同), 每个起点产出一个样本; 若配置了
/// `start_offset`, 每条记录先抽取一个新的随机负向偏移, 使 patch 相位
/// 每条记录每个 epoch 各自随机化. 未给定 patch 规则时每条记录恰产出
/// 一个整体样本.
///
/// 不去重; 输出顺序为记录顺序、再按起点生成顺序 (洗牌前).
pub fn build_sample_pool<F, R>(
    records: &[usize],
    shape_of: F,
    patching: Option<&PatchingConfig>,
    rng: &mut R,
) -> Result<Vec<Sample>, ConfigError>
where
    F: Fn(usize) -> Idx3d,
    R: Rng + ?Sized,
{
    let Some(p) = patching else {
        return Ok(records
            .iter()
            .map(|&record| Sample {
                record,
                origin: None,
            })
            .collect());
    };

    let mut pool = Vec::new();
    for &record in records {
        let start = p.start_offset.map(|bound| random_nd_offset(bound, rng));
        let origins =
            compute_patch_indices(shape_of(record), p.patch_shape, p.overlap, start, p.aggressive)?;
        pool.extend(origins.into_iter().map(|origin| Sample {
            record,
            origin: Some(origin),
        }));
    }
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_whole_volume_pool() {
        let mut rng = StdRng::seed_from_u64(0);
        let pool = build_sample_pool(&[3, 1, 4], |_| (8, 8, 8), None, &mut rng).unwrap();
        assert_eq!(pool.len(), 3);
        assert_eq!(pool[0].record, 3);
        assert!(pool.iter().all(|s| s.origin.is_none()));
    }

    #[test]
    fn test_patched_pool_cross_product() {
        let mut rng = StdRng::seed_from_u64(0);
        let patching = PatchingConfig::new((16, 16, 16));
        let pool = build_sample_pool(
            &[0, 1],
            |_| (32, 32, 32),
            Some(&patching),
            &mut rng,
        )
        .unwrap();
        // 每条记录 8 个 patch, 记录顺序在前.
        assert_eq!(pool.len(), 16);
        assert!(pool[..8].iter().all(|s| s.record == 0));
        assert!(pool[8..].iter().all(|s| s.record == 1));
        assert!(pool.iter().all(|s| s.origin.is_some()));
    }

    /// 逐记录形状不同: 样本数量随记录形状变化.
    #[test]
    fn test_per_record_shapes() {
        let mut rng = StdRng::seed_from_u64(0);
        let patching = PatchingConfig::new((8, 8, 8));
        let shape_of = |r: usize| if r == 0 { (8, 8, 8) } else { (16, 8, 8) };
        let pool = build_sample_pool(&[0, 1], shape_of, Some(&patching), &mut rng).unwrap();
        assert_eq!(pool.len(), 1 + 2);
    }

    /// 相位随机化: 固定种子下偏移可复现, 且每条记录独立抽取.
    #[test]
    fn test_start_offset_randomizes_phase() {
        let mut patching = PatchingConfig::new((8, 8, 8));
        patching.start_offset = Some((4, 4, 4));
        patching.aggressive = true;

        let build = |seed: u64| {
            let mut rng = StdRng::seed_from_u64(seed);
            build_sample_pool(&[0, 1], |_| (32, 32, 32), Some(&patching), &mut rng).unwrap()
        };
        assert_eq!(build(11), build(11));

        let pool = build(11);
        let first_of = |record: usize| {
            pool.iter()
                .find(|s| s.record == record)
                .and_then(|s| s.origin)
                .unwrap()
        };
        // 偏移为负向或零.
        for d in 0..3 {
            assert!(first_of(0)[d] <= 0);
            assert!(first_of(1)[d] <= 0);
        }
    }
}
