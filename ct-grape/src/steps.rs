//! 每 epoch 步数估计.
//!
//! 步数 = 保留样本数对批次大小的上取整除法. 开启 skip-blank 时,
//! 保留样本数通过一遍与生成器相同的枚举 + 过滤逻辑预扫描得到
//! (只取真值, 不取扫描), 保证声明的步数与实际产出一致.
//!
//! 开启相位随机化 (`start_offset`) 时, 预扫描按与生成器首个 epoch
//! 完全相同的顺序抽取偏移; 固定种子下计数对首个 epoch 精确,
//! 后续 epoch 的相位不同, 计数只是代表值.

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::GeneratorConfig;
use crate::error::GenerateError;
use crate::patches::{compute_patch_indices, patch_from_volume, random_nd_offset};
use crate::store::VolumeStore;
use crate::Ori3d;

/// `n_samples` 个样本按批次大小 `batch_size` 切分的批次数
/// (上取整, 末尾不满批次也算一步). `batch_size` 必须非零.
#[inline]
pub fn number_of_steps(n_samples: usize, batch_size: usize) -> usize {
    n_samples.div_ceil(batch_size)
}

/// 与生成器首个 epoch 相同的顺序逐记录抽取相位偏移.
fn draw_starts(records: &[usize], cfg: &GeneratorConfig) -> Vec<Option<Ori3d>> {
    let mut rng = match cfg.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    records
        .iter()
        .map(|_| {
            cfg.patching
                .as_ref()
                .and_then(|p| p.start_offset)
                .map(|bound| random_nd_offset(bound, &mut rng))
        })
        .collect()
}

/// 单条记录经枚举 + skip-blank 过滤后保留的样本数.
fn record_retained<S: VolumeStore + ?Sized>(
    store: &S,
    cfg: &GeneratorConfig,
    record: usize,
    start: Option<Ori3d>,
) -> Result<usize, GenerateError> {
    let Some(p) = cfg.patching.as_ref() else {
        if !cfg.skip_blank {
            return Ok(1);
        }
        let truth = store.truth(record)?;
        return Ok(usize::from(truth.iter().any(|&v| v > 0)));
    };

    let origins = compute_patch_indices(
        store.spatial_shape(record),
        p.patch_shape,
        p.overlap,
        start,
        p.aggressive,
    )?;
    if !cfg.skip_blank {
        return Ok(origins.len());
    }
    let truth = store.truth(record)?;
    Ok(origins
        .into_iter()
        .filter(|&origin| {
            patch_from_volume(truth.view(), p.patch_shape, origin)
                .iter()
                .any(|&v| v > 0)
        })
        .count())
}

/// 一个 epoch 经 skip-blank 过滤后保留的样本总数.
pub fn retained_samples<S: VolumeStore + ?Sized>(
    store: &S,
    records: &[usize],
    cfg: &GeneratorConfig,
) -> Result<usize, GenerateError> {
    let starts = draw_starts(records, cfg);
    let mut total = 0;
    for (&record, &start) in records.iter().zip(&starts) {
        total += record_retained(store, cfg, record, start)?;
    }
    Ok(total)
}

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::prelude::*;

        /// [`retained_samples`] 的逐记录并行版本, 结果与串行版本一致.
        /// 相位偏移仍按记录顺序串行抽取, 只有计数部分并行.
        pub fn par_retained_samples<S: VolumeStore + Sync + ?Sized>(
            store: &S,
            records: &[usize],
            cfg: &GeneratorConfig,
        ) -> Result<usize, GenerateError> {
            let starts = draw_starts(records, cfg);
            let counts: Vec<usize> = records
                .par_iter()
                .zip(starts.par_iter())
                .map(|(&record, &start)| record_retained(store, cfg, record, start))
                .collect::<Result<_, _>>()?;
            Ok(counts.iter().sum())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PatchingConfig;
    use crate::generator::BatchGenerator;
    use crate::store::MemVolumeStore;
    use ndarray::{Array3, Array4};

    #[test]
    fn test_number_of_steps_rounds_up() {
        assert_eq!(number_of_steps(0, 4), 0);
        assert_eq!(number_of_steps(8, 4), 2);
        assert_eq!(number_of_steps(9, 4), 3);
        assert_eq!(number_of_steps(3, 4), 1);
    }

    /// 前景集中在低端角落的存储: 每条记录 8 个 8^3 patch 里只有
    /// 1 个含前景.
    fn corner_store(records: usize) -> MemVolumeStore {
        let pairs = (0..records)
            .map(|_| {
                let scan = Array4::<f32>::zeros((1, 16, 16, 16));
                let mut truth = Array3::<u8>::zeros((16, 16, 16));
                truth[(2, 2, 2)] = 1;
                (scan, truth)
            })
            .collect();
        MemVolumeStore::new(pairs).unwrap()
    }

    #[test]
    fn test_retained_without_skip_blank_is_pool_size() {
        let store = corner_store(2);
        let mut cfg = GeneratorConfig::new(2, 1);
        cfg.patching = Some(PatchingConfig::new((8, 8, 8)));
        cfg.seed = Some(0);

        let retained = retained_samples(&store, &[0, 1], &cfg).unwrap();
        assert_eq!(retained, 16);
    }

    #[test]
    fn test_retained_counts_foreground_patches() {
        let store = corner_store(3);
        let mut cfg = GeneratorConfig::new(2, 1);
        cfg.patching = Some(PatchingConfig::new((8, 8, 8)));
        cfg.skip_blank = true;
        cfg.seed = Some(0);

        let retained = retained_samples(&store, &[0, 1, 2], &cfg).unwrap();
        assert_eq!(retained, 3);
    }

    /// 预扫描计数与生成器首个 epoch 的实际产出一致,
    /// 相位随机化开启时也成立.
    #[test]
    fn test_prescan_matches_generator_first_epoch() {
        let store = corner_store(2);
        let mut patching = PatchingConfig::new((8, 8, 8));
        patching.start_offset = Some((4, 4, 4));
        patching.aggressive = true;
        let mut cfg = GeneratorConfig::new(3, 1);
        cfg.patching = Some(patching);
        cfg.skip_blank = true;
        cfg.seed = Some(42);

        let retained = retained_samples(&store, &[0, 1], &cfg).unwrap();
        let steps = number_of_steps(retained, cfg.batch_size);

        let mut gen = BatchGenerator::new(&store, vec![0, 1], cfg).unwrap();
        let produced: usize = (0..steps)
            .map(|_| gen.next().unwrap().unwrap().len())
            .sum();
        assert_eq!(produced, retained);
    }

    #[cfg(feature = "rayon")]
    #[test]
    fn test_par_retained_matches_sequential() {
        let store = corner_store(4);
        let mut cfg = GeneratorConfig::new(2, 1);
        cfg.patching = Some(PatchingConfig::new((8, 8, 8)));
        cfg.skip_blank = true;
        cfg.seed = Some(7);

        let records = [0, 1, 2, 3];
        assert_eq!(
            par_retained_samples(&store, &records, &cfg).unwrap(),
            retained_samples(&store, &records, &cfg).unwrap()
        );
    }

    #[test]
    fn test_whole_volume_retained() {
        let store = corner_store(2);
        let mut cfg = GeneratorConfig::new(1, 1);
        cfg.skip_blank = true;
        assert_eq!(retained_samples(&store, &[0, 1], &cfg).unwrap(), 2);
    }
}
