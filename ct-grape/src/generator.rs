//! 流式批次生成.
//!
//! 生成器是一个无界迭代器: 每个 epoch 重建并洗牌样本池, 逐样本取数、
//! 增广、按需跳过全背景样本, 攒满一个批次即产出. epoch 末尾的不满
//! 批次也会被产出而不是丢弃, 保证声明的步数与实际产出一致.
//!
//! 任何错误 (取数失败、形状不一致) 都会作为一项 `Err` 产出,
//! 此后生成器熔断, 只再产出 `None`.

use ndarray::{stack, Array3, Array4, Array5, ArrayD, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::augment::{augment_planar, augment_spatial3d, random_permutation, AugmentKind};
use crate::config::{GeneratorConfig, TruthLayout};
use crate::error::{ConfigError, GenerateError, ShapeError};
use crate::patches::{patch_from_channels, patch_from_volume};
use crate::sampler::{build_sample_pool, Sample};
use crate::split::{train_valid_test_split, SplitFiles, SplitLists};
use crate::steps::{number_of_steps, retained_samples};
use crate::store::VolumeStore;

/// 一个训练批次.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// 输入扫描, 形状 `(n, c, x, y, z)`.
    pub scan: Array5<f32>,

    /// 真值, 形状 `(n, n_labels, x, y, z)`;
    /// [`TruthLayout::CenterSlice`] 下为 `(n, n_labels, x, y)`.
    pub truth: ArrayD<u8>,
}

impl Batch {
    /// 批次内样本数.
    #[inline]
    pub fn len(&self) -> usize {
        self.scan.shape()[0]
    }

    /// 批次是否为空. 生成器从不产出空批次, 该方法只为满足惯例.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 真值批次 `(n, x, y, z)` 展开为逐标签二值掩膜 `(n, k, x, y, z)`.
///
/// 第 `i` 个输出通道标记 `truth == labels[i]` 的体素;
/// `labels` 为 `None` 时第 `i` 个通道按位置取标签值 `i + 1`.
pub fn get_multi_class_labels(
    truth: &Array4<u8>,
    n_labels: usize,
    labels: Option<&[u8]>,
) -> Array5<u8> {
    let (n, x, y, z) = truth.dim();
    Array5::from_shape_fn((n, n_labels, x, y, z), |(b, c, i, j, k)| {
        let wanted = labels.map_or(c as u8 + 1, |l| l[c]);
        u8::from(truth[(b, i, j, k)] == wanted)
    })
}

/// 流式批次生成器.
///
/// 产出 `Result<Batch, GenerateError>` 的无界序列. 一旦产出过一项
/// `Err`, 生成器即熔断, 后续调用只返回 `None`.
#[derive(Debug)]
pub struct BatchGenerator<'s, S: VolumeStore> {
    store: &'s S,
    records: Vec<usize>,
    cfg: GeneratorConfig,
    rng: StdRng,
    pool: Vec<Sample>,
    cursor: usize,
    /// 当前 epoch 经 skip-blank 过滤后保留的样本数.
    retained: usize,
    fused: bool,
}

impl<'s, S: VolumeStore> BatchGenerator<'s, S> {
    /// 在记录子集 `records` 上构建生成器.
    ///
    /// 构建时即校验配置并建立首个 epoch 的样本池;
    /// 池为空时返回 [`ConfigError::EmptySamplePool`].
    pub fn new(
        store: &'s S,
        records: Vec<usize>,
        cfg: GeneratorConfig,
    ) -> Result<Self, GenerateError> {
        cfg.validate()?;
        let rng = match cfg.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut ans = Self {
            store,
            records,
            cfg,
            rng,
            pool: Vec::new(),
            cursor: 0,
            retained: 0,
            fused: false,
        };
        ans.begin_epoch()?;
        Ok(ans)
    }

    /// 当前 epoch 样本池的大小 (洗牌与 skip-blank 过滤之前).
    #[inline]
    pub fn pool_len(&self) -> usize {
        self.pool.len()
    }

    /// 生成器使用的配置.
    #[inline]
    pub fn config(&self) -> &GeneratorConfig {
        &self.cfg
    }

    /// 重建样本池并洗牌, 开始新的 epoch.
    fn begin_epoch(&mut self) -> Result<(), GenerateError> {
        let store = self.store;
        self.pool = build_sample_pool(
            &self.records,
            |r| store.spatial_shape(r),
            self.cfg.patching.as_ref(),
            &mut self.rng,
        )?;
        if self.pool.is_empty() {
            return Err(ConfigError::EmptySamplePool.into());
        }
        if self.cfg.shuffle {
            self.pool.shuffle(&mut self.rng);
        }
        self.cursor = 0;
        self.retained = 0;
        Ok(())
    }

    /// 取数并加工单个样本. skip-blank 丢弃的样本返回 `Ok(None)`.
    fn load_sample(
        &mut self,
        sample: Sample,
    ) -> Result<Option<(Array4<f32>, Array3<u8>)>, GenerateError> {
        let full_scan = self.store.scan(sample.record)?;
        let full_truth = self.store.truth(sample.record)?;
        if let Some(declared) = self.cfg.channels {
            let stored = full_scan.shape()[0];
            if stored != declared {
                return Err(ShapeError::ChannelMismatch {
                    record: sample.record,
                    stored,
                    declared,
                }
                .into());
            }
        }

        let (mut scan, mut truth) = match (sample.origin, &self.cfg.patching) {
            (Some(origin), Some(p)) => (
                patch_from_channels(full_scan.view(), p.patch_shape, origin),
                patch_from_volume(full_truth.view(), p.patch_shape, origin),
            ),
            _ => (full_scan, full_truth),
        };

        // 增广前判定空白, 与步数预扫描保持一致.
        if self.cfg.skip_blank && truth.iter().all(|&v| v == 0) {
            return Ok(None);
        }

        match &self.cfg.augment {
            AugmentKind::None => {}
            AugmentKind::Planar(opts) => {
                augment_planar(&mut scan, &mut truth, opts, &mut self.rng)?
            }
            AugmentKind::Spatial3d(opts) => {
                let affine = self.store.affine(sample.record)?;
                augment_spatial3d(&mut scan, &mut truth, &affine, opts, &mut self.rng);
            }
        }
        if self.cfg.permute {
            random_permutation(&mut scan, &mut truth, &mut self.rng)?;
        }
        Ok(Some((scan, truth)))
    }

    /// 样本堆叠为批次数组并做真值展开.
    fn convert(
        &self,
        scans: Vec<Array4<f32>>,
        truths: Vec<Array3<u8>>,
    ) -> Result<Batch, GenerateError> {
        let views: Vec<_> = scans.iter().map(|a| a.view()).collect();
        let scan = stack(Axis(0), &views).map_err(|_| ShapeError::Stacking)?;

        let views: Vec<_> = truths.iter().map(|a| a.view()).collect();
        let stacked = stack(Axis(0), &views).map_err(|_| ShapeError::Stacking)?;
        let expanded = if self.cfg.n_labels == 1 {
            stacked.mapv(|v| u8::from(v > 0)).insert_axis(Axis(1))
        } else {
            get_multi_class_labels(&stacked, self.cfg.n_labels, self.cfg.labels.as_deref())
        };

        let truth = match self.cfg.truth_layout {
            TruthLayout::FullStack => expanded.into_dyn(),
            TruthLayout::CenterSlice => {
                let depth = expanded.shape()[4];
                expanded.index_axis(Axis(4), depth / 2).to_owned().into_dyn()
            }
        };
        Ok(Batch { scan, truth })
    }

    fn next_batch(&mut self) -> Result<Batch, GenerateError> {
        let mut scans = Vec::with_capacity(self.cfg.batch_size);
        let mut truths = Vec::with_capacity(self.cfg.batch_size);
        loop {
            if self.cursor == self.pool.len() {
                if !scans.is_empty() {
                    // epoch 末尾的不满批次照常产出, 池留到下次调用重建.
                    return self.convert(scans, truths);
                }
                if self.retained == 0 {
                    return Err(GenerateError::AllBlank {
                        pool: self.pool.len(),
                    });
                }
                self.begin_epoch()?;
            }

            let sample = self.pool[self.cursor];
            self.cursor += 1;
            if let Some((scan, truth)) = self.load_sample(sample)? {
                self.retained += 1;
                scans.push(scan);
                truths.push(truth);
                if scans.len() == self.cfg.batch_size {
                    return self.convert(scans, truths);
                }
            }
        }
    }
}

impl<S: VolumeStore> Iterator for BatchGenerator<'_, S> {
    type Item = Result<Batch, GenerateError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.fused {
            return None;
        }
        match self.next_batch() {
            Ok(batch) => Some(Ok(batch)),
            Err(e) => {
                self.fused = true;
                Some(Err(e))
            }
        }
    }
}

/// 训练 + 验证生成器捆绑的构建配置.
#[derive(Debug, Clone)]
pub struct BundleConfig {
    /// 训练生成器配置.
    pub training: GeneratorConfig,

    /// 验证生成器配置. 惯例上不开增广, 关闭洗牌.
    pub validation: GeneratorConfig,

    /// 训练集比例, 剩余记录在验证集与测试集间对半分.
    pub data_split: f64,

    /// 划分持久化文件.
    pub split_files: SplitFiles,

    /// 是否强制重建既有划分.
    pub overwrite_split: bool,

    /// 划分洗牌的随机种子. `None` 时取熵.
    pub split_seed: Option<u64>,
}

/// 一次训练运行所需的全部生成器与步数.
pub struct GeneratorBundle<'s, S: VolumeStore> {
    /// 训练生成器.
    pub training: BatchGenerator<'s, S>,

    /// 验证生成器.
    pub validation: BatchGenerator<'s, S>,

    /// 训练每 epoch 步数.
    pub training_steps: usize,

    /// 验证每 epoch 步数.
    pub validation_steps: usize,

    /// 本次运行使用的记录划分.
    pub split: SplitLists,
}

/// 建立 (或复用) 数据划分, 构建训练与验证生成器, 并预先算出
/// 两者每 epoch 的步数.
pub fn training_and_validation_generators<'s, S: VolumeStore>(
    store: &'s S,
    cfg: &BundleConfig,
) -> Result<GeneratorBundle<'s, S>, GenerateError> {
    let mut split_rng = match cfg.split_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let split = train_valid_test_split(
        store.records(),
        cfg.data_split,
        &cfg.split_files,
        cfg.overwrite_split,
        &mut split_rng,
    )?;

    let training_retained = retained_samples(store, &split.training, &cfg.training)?;
    let validation_retained = retained_samples(store, &split.validation, &cfg.validation)?;
    let training_steps = number_of_steps(training_retained, cfg.training.batch_size);
    let validation_steps = number_of_steps(validation_retained, cfg.validation.batch_size);
    log::info!("训练每 epoch {training_steps} 步, 验证每 epoch {validation_steps} 步");

    Ok(GeneratorBundle {
        training: BatchGenerator::new(store, split.training.clone(), cfg.training.clone())?,
        validation: BatchGenerator::new(store, split.validation.clone(), cfg.validation.clone())?,
        training_steps,
        validation_steps,
        split,
    })
}
