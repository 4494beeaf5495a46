//! 训练/验证/测试数据集划分及其持久化.
//!
//! 划分建立一次后对整个运行只读. 重复运行时默认复用磁盘上的既有
//! 划分, 保护长周期实验不被意外的划分漂移污染; 仅当文件缺失或显式
//! 要求 `overwrite` 时重新生成.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::SplitError;

/// 三个划分文件的路径.
#[derive(Debug, Clone)]
pub struct SplitFiles {
    /// 训练集记录号列表文件.
    pub training: PathBuf,

    /// 验证集记录号列表文件.
    pub validation: PathBuf,

    /// 测试集记录号列表文件.
    pub testing: PathBuf,
}

impl SplitFiles {
    /// 在目录 `dir` 下使用约定文件名
    /// (`training_ids.bin` / `validation_ids.bin` / `testing_ids.bin`).
    pub fn in_dir<P: AsRef<Path>>(dir: P) -> Self {
        let dir = dir.as_ref();
        Self {
            training: dir.join("training_ids.bin"),
            validation: dir.join("validation_ids.bin"),
            testing: dir.join("testing_ids.bin"),
        }
    }

    /// 三个文件是否都已存在.
    #[inline]
    pub fn all_exist(&self) -> bool {
        self.training.is_file() && self.validation.is_file() && self.testing.is_file()
    }
}

/// 一次运行使用的记录号划分. 三个子集两两不相交,
/// 并集为全部记录号.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitLists {
    /// 训练集记录号.
    pub training: Vec<usize>,

    /// 验证集记录号.
    pub validation: Vec<usize>,

    /// 测试集记录号.
    pub testing: Vec<usize>,
}

impl SplitLists {
    /// 划分覆盖的记录总数.
    #[inline]
    pub fn len(&self) -> usize {
        self.training.len() + self.validation.len() + self.testing.len()
    }

    /// 划分是否为空.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 校验三个子集两两不相交且恰好覆盖 `0..n_records`.
    fn covers(&self, n_records: usize) -> bool {
        let mut seen = HashSet::with_capacity(self.len());
        let all = self
            .training
            .iter()
            .chain(&self.validation)
            .chain(&self.testing);
        for &id in all {
            if id >= n_records || !seen.insert(id) {
                return false;
            }
        }
        seen.len() == n_records
    }
}

/// 建立 (或复用) 训练/验证/测试划分.
///
/// `data_split` 为训练集比例, 必须在 `[0, 1]` 内; 剩余记录在验证集
/// 与测试集之间对半分 (余数给验证集). `overwrite` 为假且三个文件齐全
/// 时直接加载既有划分; 既有划分与当前记录集不一致时返回
/// [`SplitError::Stale`] 而不是悄悄重建.
pub fn train_valid_test_split<R: Rng + ?Sized>(
    n_records: usize,
    data_split: f64,
    files: &SplitFiles,
    overwrite: bool,
    rng: &mut R,
) -> Result<SplitLists, SplitError> {
    if !(0.0..=1.0).contains(&data_split) {
        return Err(SplitError::BadFraction(data_split));
    }

    if !overwrite && files.all_exist() {
        let lists = SplitLists {
            training: load_ids(&files.training)?,
            validation: load_ids(&files.validation)?,
            testing: load_ids(&files.testing)?,
        };
        if !lists.covers(n_records) {
            return Err(SplitError::Stale {
                persisted: lists.len(),
                expected: n_records,
            });
        }
        log::info!(
            "复用既有划分: 训练 {} / 验证 {} / 测试 {}",
            lists.training.len(),
            lists.validation.len(),
            lists.testing.len()
        );
        return Ok(lists);
    }

    let mut ids: Vec<usize> = (0..n_records).collect();
    ids.shuffle(rng);

    let n_training = (n_records as f64 * data_split).floor() as usize;
    let rest = n_records - n_training;
    let n_validation = rest - rest / 2;

    let testing = ids.split_off(n_training + n_validation);
    let validation = ids.split_off(n_training);
    let lists = SplitLists {
        training: ids,
        validation,
        testing,
    };

    store_ids(&files.training, &lists.training)?;
    store_ids(&files.validation, &lists.validation)?;
    store_ids(&files.testing, &lists.testing)?;
    log::info!(
        "新建划分: 训练 {} / 验证 {} / 测试 {}",
        lists.training.len(),
        lists.validation.len(),
        lists.testing.len()
    );
    Ok(lists)
}

fn load_ids(path: &Path) -> Result<Vec<usize>, SplitError> {
    let file = File::open(path).map_err(|source| SplitError::Io {
        path: path.to_owned(),
        source,
    })?;
    bincode::deserialize_from(BufReader::new(file)).map_err(|source| SplitError::Codec {
        path: path.to_owned(),
        source,
    })
}

fn store_ids(path: &Path, ids: &[usize]) -> Result<(), SplitError> {
    let file = File::create(path).map_err(|source| SplitError::Io {
        path: path.to_owned(),
        source,
    })?;
    bincode::serialize_into(BufWriter::new(file), ids).map_err(|source| SplitError::Codec {
        path: path.to_owned(),
        source,
    })
}
