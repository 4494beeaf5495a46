//! 内存体数据存储. 主要用于测试与小型实验.

use ndarray::{Array2, Array3, Array4};

use crate::error::{ShapeError, StoreError};
use crate::store::VolumeStore;
use crate::Idx3d;

/// 完全驻留内存的体数据存储.
///
/// 记录形状允许逐条不同 (扫描与真值的空间形状必须一一对应).
/// 取数返回数据的深拷贝, 与磁盘存储的行为一致.
#[derive(Debug, Clone)]
pub struct MemVolumeStore {
    scans: Vec<Array4<f32>>,
    truths: Vec<Array3<u8>>,
    affines: Vec<Array2<f32>>,
}

impl MemVolumeStore {
    /// 由逐记录的 (扫描, 真值) 对构建, 仿射变换取单位矩阵.
    ///
    /// 所有记录的通道数必须一致, 且每条记录的扫描与真值空间形状
    /// 必须相同, 否则返回 [`ShapeError`].
    pub fn new(pairs: Vec<(Array4<f32>, Array3<u8>)>) -> Result<Self, ShapeError> {
        let affines = (0..pairs.len()).map(|_| Array2::eye(4)).collect();
        let (scans, truths) = pairs.into_iter().unzip();
        let ans = Self {
            scans,
            truths,
            affines,
        };
        ans.check_consistency()?;
        Ok(ans)
    }

    /// 由逐记录的 (扫描, 真值, 仿射) 三元组构建.
    pub fn with_affines(
        triples: Vec<(Array4<f32>, Array3<u8>, Array2<f32>)>,
    ) -> Result<Self, ShapeError> {
        let mut scans = Vec::with_capacity(triples.len());
        let mut truths = Vec::with_capacity(triples.len());
        let mut affines = Vec::with_capacity(triples.len());
        for (s, t, a) in triples {
            scans.push(s);
            truths.push(t);
            affines.push(a);
        }
        let ans = Self {
            scans,
            truths,
            affines,
        };
        ans.check_consistency()?;
        Ok(ans)
    }

    fn check_consistency(&self) -> Result<(), ShapeError> {
        let declared = self.channels();
        for (record, (scan, truth)) in self.scans.iter().zip(&self.truths).enumerate() {
            let stored = scan.shape()[0];
            if stored != declared {
                return Err(ShapeError::ChannelMismatch {
                    record,
                    stored,
                    declared,
                });
            }
            let s = (scan.shape()[1], scan.shape()[2], scan.shape()[3]);
            let t = (truth.shape()[0], truth.shape()[1], truth.shape()[2]);
            if s != t {
                return Err(ShapeError::ScanTruthMismatch {
                    record,
                    scan: s,
                    truth: t,
                });
            }
        }
        Ok(())
    }

    #[inline]
    fn check_record(&self, record: usize) -> Result<(), StoreError> {
        if record >= self.records() {
            return Err(StoreError::MissingRecord {
                record,
                len: self.records(),
            });
        }
        Ok(())
    }
}

impl VolumeStore for MemVolumeStore {
    #[inline]
    fn records(&self) -> usize {
        self.scans.len()
    }

    #[inline]
    fn channels(&self) -> usize {
        self.scans.first().map_or(0, |s| s.shape()[0])
    }

    #[inline]
    fn spatial_shape(&self, record: usize) -> Idx3d {
        let s = self.scans[record].shape();
        (s[1], s[2], s[3])
    }

    fn scan(&self, record: usize) -> Result<Array4<f32>, StoreError> {
        self.check_record(record)?;
        Ok(self.scans[record].clone())
    }

    fn truth(&self, record: usize) -> Result<Array3<u8>, StoreError> {
        self.check_record(record)?;
        Ok(self.truths[record].clone())
    }

    fn affine(&self, record: usize) -> Result<Array2<f32>, StoreError> {
        self.check_record(record)?;
        Ok(self.affines[record].clone())
    }
}
