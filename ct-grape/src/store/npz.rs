//! npz 归档体数据存储.
//!
//! 归档内条目按 `scan_{i}.npy` / `truth_{i}.npy` / `affine_{i}.npy`
//! 命名, 三者等长平行. 所有记录的空间形状假定一致 (以第 0 条为准).

use std::fs::{File, OpenOptions};
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use ndarray::{Array2, Array3, Array4, Ix2, Ix3, Ix4, OwnedRepr};
use ndarray_npy::NpzReader;

use crate::error::StoreError;
use crate::store::VolumeStore;
use crate::Idx3d;

/// npz 文件归档形式的体数据存储.
///
/// 内部持有 `workers` 个独立打开的底层文件通道, 取数时以轮转方式
/// 选择一个排他入口点, 以便多个消费者并发读取时获得更高并行度.
pub struct NpzVolumeStore {
    entries: Vec<Mutex<NpzReader<File>>>,
    turn: AtomicUsize,
    records: usize,
    channels: usize,
    shape: Idx3d,
}

impl std::fmt::Debug for NpzVolumeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NpzVolumeStore")
            .field("entries", &self.entries.len())
            .field("turn", &self.turn)
            .field("records", &self.records)
            .field("channels", &self.channels)
            .field("shape", &self.shape)
            .finish()
    }
}

impl NpzVolumeStore {
    /// 打开归档.
    ///
    /// `workers` 指定底层工作通道的个数, 最大为 64. 系统会从路径 `p`
    /// 打开文件 `workers` 次. 打开时读取第 0 条扫描以确定通道数与
    /// 统一空间形状; 归档为空或缺少 `scan_0.npy` 时返回错误.
    pub fn open<P: AsRef<Path>>(workers: NonZeroUsize, p: P) -> Result<Self, StoreError> {
        let workers = workers.get();
        if workers > 64 {
            return Err(StoreError::TooManyWorkers(workers as u32));
        }
        let mut v = Vec::with_capacity(workers);
        for _ in 0..workers {
            let file = OpenOptions::new().read(true).open(p.as_ref())?;
            v.push(Mutex::new(NpzReader::new(file)?));
        }

        let (records, channels, shape) = {
            let mut first = v[0].lock().unwrap();
            let records = first
                .names()?
                .iter()
                .filter(|n| n.starts_with("scan_"))
                .count();
            if records == 0 {
                return Err(StoreError::MissingEntry("scan_0.npy".to_owned()));
            }
            let probe: Array4<f32> = first.by_name::<OwnedRepr<f32>, Ix4>("scan_0.npy")?;
            let s = probe.shape();
            (records, s[0], (s[1], s[2], s[3]))
        };

        Ok(Self {
            entries: v,
            turn: AtomicUsize::new(0),
            records,
            channels,
            shape,
        })
    }

    /// 工作通道个数.
    #[inline]
    pub fn worker_len(&self) -> usize {
        self.entries.len()
    }

    fn next_slot(&self) -> usize {
        self.turn.fetch_add(1, Ordering::Relaxed) % self.worker_len()
    }

    #[inline]
    fn check_record(&self, record: usize) -> Result<(), StoreError> {
        if record >= self.records {
            return Err(StoreError::MissingRecord {
                record,
                len: self.records,
            });
        }
        Ok(())
    }
}

impl VolumeStore for NpzVolumeStore {
    #[inline]
    fn records(&self) -> usize {
        self.records
    }

    #[inline]
    fn channels(&self) -> usize {
        self.channels
    }

    #[inline]
    fn spatial_shape(&self, record: usize) -> Idx3d {
        assert!(record < self.records, "记录号 {record} 越界");
        self.shape
    }

    fn scan(&self, record: usize) -> Result<Array4<f32>, StoreError> {
        self.check_record(record)?;
        let slot = self.next_slot();
        let name = format!("scan_{record}.npy");
        let mut file = self.entries[slot].lock().unwrap();
        Ok(file.by_name::<OwnedRepr<f32>, Ix4>(&name)?)
    }

    fn truth(&self, record: usize) -> Result<Array3<u8>, StoreError> {
        self.check_record(record)?;
        let slot = self.next_slot();
        let name = format!("truth_{record}.npy");
        let mut file = self.entries[slot].lock().unwrap();
        Ok(file.by_name::<OwnedRepr<u8>, Ix3>(&name)?)
    }

    fn affine(&self, record: usize) -> Result<Array2<f32>, StoreError> {
        self.check_record(record)?;
        let slot = self.next_slot();
        let name = format!("affine_{record}.npy");
        let mut file = self.entries[slot].lock().unwrap();
        Ok(file.by_name::<OwnedRepr<f32>, Ix2>(&name)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, Array3, Array4};
    use ndarray_npy::NpzWriter;
    use std::fs::File;
    use std::num::NonZeroUsize;

    fn write_archive(path: &Path, records: usize) {
        let mut npz = NpzWriter::new(File::create(path).unwrap());
        for i in 0..records {
            let mut scan = Array4::<f32>::zeros((2, 4, 4, 4));
            scan[(0, 0, 0, 0)] = i as f32 + 1.0;
            let mut truth = Array3::<u8>::zeros((4, 4, 4));
            truth[(1, 1, 1)] = 1;
            npz.add_array(format!("scan_{i}.npy"), &scan).unwrap();
            npz.add_array(format!("truth_{i}.npy"), &truth).unwrap();
            npz.add_array(format!("affine_{i}.npy"), &Array2::<f32>::eye(4))
                .unwrap();
        }
        npz.finish().unwrap();
    }

    #[test]
    fn test_open_and_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("volumes.npz");
        write_archive(&path, 3);

        let store = NpzVolumeStore::open(NonZeroUsize::new(2).unwrap(), &path).unwrap();
        assert_eq!(store.records(), 3);
        assert_eq!(store.channels(), 2);
        assert_eq!(store.spatial_shape(0), (4, 4, 4));
        assert_eq!(store.worker_len(), 2);

        // 轮转通道下连续取数均正确.
        for i in 0..3 {
            let scan = store.scan(i).unwrap();
            assert_eq!(scan[(0, 0, 0, 0)], i as f32 + 1.0);
            let truth = store.truth(i).unwrap();
            assert_eq!(truth[(1, 1, 1)], 1);
        }
        assert!(matches!(
            store.scan(3),
            Err(StoreError::MissingRecord { record: 3, len: 3 })
        ));
    }

    #[test]
    fn test_too_many_workers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("volumes.npz");
        write_archive(&path, 1);
        let err = NpzVolumeStore::open(NonZeroUsize::new(65).unwrap(), &path).unwrap_err();
        assert!(matches!(err, StoreError::TooManyWorkers(65)));
    }
}
