//! 运行时错误.

use std::path::PathBuf;

use crate::Idx3d;

/// 配置与形状约束冲突导致的错误. 这类错误在运行开始前
/// (或首次使用相应功能时) 即可被发现.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// 非 aggressive 模式下, patch 形状在某一维超过体数据形状,
    /// 没有任何合法 patch 可以放下.
    #[error("第 {dim} 维上 patch 形状 {patch:?} 超过体数据形状 {volume:?}, 且未开启 aggressive 模式")]
    PatchExceedsVolume {
        /// 出错的维度下标.
        dim: usize,
        /// patch 形状.
        patch: Idx3d,
        /// 体数据形状.
        volume: Idx3d,
    },

    /// 在非立方体数据上请求了空间轴随机置换.
    #[error("空间轴置换要求三个空间维度等长, 实际形状为 {shape:?}")]
    NonCubicPermutation {
        /// 实际空间形状.
        shape: Idx3d,
    },

    /// 批次大小为 0.
    #[error("批次大小必须至少为 1")]
    ZeroBatchSize,

    /// 标签个数为 0.
    #[error("标签个数必须至少为 1")]
    ZeroLabels,

    /// 显式标签列表长度与声明的标签个数不一致.
    #[error("标签列表长度 {listed} 与声明的标签个数 {declared} 不一致")]
    LabelCountMismatch {
        /// 标签列表实际长度.
        listed: usize,
        /// 配置声明的标签个数.
        declared: usize,
    },

    /// 样本池为空 (记录列表为空, 或逐记录 patch 枚举没有产生任何样本).
    #[error("样本池为空, 生成器无数据可产出")]
    EmptySamplePool,
}

/// 数组形状不满足操作要求导致的错误.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ShapeError {
    /// 弹性形变只支持 2D (或带退化第三维的 2D) 数组.
    #[error("弹性形变要求第三维长度为 1 的 patch, 实际第三维长度为 {depth}")]
    ElasticRank {
        /// 实际的第三维长度.
        depth: usize,
    },

    /// 取回的扫描通道数与配置声明的通道数不一致.
    #[error("记录 {record} 的扫描通道数为 {stored}, 与声明的 {declared} 不一致")]
    ChannelMismatch {
        /// 记录号.
        record: usize,
        /// 存储中的实际通道数.
        stored: usize,
        /// 配置声明的通道数.
        declared: usize,
    },

    /// 同一批次内样本形状不一致, 无法堆叠.
    #[error("批次内样本形状不一致, 无法堆叠为批次数组")]
    Stacking,

    /// 扫描与真值的空间形状不一致.
    #[error("记录 {record} 的扫描空间形状 {scan:?} 与真值形状 {truth:?} 不一致")]
    ScanTruthMismatch {
        /// 记录号.
        record: usize,
        /// 扫描的空间形状.
        scan: Idx3d,
        /// 真值的空间形状.
        truth: Idx3d,
    },
}

/// 后备存储访问错误. 取数失败不做重试, 直接向上传播并终止生成器.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// workers 太大. 最多支持 64.
    #[error("工作通道个数 {0} 超过上限 64")]
    TooManyWorkers(u32),

    /// 打开或读取 npz 文件错误.
    #[error("读取 npz 归档失败: {0}")]
    ReadNpz(#[from] ndarray_npy::ReadNpzError),

    /// 其他底层 I/O 错误.
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 记录号越界.
    #[error("记录号 {record} 越界, 存储共有 {len} 条记录")]
    MissingRecord {
        /// 请求的记录号.
        record: usize,
        /// 存储的记录总数.
        len: usize,
    },

    /// 归档中缺少某条记录对应的条目.
    #[error("npz 归档中缺少条目 {0}")]
    MissingEntry(String),
}

/// 数据集划分的建立 / 持久化错误.
#[derive(Debug, thiserror::Error)]
pub enum SplitError {
    /// 划分比例不在 `[0, 1]` 区间内.
    #[error("划分比例 {0} 不在 [0, 1] 区间内")]
    BadFraction(f64),

    /// 划分文件读写错误.
    #[error("划分文件 {path} 读写失败: {source}")]
    Io {
        /// 出错的文件路径.
        path: PathBuf,
        /// 底层 I/O 错误.
        source: std::io::Error,
    },

    /// 划分文件编解码错误.
    #[error("划分文件 {path} 编解码失败: {source}")]
    Codec {
        /// 出错的文件路径.
        path: PathBuf,
        /// 底层编解码错误.
        source: bincode::Error,
    },

    /// 既有划分与当前记录集不一致 (记录增删后的陈旧划分).
    /// 显式传入 `overwrite = true` 可重新生成.
    #[error("既有划分覆盖 {persisted} 条记录, 与当前的 {expected} 条不一致; 如需重建请显式 overwrite")]
    Stale {
        /// 持久化划分覆盖的记录数.
        persisted: usize,
        /// 当前记录总数.
        expected: usize,
    },
}

/// 批次生成过程中的错误. 生成器产出一次该错误后即终止.
#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    /// 配置错误.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// 形状错误.
    #[error(transparent)]
    Shape(#[from] ShapeError),

    /// 后备存储错误.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// 数据集划分错误.
    #[error(transparent)]
    Split(#[from] SplitError),

    /// 开启 skip-blank 后, 整个 epoch 没有保留任何样本.
    /// 继续运行只会空转, 因此作为错误上报.
    #[error("skip-blank 过滤后整个 epoch 无样本保留 (池大小 {pool})")]
    AllBlank {
        /// 该 epoch 的样本池大小.
        pool: usize,
    },
}
