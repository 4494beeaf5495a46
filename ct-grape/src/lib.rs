#![warn(missing_docs)] // <= 合适时移除它.

//! 核心库. 为体数据 (3D CT / BRATS 风格多模态扫描) 的分割网络训练提供
//! patch 索引构建与批次流式生成功能.
//!
//! 该 crate 目前仅提供 `safe` 接口. 在非期望情况下, 程序会直接 panic,
//! 而不会导致内存错误. As what Rust promises.
//!
//! # 功能总览
//!
//! ### patch 索引构建 ✅
//!
//! 给定体数据形状、patch 形状、overlap 向量与可选的随机负向起始偏移,
//! 确定性地枚举覆盖体数据的所有 patch 起点. 支持负 overlap (间隔采样,
//! 用于 2.5D 的逐切片步进) 与 aggressive 模式 (最后一个 patch 对齐远端边缘).
//!
//! 实现位于 `ct-grape/src/patches.rs`.
//!
//! ### 样本枚举 ✅
//!
//! 将 (训练/验证/测试) 划分下的记录号与逐记录 patch 起点做笛卡尔积,
//! 得到一个 epoch 的完整样本池. 每条记录每个 epoch 可重新随机化 patch 相位.
//!
//! 实现位于 `ct-grape/src/sampler.rs`.
//!
//! ### 几何增广 ✅
//!
//! 2D/2.5D 路径: 上下翻转、左右翻转、弹性形变、旋转、平移、错切、缩放,
//! 按固定顺序施加, 且同一组随机参数同时作用于所有输入通道与真值标签,
//! 保证图像与标签的空间对应关系不被破坏. 3D 路径 (翻转 + 仿射引导的缩放)
//! 与 2D 路径互斥.
//!
//! 实现位于 `ct-grape/src/augment/*`.
//!
//! ### 流式批次生成 ✅
//!
//! 无界、可重启的批次序列: 每个 epoch 重建并洗牌样本池, 逐样本取数、
//! 增广、按需跳过全背景样本, 攒满一个批次即产出; epoch 末尾的不满批次
//! 也会被产出而不是丢弃.
//!
//! 实现位于 `ct-grape/src/generator.rs`.
//!
//! ### 步数估计 ✅
//!
//! 由样本池大小与批次大小做上取整除法得到每个 epoch 的批次数;
//! 当开启 skip-blank 时使用与生成器相同的取数 + 过滤逻辑做一遍
//! 完整预扫描, 保证声明的步数与实际产出一致.
//!
//! 实现位于 `ct-grape/src/steps.rs`.
//!
//! ### 数据集划分 ✅
//!
//! 按配置比例将记录号随机划分为训练/验证/测试三个不相交子集,
//! 并持久化到文件; 重复运行时默认复用既有划分, 除非显式要求覆盖.
//!
//! 实现位于 `ct-grape/src/split.rs`.

/// 二维索引, 同时也可一定程度上用作非负整数向量.
pub type Idx2d = (usize, usize);

/// 三维索引, 同时也可一定程度上用作非负整数向量.
pub type Idx3d = (usize, usize, usize);

/// 带符号的三维 patch 起点 / 偏移量. 负分量表示越过体数据低端边界
/// (越界部分在抽取时补零).
pub type Ori3d = [i64; 3];

pub mod consts;

mod config;

pub use config::{GeneratorConfig, PatchingConfig, TruthLayout};

mod error;

pub use error::{ConfigError, GenerateError, ShapeError, SplitError, StoreError};

pub mod patches;

pub mod sampler;

pub use sampler::{build_sample_pool, Sample};

pub mod store;

pub use store::{MemVolumeStore, NpzVolumeStore, VolumeStore};

pub mod split;

pub use split::{train_valid_test_split, SplitFiles, SplitLists};

pub mod augment;

pub use augment::{AugmentKind, ElasticOptions, PlanarOptions, Spatial3dOptions};

pub mod generator;

pub use generator::{
    training_and_validation_generators, Batch, BatchGenerator, BundleConfig, GeneratorBundle,
};

pub mod steps;

pub mod prelude;
