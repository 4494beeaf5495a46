//! 运行配置.
//!
//! 所有配置在运行开始前构建一次, 之后只读地传递给各组件,
//! 不存在跨调用点共享的可变全局状态.

use crate::augment::AugmentKind;
use crate::error::ConfigError;
use crate::Idx3d;

/// patch 枚举规则.
///
/// `overlap[d] >= 0` 表示相邻 patch 在第 `d` 维共享的体素数;
/// `overlap[d] < 0` 表示相邻 patch 之间留出 `-overlap[d]` 体素的间隔.
/// 2.5D 的逐切片步进即通过 `[0, 0, depth - 1]` 的 overlap 实现.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchingConfig {
    /// patch 空间形状.
    pub patch_shape: Idx3d,

    /// 逐维 overlap (允许为负).
    pub overlap: [i64; 3],

    /// 每条记录每个 epoch 随机化 patch 相位时, 各维负向偏移的上界
    /// (实际偏移在 `(-bound, 0]` 内均匀抽取). `None` 表示不做随机偏移.
    pub start_offset: Option<Idx3d>,

    /// aggressive 模式: 每一维额外补一个贴齐远端边缘的起点,
    /// 保证体数据尾部余量也被覆盖.
    pub aggressive: bool,
}

impl PatchingConfig {
    /// 以零 overlap、无随机偏移、非 aggressive 模式构建.
    #[inline]
    pub fn new(patch_shape: Idx3d) -> Self {
        Self {
            patch_shape,
            overlap: [0; 3],
            start_offset: None,
            aggressive: false,
        }
    }
}

/// 批次真值的布局.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TruthLayout {
    /// 保留 patch 的全部空间维度 (2D 与 3D 训练).
    #[default]
    FullStack,

    /// 2.5D 训练: 输入覆盖相邻多张切片, 但只监督中央切片,
    /// 堆叠后沿真值最后一维取中央切片.
    CenterSlice,
}

/// 批次生成器的完整配置.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// 目标批次大小 (epoch 末尾的批次可以更小).
    pub batch_size: usize,

    /// 二值标签个数. 为 1 时真值做阈值二值化; 大于 1 时做 one-hot 展开.
    pub n_labels: usize,

    /// 有序标签值列表. `None` 时第 `i` 个通道按位置取值 `i + 1`.
    pub labels: Option<Vec<u8>>,

    /// 声明的输入通道数. 给定时每次取数都会与存储实际通道数核对.
    pub channels: Option<usize>,

    /// patch 枚举规则. `None` 表示整体数据作为单个样本.
    pub patching: Option<PatchingConfig>,

    /// 是否丢弃真值全为背景的样本.
    pub skip_blank: bool,

    /// 批次真值布局.
    pub truth_layout: TruthLayout,

    /// 几何增广配置.
    pub augment: AugmentKind,

    /// 是否对 (立方体) 数据做空间轴随机置换.
    pub permute: bool,

    /// 是否每个 epoch 洗牌样本池. 正常训练必须开启;
    /// 关闭仅用于确定性测试.
    pub shuffle: bool,

    /// 随机种子. `None` 时每次运行独立取熵,
    /// 各 epoch 的批次构成互不相同.
    pub seed: Option<u64>,
}

impl GeneratorConfig {
    /// 以给定批次大小和标签个数构建默认配置:
    /// 整体采样、无增广、开启洗牌、不跳过空白样本.
    pub fn new(batch_size: usize, n_labels: usize) -> Self {
        Self {
            batch_size,
            n_labels,
            labels: None,
            channels: None,
            patching: None,
            skip_blank: false,
            truth_layout: TruthLayout::default(),
            augment: AugmentKind::None,
            permute: false,
            shuffle: true,
            seed: None,
        }
    }

    /// 校验配置自洽性. 生成器构建时会自动调用.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if self.n_labels == 0 {
            return Err(ConfigError::ZeroLabels);
        }
        if let Some(labels) = &self.labels {
            if labels.len() != self.n_labels {
                return Err(ConfigError::LabelCountMismatch {
                    listed: labels.len(),
                    declared: self.n_labels,
                });
            }
        }
        if self.permute {
            if let Some(p) = &self.patching {
                let (a, b, c) = p.patch_shape;
                if a != b || b != c {
                    return Err(ConfigError::NonCubicPermutation {
                        shape: p.patch_shape,
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_degenerate() {
        let mut cfg = GeneratorConfig::new(0, 1);
        assert!(matches!(cfg.validate(), Err(ConfigError::ZeroBatchSize)));

        cfg.batch_size = 4;
        cfg.n_labels = 0;
        assert!(matches!(cfg.validate(), Err(ConfigError::ZeroLabels)));
    }

    #[test]
    fn test_validate_label_list_length() {
        let mut cfg = GeneratorConfig::new(4, 3);
        cfg.labels = Some(vec![10, 25]);
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::LabelCountMismatch {
                listed: 2,
                declared: 3
            })
        ));

        cfg.labels = Some(vec![10, 25, 50]);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_validate_permute_needs_cube() {
        let mut cfg = GeneratorConfig::new(2, 1);
        cfg.permute = true;
        cfg.patching = Some(PatchingConfig::new((16, 16, 8)));
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::NonCubicPermutation { .. })
        ));

        cfg.patching = Some(PatchingConfig::new((16, 16, 16)));
        assert!(cfg.validate().is_ok());
    }
}
