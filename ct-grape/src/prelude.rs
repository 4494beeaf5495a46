//! 🍇欢迎光临🍇
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::{Idx2d, Idx3d, Ori3d};

pub use crate::config::{GeneratorConfig, PatchingConfig, TruthLayout};

pub use crate::error::{ConfigError, GenerateError, ShapeError, SplitError, StoreError};

pub use crate::patches::{compute_patch_indices, patch_from_channels, patch_from_volume};

pub use crate::sampler::{build_sample_pool, Sample};

pub use crate::store::{MemVolumeStore, NpzVolumeStore, VolumeStore};

pub use crate::split::{train_valid_test_split, SplitFiles, SplitLists};

pub use crate::augment::{
    AugmentKind, ElasticOptions, PlanarOptions, Spatial3dOptions,
};

pub use crate::generator::{
    training_and_validation_generators, Batch, BatchGenerator, BundleConfig, GeneratorBundle,
};

pub use crate::steps::{number_of_steps, retained_samples};

#[cfg(feature = "rayon")]
pub use crate::steps::par_retained_samples;

pub use crate::consts::gray::{BACKGROUND, FOREGROUND};
