//! Immutable core configuration.
//!
//! A [`Config`] describes the processor being emulated: its architecture
//! version, feature set, floating-point variant, Jazelle and Thumb
//! implementation levels and the set of instruction sets it may enter.
//! [`Config::for_version`] fills in the historical defaults for a version;
//! the fields are public so a host can adjust them before handing the
//! configuration to [`Core::new`](crate::Core::new), which validates it.

use flagset::FlagSet;
use thiserror::Error;

use crate::consts::{ArchVersion, Endianness, Feature, Isa};

/// Floating-point hardware variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FpVariant {
    /// No floating-point hardware.
    #[default]
    None,
    /// The legacy FPA on coprocessors 1-2.
    Fpa,
    /// VFPv2 on coprocessors 10-11.
    Vfpv2,
    /// VFPv3.
    Vfpv3,
    /// VFPv4.
    Vfpv4,
}

/// How much of Jazelle the processor implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum JazelleLevel {
    /// No Jazelle state at all.
    #[default]
    None,
    /// Trivial implementation: the state exists but every bytecode traps.
    Trivial,
    /// Hardware bytecode execution.
    Jazelle,
    /// Full JVM-assist level.
    Jvm,
    /// picoJava compatibility.
    PicoJava,
    /// Jazelle extension on later cores.
    Extension,
}

/// How much of Thumb the processor implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum ThumbLevel {
    /// No Thumb state.
    #[default]
    None,
    /// 16-bit encodings only.
    Thumb1,
    /// Thumb-2 (mixed 16/32-bit encodings).
    Thumb2,
}

/// Architecture profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Profile {
    /// Pre-v7 processors without a profile letter.
    #[default]
    Classic,
    /// Application profile.
    A,
    /// Real-time profile.
    R,
    /// Microcontroller profile.
    M,
}

/// Everything the core needs to know about the processor it emulates.
/// Immutable once the core is created.
#[derive(Debug, Clone)]
pub struct Config {
    /// Architecture version.
    pub version: ArchVersion,
    /// Implemented feature set.
    pub features: FlagSet<Feature>,
    /// Instruction sets the core may enter.
    pub isas: FlagSet<Isa>,
    /// Memory system byte ordering.
    pub endianness: Endianness,
    /// Floating-point variant.
    pub fp: FpVariant,
    /// Jazelle implementation level.
    pub jazelle: JazelleLevel,
    /// Thumb implementation level.
    pub thumb: ThumbLevel,
    /// Architecture profile.
    pub profile: Profile,
    /// When set, faults are reported from [`step`](crate::Core::step) instead
    /// of vectoring architecturally.
    pub capture_breaks: bool,
}

impl Config {
    /// Builds the historical default configuration for an architecture
    /// version: the feature set, ISA set and implementation levels a typical
    /// processor of that generation shipped with, little-endian, with faults
    /// vectoring architecturally.
    pub fn for_version(version: ArchVersion) -> Config {
        let mut features = FlagSet::default();
        let mut isas = FlagSet::from(Isa::Arm26);
        let mut fp = FpVariant::None;
        let mut jazelle = JazelleLevel::None;
        let mut thumb = ThumbLevel::None;
        let mut profile = Profile::Classic;

        features |= Feature::Arm26;
        if version >= ArchVersion::V2 {
            features |= Feature::Swp;
        }
        if version >= ArchVersion::V3 {
            features |= Feature::Arm32;
            features |= Feature::Mull;
            isas |= Isa::Arm32;
            fp = FpVariant::Fpa;
        }
        if version >= ArchVersion::V4 {
            features |= Feature::Thumb;
            isas |= Isa::Thumb;
            thumb = ThumbLevel::Thumb1;
            features -= Feature::Arm26;
            isas -= Isa::Arm26;
        }
        if version >= ArchVersion::V5 {
            features |= Feature::EnhDsp;
            features |= Feature::Jazelle;
            isas |= Isa::Jazelle;
            jazelle = JazelleLevel::Jazelle;
            fp = FpVariant::Vfpv2;
        }
        if version >= ArchVersion::V6 {
            features |= Feature::DspPair;
            features |= Feature::Multiproc;
            features |= Feature::Security;
        }
        if version >= ArchVersion::V7 {
            features |= Feature::Thumb2;
            features |= Feature::Vfp;
            features |= Feature::Dreg;
            isas |= Isa::Thumb2;
            isas |= Isa::ThumbEe;
            isas -= Isa::Thumb;
            thumb = ThumbLevel::Thumb2;
            profile = Profile::A;
            fp = FpVariant::Vfpv3;
        }
        if version >= ArchVersion::V8 {
            features |= Feature::Virtualization;
            features |= Feature::Arm64;
            features |= Feature::Dreg32;
            features |= Feature::Simd;
            isas |= Isa::A64;
            isas -= Isa::ThumbEe;
            isas -= Isa::Jazelle;
            jazelle = JazelleLevel::Trivial;
            fp = FpVariant::Vfpv4;
        }
        if matches!(fp, FpVariant::Fpa) {
            features |= Feature::Fpa;
        }
        if matches!(fp, FpVariant::Vfpv2 | FpVariant::Vfpv3 | FpVariant::Vfpv4) {
            features |= Feature::Vfp;
            features |= Feature::Dreg;
        }

        Config {
            version,
            features,
            isas,
            endianness: Endianness::Little,
            fp,
            jazelle,
            thumb,
            profile,
            capture_breaks: false,
        }
    }

    /// Checks the configuration for internal contradictions.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.isas.is_empty() {
            return Err(ConfigError::NoIsa);
        }
        if self.isas.contains(Isa::Arm32) && !self.features.contains(Feature::Arm32) {
            return Err(ConfigError::IsaWithoutFeature(Isa::Arm32));
        }
        if self.isas.contains(Isa::Arm26) && !self.features.contains(Feature::Arm26) {
            return Err(ConfigError::IsaWithoutFeature(Isa::Arm26));
        }
        if (self.isas.contains(Isa::Thumb) || self.isas.contains(Isa::Thumb2))
            && !self.features.contains(Feature::Thumb)
        {
            return Err(ConfigError::IsaWithoutFeature(Isa::Thumb));
        }
        if self.isas.contains(Isa::Thumb2) && !self.features.contains(Feature::Thumb2) {
            return Err(ConfigError::IsaWithoutFeature(Isa::Thumb2));
        }
        if self.isas.contains(Isa::Jazelle) && !self.features.contains(Feature::Jazelle) {
            return Err(ConfigError::IsaWithoutFeature(Isa::Jazelle));
        }
        if self.isas.contains(Isa::A64) && !self.features.contains(Feature::Arm64) {
            return Err(ConfigError::IsaWithoutFeature(Isa::A64));
        }
        if self.isas.contains(Isa::ThumbEe) && self.version != ArchVersion::V7 {
            return Err(ConfigError::ThumbEeVersion(self.version));
        }
        if self.version < ArchVersion::V4 && self.features.contains(Feature::Thumb) {
            return Err(ConfigError::FeatureVersion(Feature::Thumb, self.version));
        }
        if self.version < ArchVersion::V5 && self.features.contains(Feature::Jazelle) {
            return Err(ConfigError::FeatureVersion(Feature::Jazelle, self.version));
        }
        if self.version < ArchVersion::V8 && self.features.contains(Feature::Arm64) {
            return Err(ConfigError::FeatureVersion(Feature::Arm64, self.version));
        }
        if self.endianness == Endianness::Swapped && self.version >= ArchVersion::V7 {
            return Err(ConfigError::Endianness(self.endianness, self.version));
        }
        if self.jazelle >= JazelleLevel::Jazelle && !self.features.contains(Feature::Jazelle) {
            return Err(ConfigError::IsaWithoutFeature(Isa::Jazelle));
        }
        Ok(())
    }

    pub(crate) fn has(&self, feature: Feature) -> bool {
        self.features.contains(feature)
    }

    pub(crate) fn supports_isa(&self, isa: Isa) -> bool {
        self.isas.contains(isa)
    }
}

/// A contradiction inside a [`Config`], reported by
/// [`Core::new`](crate::Core::new). These are host programming errors, not
/// architectural faults.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// The supported-ISA set is empty.
    #[error("no instruction set enabled")]
    NoIsa,
    /// An ISA was enabled without the feature implementing it.
    #[error("instruction set {0:?} enabled without its feature")]
    IsaWithoutFeature(Isa),
    /// A feature predates the architecture version carrying it.
    #[error("feature {0:?} is not available on {1:?}")]
    FeatureVersion(Feature, ArchVersion),
    /// ThumbEE exists only on ARMv7.
    #[error("ThumbEE requires ARMv7, not {0:?}")]
    ThumbEeVersion(ArchVersion),
    /// The byte ordering does not exist on the version.
    #[error("{0:?} byte ordering is not available on {1:?}")]
    Endianness(Endianness, ArchVersion),
}
