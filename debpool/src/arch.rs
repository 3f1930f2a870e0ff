use crate::error::DebPoolError;
use anyhow::Result;
use strum::{AsRefStr, Display, EnumIter};

/// The Debian architectures the pool carries packages for.
#[derive(AsRefStr, Clone, Copy, Debug, Display, EnumIter, Hash, PartialEq, Eq)]
#[strum(serialize_all = "lowercase")]
pub enum DpkgArch {
    Amd64,
    Arm64,
    Armhf,
}

// Checked in this order. The upstream asset names only ever contain one of these.
const ASSET_ARCH_MARKERS: [(&str, DpkgArch); 3] = [
    ("amd64", DpkgArch::Amd64),
    ("arm64", DpkgArch::Arm64),
    ("armv7l", DpkgArch::Armhf),
];

/// Maps an upstream release asset name to the dpkg architecture it was built for.
///
/// # Errors
///
/// Returns [`DebPoolError::UnrecognizedArch`] if the name does not contain any of `amd64`,
/// `arm64`, or `armv7l`.
pub fn resolve_arch(filename: &str) -> Result<DpkgArch> {
    ASSET_ARCH_MARKERS
        .iter()
        .find(|(marker, _)| filename.contains(marker))
        .map(|(_, arch)| *arch)
        .ok_or_else(|| DebPoolError::UnrecognizedArch(filename.to_string()).into())
}
