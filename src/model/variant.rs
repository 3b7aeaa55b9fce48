use std::fmt::{Display, Formatter};
use std::str::FromStr;
use subenum::subenum;
use thiserror::Error;

/// Selects which forward composition a `RetinaVvsNet` runs.
#[subenum(DescriptorVariant)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Variant {
    /// Flattened VVS output feeds the fusion head.
    Base,
    /// Descriptors of the raw image are projected and concatenated with the flattened VVS output.
    #[subenum(DescriptorVariant)]
    SiftRetinaStart,
    /// Descriptors of the VVS output alone feed the fusion head.
    #[subenum(DescriptorVariant)]
    SiftVvsEnd,
    /// Descriptors of the VVS output, followed by descriptors of the Retina output.
    #[subenum(DescriptorVariant)]
    SiftBoth,
}

const ALL: [Variant; 4] = [
    Variant::Base,
    Variant::SiftRetinaStart,
    Variant::SiftVvsEnd,
    Variant::SiftBoth,
];

impl Variant {
    pub fn iter() -> impl Iterator<Item = Variant> {
        ALL.into_iter()
    }

    /// Directory-friendly identifier, also used as the checkpoint folder.
    pub const fn filename(self) -> &'static str {
        match self {
            Variant::Base => "RetinaVVS",
            Variant::SiftRetinaStart => "SIFTRetinaStart",
            Variant::SiftVvsEnd => "SIFTVVSEnd",
            Variant::SiftBoth => "SIFTBoth",
        }
    }

    /// Kebab-case name accepted on the command line.
    pub const fn cli_name(self) -> &'static str {
        match self {
            Variant::Base => "retina-vvs",
            Variant::SiftRetinaStart => "sift-retina-start",
            Variant::SiftVvsEnd => "sift-vvs-end",
            Variant::SiftBoth => "sift-both",
        }
    }

    pub fn uses_descriptors(self) -> bool {
        DescriptorVariant::try_from(self).is_ok()
    }
}

impl Display for Variant {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.filename())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown model variant `{0}` (expected one of: {})", known_variants())]
pub struct UnknownVariant(pub String);

fn known_variants() -> String {
    Variant::iter().map(Variant::cli_name).collect::<Vec<_>>().join(", ")
}

impl FromStr for Variant {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Variant::iter()
            .find(|v| v.cli_name().eq_ignore_ascii_case(s) || v.filename().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownVariant(s.to_string()))
    }
}
