//! Colorspaces, HDR metadata and host color descriptions.
//!
//! A plane's content is tagged with a [`Colorspace`]. When the host offers
//! native color management, HDR colorspaces are described to it with a
//! [`ColorDescription`]; hosts that only speak the frog protocol get a
//! primaries/transfer-function pair from [`frog_color`] instead.

/// Colorspace a layer's pixels are encoded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Colorspace {
    #[default]
    Passthru,
    Linear,
    Srgb,
    Hdr10Pq,
    Scrgb,
}

pub fn colorspace_is_hdr(colorspace: Colorspace) -> bool {
    matches!(colorspace, Colorspace::Hdr10Pq | Colorspace::Scrgb)
}

/// HDR static metadata (CTA-861 type 1 infoframe).
///
/// Chromaticities are in units of 0.00002, max mastering luminance in cd/m²,
/// min mastering luminance in 0.0001 cd/m².
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HdrMetadata {
    pub display_primaries: [(u16, u16); 3],
    pub white_point: (u16, u16),
    pub max_display_mastering_luminance: u16,
    pub min_display_mastering_luminance: u16,
    pub max_cll: u16,
    pub max_fall: u16,
}

/// Infoframe chromaticity unit (0.00002) expressed as a divisor.
const INFOFRAME_CHROMATICITY_DIVISOR: i64 = 0xC350;

/// Protocol chromaticities are integers scaled by one million.
const PRIMARY_SCALE: f32 = 1_000_000.0;

fn infoframe_to_protocol(v: u16) -> i32 {
    (i64::from(v) * 1_000_000 / INFOFRAME_CHROMATICITY_DIVISOR) as i32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamedPrimaries {
    Srgb,
    Bt2020,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimariesSpec {
    Named(NamedPrimaries),
    /// r, g, b, white as (x, y) pairs scaled by one million.
    Custom([i32; 8]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MasteringInfo {
    pub primaries: [i32; 8],
    pub min_luminance: u32,
    pub max_luminance: u32,
    pub max_cll: u32,
    pub max_fall: u32,
}

/// Image description handed to a color-managed host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorDescription {
    WindowsScrgb,
    Hdr10 {
        primaries: PrimariesSpec,
        mastering: Option<MasteringInfo>,
    },
}

/// Build the host description for a colorspace, or `None` when the host
/// should treat the surface as untagged.
pub fn describe(
    colorspace: Colorspace,
    hdr: Option<&HdrMetadata>,
    saturation_scale: f32,
) -> Option<ColorDescription> {
    match colorspace {
        Colorspace::Scrgb => Some(ColorDescription::WindowsScrgb),
        Colorspace::Hdr10Pq => {
            let primaries = if (saturation_scale - 1.0).abs() < 0.001 {
                PrimariesSpec::Named(NamedPrimaries::Bt2020)
            } else {
                PrimariesSpec::Custom(scaled_bt2020_primaries(saturation_scale))
            };
            let mastering = hdr.map(|meta| MasteringInfo {
                primaries: [
                    infoframe_to_protocol(meta.display_primaries[0].0),
                    infoframe_to_protocol(meta.display_primaries[0].1),
                    infoframe_to_protocol(meta.display_primaries[1].0),
                    infoframe_to_protocol(meta.display_primaries[1].1),
                    infoframe_to_protocol(meta.display_primaries[2].0),
                    infoframe_to_protocol(meta.display_primaries[2].1),
                    infoframe_to_protocol(meta.white_point.0),
                    infoframe_to_protocol(meta.white_point.1),
                ],
                min_luminance: u32::from(meta.min_display_mastering_luminance),
                max_luminance: u32::from(meta.max_display_mastering_luminance),
                max_cll: u32::from(meta.max_cll),
                max_fall: u32::from(meta.max_fall),
            });
            Some(ColorDescription::Hdr10 {
                primaries,
                mastering,
            })
        }
        Colorspace::Passthru | Colorspace::Linear | Colorspace::Srgb => None,
    }
}

/// BT.2020 primaries widened (or narrowed) by a saturation factor.
fn scaled_bt2020_primaries(s: f32) -> [i32; 8] {
    [
        0.708 * s,
        0.292 / s,
        0.170 / s,
        0.797 * s,
        0.131 / s,
        0.046 / s,
        0.3127,
        0.3290,
    ]
    .map(|v| (v * PRIMARY_SCALE) as i32)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrogPrimaries {
    Undefined,
    Rec709,
    Rec2020,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrogTransferFunction {
    Undefined,
    Gamma22,
    St2084Pq,
    ScrgbLinear,
}

pub fn frog_color(colorspace: Colorspace) -> (FrogPrimaries, FrogTransferFunction) {
    match colorspace {
        Colorspace::Passthru => (FrogPrimaries::Undefined, FrogTransferFunction::Undefined),
        Colorspace::Linear | Colorspace::Srgb => {
            (FrogPrimaries::Rec709, FrogTransferFunction::Gamma22)
        }
        Colorspace::Hdr10Pq => (FrogPrimaries::Rec2020, FrogTransferFunction::St2084Pq),
        Colorspace::Scrgb => (FrogPrimaries::Rec709, FrogTransferFunction::ScrgbLinear),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Eotf {
    #[default]
    Gamma22,
    Pq,
}

/// HDR capabilities of the connector as learned from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HdrInfo {
    pub always_patch_edid: bool,
    pub expose_hdr_support: bool,
    pub output_encoding_eotf: Eotf,
    pub max_cll: u16,
    pub max_fall: u16,
    pub min_cll: u16,
}

impl Default for HdrInfo {
    fn default() -> Self {
        Self {
            always_patch_edid: true,
            expose_hdr_support: false,
            output_encoding_eotf: Eotf::Gamma22,
            max_cll: 0,
            max_fall: 0,
            min_cll: 0,
        }
    }
}

impl HdrInfo {
    pub fn is_hdr10(&self) -> bool {
        self.expose_hdr_support && self.output_encoding_eotf == Eotf::Pq
    }

    /// Record the host's preferred transfer function.
    pub fn set_preferred_transfer(&mut self, is_pq: bool, hdr_enabled: bool) {
        self.expose_hdr_support = hdr_enabled && is_pq;
        self.output_encoding_eotf = if is_pq { Eotf::Pq } else { Eotf::Gamma22 };
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayColorimetry {
    pub primaries: [(f32, f32); 3],
    pub white: (f32, f32),
}

impl DisplayColorimetry {
    pub const BT709: Self = Self {
        primaries: [(0.64, 0.33), (0.30, 0.60), (0.15, 0.06)],
        white: (0.3127, 0.3290),
    };

    pub const BT2020: Self = Self {
        primaries: [(0.708, 0.292), (0.170, 0.797), (0.131, 0.046)],
        white: (0.3127, 0.3290),
    };

    /// From integer chromaticities and the unit they are expressed in.
    pub fn from_scaled(v: [u32; 8], unit: f32) -> Self {
        let c = |i: usize| v[i] as f32 * unit;
        Self {
            primaries: [(c(0), c(1)), (c(2), c(3)), (c(4), c(5))],
            white: (c(6), c(7)),
        }
    }
}

impl Default for DisplayColorimetry {
    fn default() -> Self {
        Self::BT709
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NativeColorimetry {
    pub display: DisplayColorimetry,
    pub display_eotf: Eotf,
    pub output_encoding: DisplayColorimetry,
    pub output_encoding_eotf: Eotf,
}

pub fn native_colorimetry(
    hdr10: bool,
    display: DisplayColorimetry,
    hdr_info: &HdrInfo,
) -> NativeColorimetry {
    let (output_encoding, output_encoding_eotf) = if hdr10 && hdr_info.is_hdr10() {
        (DisplayColorimetry::BT2020, hdr_info.output_encoding_eotf)
    } else {
        (display, Eotf::Gamma22)
    };
    NativeColorimetry {
        display,
        display_eotf: Eotf::Gamma22,
        output_encoding,
        output_encoding_eotf,
    }
}

/// Preferred metadata as sent by the frog color management protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrogPreferredMetadata {
    pub transfer_function: FrogTransferFunction,
    /// r, g, b, white chromaticities in units of 0.00002.
    pub primaries: [u16; 8],
    pub max_luminance: u16,
    pub min_luminance: u16,
    pub max_full_frame_luminance: u16,
}

pub const FROG_CHROMATICITY_UNIT: f32 = 0.00002;
