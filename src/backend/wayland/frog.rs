//! Frog color management, for hosts without `wp_color_manager_v1`.

use wayland_client::WEnum;

use crate::color::{FrogPreferredMetadata, FrogPrimaries, FrogTransferFunction};

pub use generated::{frog_color_managed_surface, frog_color_management_factory_v1};

#[allow(dead_code, non_camel_case_types, non_upper_case_globals, unused_imports)]
mod generated {
    use wayland_client;
    use wayland_client::protocol::*;

    pub mod __interfaces {
        use wayland_backend;
        use wayland_client::protocol::__interfaces::*;
        wayland_scanner::generate_interfaces!("resources/protocols/frog-color-management-v1.xml");
    }
    use self::__interfaces::*;

    wayland_scanner::generate_client_code!("resources/protocols/frog-color-management-v1.xml");
}

use frog_color_managed_surface::{Primaries, TransferFunction};

impl From<FrogPrimaries> for Primaries {
    fn from(primaries: FrogPrimaries) -> Self {
        match primaries {
            FrogPrimaries::Undefined => Primaries::Undefined,
            FrogPrimaries::Rec709 => Primaries::Rec709,
            FrogPrimaries::Rec2020 => Primaries::Rec2020,
        }
    }
}

impl From<FrogTransferFunction> for TransferFunction {
    fn from(transfer: FrogTransferFunction) -> Self {
        match transfer {
            FrogTransferFunction::Undefined => TransferFunction::Undefined,
            FrogTransferFunction::Gamma22 => TransferFunction::Gamma22,
            FrogTransferFunction::St2084Pq => TransferFunction::St2084Pq,
            FrogTransferFunction::ScrgbLinear => TransferFunction::ScrgbLinear,
        }
    }
}

fn host_transfer(transfer: WEnum<TransferFunction>) -> FrogTransferFunction {
    match transfer {
        WEnum::Value(TransferFunction::St2084Pq) => FrogTransferFunction::St2084Pq,
        WEnum::Value(TransferFunction::ScrgbLinear) => FrogTransferFunction::ScrgbLinear,
        WEnum::Value(TransferFunction::Srgb | TransferFunction::Gamma22) => {
            FrogTransferFunction::Gamma22
        }
        _ => FrogTransferFunction::Undefined,
    }
}

fn clamp_u16(value: u32) -> u16 {
    value.min(u32::from(u16::MAX)) as u16
}

/// Build the preferred metadata from a `preferred_metadata` event.
///
/// `primaries` holds r, g, b and white chromaticities, `luminance` the max,
/// min and max full frame luminance, in event order.
pub fn preferred_metadata(
    transfer: WEnum<TransferFunction>,
    primaries: [u32; 8],
    luminance: [u32; 3],
) -> FrogPreferredMetadata {
    FrogPreferredMetadata {
        transfer_function: host_transfer(transfer),
        primaries: primaries.map(clamp_u16),
        max_luminance: clamp_u16(luminance[0]),
        min_luminance: clamp_u16(luminance[1]),
        max_full_frame_luminance: clamp_u16(luminance[2]),
    }
}
