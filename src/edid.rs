//! Synthetic EDID for the virtual display.
//!
//! Nested clients learn the display mode and HDR capabilities from an EDID.
//! The base block describes a single preferred mode at the nested resolution;
//! the patched EDID adds a CTA-861 extension with colorimetry and HDR static
//! metadata blocks when HDR is exposed.

use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{debug, warn};

use crate::color::HdrInfo;

const EDID_BLOCK_SIZE: usize = 128;
const EDID_HEADER: [u8; 8] = [0x00, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x00];
const MONITOR_NAME: &[u8] = b"Gamescope";

const H_BLANK: u32 = 160;
const H_FRONT_PORCH: u32 = 48;
const H_SYNC: u32 = 32;
const V_BLANK: u32 = 30;
const V_FRONT_PORCH: u32 = 3;
const V_SYNC: u32 = 5;
const REFRESH_HZ: u32 = 60;

/// Compressed three letter PNP id.
fn manufacturer_id(code: &[u8; 3]) -> [u8; 2] {
    let c = |i: usize| u16::from(code[i] - b'A' + 1);
    let packed = (c(0) << 10) | (c(1) << 5) | c(2);
    packed.to_be_bytes()
}

fn checksum(block: &mut [u8]) {
    let sum = block[..EDID_BLOCK_SIZE - 1]
        .iter()
        .fold(0u8, |acc, b| acc.wrapping_add(*b));
    block[EDID_BLOCK_SIZE - 1] = 0u8.wrapping_sub(sum);
}

fn detailed_timing(width: u32, height: u32) -> [u8; 18] {
    let clock_10khz = (width + H_BLANK) * (height + V_BLANK) * REFRESH_HZ / 10_000;
    let clock = (clock_10khz.min(u32::from(u16::MAX)) as u16).to_le_bytes();
    let mut d = [0u8; 18];
    d[0] = clock[0];
    d[1] = clock[1];
    d[2] = (width & 0xff) as u8;
    d[3] = (H_BLANK & 0xff) as u8;
    d[4] = ((((width >> 8) & 0xf) << 4) | ((H_BLANK >> 8) & 0xf)) as u8;
    d[5] = (height & 0xff) as u8;
    d[6] = (V_BLANK & 0xff) as u8;
    d[7] = ((((height >> 8) & 0xf) << 4) | ((V_BLANK >> 8) & 0xf)) as u8;
    d[8] = H_FRONT_PORCH as u8;
    d[9] = H_SYNC as u8;
    d[10] = (((V_FRONT_PORCH & 0xf) << 4) | (V_SYNC & 0xf)) as u8;
    d[11] = 0;
    // Image size in mm, assume ~96 dpi.
    let (w_mm, h_mm) = (width * 254 / 960, height * 254 / 960);
    d[12] = (w_mm & 0xff) as u8;
    d[13] = (h_mm & 0xff) as u8;
    d[14] = ((((w_mm >> 8) & 0xf) << 4) | ((h_mm >> 8) & 0xf)) as u8;
    // Digital separate sync, both polarities positive.
    d[17] = 0x1e;
    d
}

fn monitor_name_descriptor() -> [u8; 18] {
    let mut d = [0u8; 18];
    d[3] = 0xfc;
    let name = &mut d[5..];
    name.fill(b' ');
    name[..MONITOR_NAME.len()].copy_from_slice(MONITOR_NAME);
    name[MONITOR_NAME.len()] = b'\n';
    d
}

/// Base EDID block advertising one preferred mode.
pub fn generate(width: u32, height: u32) -> Vec<u8> {
    let mut edid = vec![0u8; EDID_BLOCK_SIZE];
    edid[..8].copy_from_slice(&EDID_HEADER);
    edid[8..10].copy_from_slice(&manufacturer_id(b"GSC"));
    // Product code and serial.
    edid[10..12].copy_from_slice(&0x1234u16.to_le_bytes());
    edid[16] = 1; // week
    edid[17] = 34; // 1990 + 34
    edid[18] = 1; // version 1.4
    edid[19] = 4;
    edid[20] = 0xa5; // digital, 8 bpc, DisplayPort
    edid[24] = 0x06; // RGB 4:4:4, preferred timing is native
    // BT.709 chromaticity.
    edid[25..35].copy_from_slice(&[0xee, 0x91, 0xa3, 0x54, 0x4c, 0x99, 0x26, 0x0f, 0x50, 0x54]);
    // No standard timings.
    for slot in edid[38..54].chunks_mut(2) {
        slot.copy_from_slice(&[0x01, 0x01]);
    }
    edid[54..72].copy_from_slice(&detailed_timing(width, height));
    edid[72..90].copy_from_slice(&monitor_name_descriptor());
    // Two dummy descriptors.
    edid[93] = 0x10;
    edid[111] = 0x10;
    checksum(&mut edid);
    edid
}

/// Encode a luminance for the HDR static metadata block (CTA-861.3).
fn encode_max_luminance(nits: u16) -> u8 {
    if nits == 0 {
        return 0;
    }
    let cv = 32.0 * (f64::from(nits) / 50.0).log2();
    cv.round().clamp(0.0, 255.0) as u8
}

/// Extend a base EDID with a CTA-861 block describing HDR10 support.
pub fn patch(base: &[u8], hdr: &HdrInfo) -> Vec<u8> {
    let mut edid = base[..EDID_BLOCK_SIZE.min(base.len())].to_vec();
    edid.resize(EDID_BLOCK_SIZE, 0);
    if !hdr.expose_hdr_support {
        edid[126] = 0;
        checksum(&mut edid);
        return edid;
    }

    let mut cta = vec![0u8; EDID_BLOCK_SIZE];
    cta[0] = 0x02;
    cta[1] = 0x03;
    let mut blocks = Vec::new();
    // Colorimetry data block: BT.2020 RGB and YCC.
    blocks.extend_from_slice(&[0xe3, 0x05, 0xc0, 0x00]);
    // HDR static metadata block: SDR gamma and ST2084, type 1 descriptor.
    let max = encode_max_luminance(hdr.max_cll);
    let fall = encode_max_luminance(hdr.max_fall);
    blocks.extend_from_slice(&[0xe6, 0x06, 0x05, 0x01, max, fall, 0x00]);
    cta[4..4 + blocks.len()].copy_from_slice(&blocks);
    cta[2] = (4 + blocks.len()) as u8;
    checksum(&mut cta);

    edid[126] = 1;
    checksum(&mut edid);
    edid.extend_from_slice(&cta);
    edid
}

/// Publishes the patched EDID of the current connector to nested clients.
pub trait EdidWriter: Send + Sync {
    fn write_patched(&self, edid: &[u8], hdr: &HdrInfo);
}

/// Writes the patched EDID to a file and sets `DXVK_HDR` for clients.
#[derive(Debug, Clone, Default)]
pub struct FileEdidWriter {
    path: Option<PathBuf>,
    hdr_enabled: bool,
}

impl FileEdidWriter {
    pub fn new(path: Option<PathBuf>, hdr_enabled: bool) -> Self {
        Self { path, hdr_enabled }
    }
}

impl EdidWriter for FileEdidWriter {
    fn write_patched(&self, edid: &[u8], hdr: &HdrInfo) {
        if let Err(err) = write_patched(self.path.as_deref(), edid, hdr, self.hdr_enabled) {
            warn!("Failed to write patched EDID: {:?}", err);
        }
    }
}

/// Publish the patched EDID to nested clients.
pub fn write_patched(
    path: Option<&Path>,
    edid: &[u8],
    hdr: &HdrInfo,
    hdr_enabled: bool,
) -> anyhow::Result<()> {
    let expose = hdr_enabled && hdr.expose_hdr_support;
    std::env::set_var("DXVK_HDR", if expose { "1" } else { "0" });
    let Some(path) = path else {
        return Ok(());
    };
    let patched = patch(edid, hdr);
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, &patched)
        .with_context(|| format!("failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path).with_context(|| format!("failed to move EDID to {}", path.display()))?;
    debug!("Wrote patched EDID ({} bytes) to {}", patched.len(), path.display());
    Ok(())
}
