//! H.264 NAL unit helpers: Annex-B splitting and parameter set tracking.

use base64::prelude::{BASE64_STANDARD, Engine as _};

pub const NAL_IDR: u8 = 5;
pub const NAL_SPS: u8 = 7;
pub const NAL_PPS: u8 = 8;

/// `nal_unit_type` of a NAL unit without start code.
pub fn nal_type(nal: &[u8]) -> Option<u8> {
    nal.first().map(|b| b & 0x1f)
}

/// Coded slice NAL types (non-IDR, partitions A–C, IDR).
pub fn is_vcl(nal_type: u8) -> bool {
    (1..=5).contains(&nal_type)
}

/// Iterate the NAL units of an Annex-B byte stream.
///
/// Units are delimited by `00 00 01` or `00 00 00 01`; the start codes are
/// not part of the yielded slices. Bytes before the first start code and
/// empty units are skipped.
pub fn split_annex_b(data: &[u8]) -> NalUnits<'_> {
    NalUnits { data, pos: 0 }
}

pub struct NalUnits<'a> {
    data: &'a [u8],
    pos: usize,
}

/// Offset and length of the first start code at or after `from`.
fn find_start_code(data: &[u8], from: usize) -> Option<(usize, usize)> {
    let mut i = from;
    while i + 3 <= data.len() {
        if data[i] == 0 && data[i + 1] == 0 {
            match data[i + 2] {
                1 => return Some((i, 3)),
                0 if data.get(i + 3) == Some(&1) => return Some((i, 4)),
                _ => {}
            }
        }
        i += 1;
    }
    None
}

impl<'a> Iterator for NalUnits<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        loop {
            let (at, len) = find_start_code(self.data, self.pos)?;
            let start = at + len;
            let end = find_start_code(self.data, start).map_or(self.data.len(), |(next, _)| next);
            self.pos = end;
            if start < end {
                return Some(&self.data[start..end]);
            }
        }
    }
}

/// Latest SPS and PPS seen on a stream, for the SDP `fmtp` line.
#[derive(Debug, Default, Clone)]
pub struct ParameterSets {
    sps: Option<Vec<u8>>,
    pps: Option<Vec<u8>>,
}

impl ParameterSets {
    /// Remember `nal` if it is a new SPS or PPS. Returns whether anything changed.
    pub fn observe(&mut self, nal: &[u8]) -> bool {
        let slot = match nal_type(nal) {
            Some(NAL_SPS) => &mut self.sps,
            Some(NAL_PPS) => &mut self.pps,
            _ => return false,
        };
        if slot.as_deref() == Some(nal) {
            return false;
        }
        *slot = Some(nal.to_vec());
        true
    }

    /// `profile_idc`, constraint flags and `level_idc` from the SPS as hex.
    pub fn profile_level_id(&self) -> Option<String> {
        match self.sps.as_deref()? {
            [_, profile, constraints, level, ..] => {
                Some(format!("{profile:02x}{constraints:02x}{level:02x}"))
            }
            _ => None,
        }
    }

    /// Base64 SPS and PPS joined by a comma. Needs both.
    pub fn sprop_parameter_sets(&self) -> Option<String> {
        let (sps, pps) = (self.sps.as_deref()?, self.pps.as_deref()?);
        Some(format!(
            "{},{}",
            BASE64_STANDARD.encode(sps),
            BASE64_STANDARD.encode(pps)
        ))
    }
}
