//! CCSDS TC transfer frame primary header

use super::EngineStatus;

pub const PRIMARY_HEADER_LEN: usize = 5;
pub const SEGMENT_HEADER_LEN: usize = 1;

/// Decoded 5-byte TC primary header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcPrimaryHeader {
    /// Transfer frame version number (2 bits)
    pub tfvn: u8,
    /// Bypass flag
    pub bypass: bool,
    /// Control command flag
    pub control_command: bool,
    /// Spacecraft id (10 bits)
    pub scid: u16,
    /// Virtual channel id (6 bits)
    pub vcid: u8,
    /// Total frame length in octets
    pub frame_length: usize,
    pub sequence_number: u8,
}

impl TcPrimaryHeader {
    pub fn parse(frame: &[u8]) -> Result<Self, EngineStatus> {
        if frame.len() < PRIMARY_HEADER_LEN {
            return Err(EngineStatus::INVALID_FRAME_LENGTH);
        }
        Ok(Self {
            tfvn: frame[0] >> 6,
            bypass: frame[0] & 0x20 != 0,
            control_command: frame[0] & 0x10 != 0,
            scid: (((frame[0] & 0x03) as u16) << 8) | frame[1] as u16,
            vcid: frame[2] >> 2,
            frame_length: ((((frame[2] & 0x03) as usize) << 8) | frame[3] as usize) + 1,
            sequence_number: frame[4],
        })
    }

    pub fn encode(&self) -> [u8; PRIMARY_HEADER_LEN] {
        let length_field = self.frame_length.saturating_sub(1) & 0x3FF;
        [
            ((self.tfvn & 0x03) << 6)
                | if self.bypass { 0x20 } else { 0 }
                | if self.control_command { 0x10 } else { 0 }
                | ((self.scid >> 8) as u8 & 0x03),
            (self.scid & 0xFF) as u8,
            ((self.vcid & 0x3F) << 2) | ((length_field >> 8) as u8 & 0x03),
            (length_field & 0xFF) as u8,
            self.sequence_number,
        ]
    }
}

/// Assemble a plaintext TC frame, mostly for tests and demos
pub fn build_tc_frame(
    tfvn: u8,
    scid: u16,
    vcid: u8,
    segment_header: Option<u8>,
    payload: &[u8],
) -> Vec<u8> {
    let seg_len = if segment_header.is_some() {
        SEGMENT_HEADER_LEN
    } else {
        0
    };
    let header = TcPrimaryHeader {
        tfvn,
        bypass: true,
        control_command: false,
        scid,
        vcid,
        frame_length: PRIMARY_HEADER_LEN + seg_len + payload.len(),
        sequence_number: 0,
    };
    let mut frame = header.encode().to_vec();
    if let Some(seg) = segment_header {
        frame.push(seg);
    }
    frame.extend_from_slice(payload);
    frame
}
