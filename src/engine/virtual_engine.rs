// In-process SDLS engine
// Keeps one in-memory security association per managed channel and protects
// TC frames with AES-256-GCM. Remote backends are emulated locally.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use super::crypto::{self, FECF_LEN, TAG_LEN};
use super::frame::{PRIMARY_HEADER_LEN, SEGMENT_HEADER_LEN, TcPrimaryHeader};
use super::replay::ReplayWindow;
use super::{EngineStatus, ProcessedFrame, SecurityEngine};
use crate::config::{CryptoBackend, EngineFlags, ManagedChannel, RunConfiguration, SaBackend};
use crate::types::SecurityLayer;

/// SPI (2 octets) followed by ARSN (4 octets)
pub const SECURITY_HEADER_LEN: usize = 6;

/// Largest forward ARSN jump accepted on processing
pub const DEFAULT_ARSN_WINDOW: u32 = 5;

/// Key derivation seed used when none is given
pub const DEFAULT_SEED: u64 = 0x5D15;

#[derive(Debug, Clone)]
struct SecurityAssociation {
    spi: u16,
    channel: ManagedChannel,
    key: [u8; 32],
    /// Non-transmitted leading part of the IV
    iv_prefix: u64,
    /// Last ARSN used on apply
    tx_arsn: u32,
    replay: ReplayWindow,
}

impl SecurityAssociation {
    fn header_len(&self) -> usize {
        PRIMARY_HEADER_LEN
            + if self.channel.has_segmentation_header {
                SEGMENT_HEADER_LEN
            } else {
                0
            }
    }

    fn trailer_len(&self) -> usize {
        TAG_LEN + if self.channel.has_fecf { FECF_LEN } else { 0 }
    }

    fn next_arsn(&mut self, increment_iv: bool) -> u32 {
        match self.tx_arsn.checked_add(1) {
            Some(next) => self.tx_arsn = next,
            None => {
                if increment_iv {
                    self.iv_prefix = self.iv_prefix.wrapping_add(1);
                }
                warn!(spi = self.spi, "ARSN rolled over");
                self.tx_arsn = 0;
            }
        }
        self.tx_arsn
    }
}

/// Self-contained engine used by the drivers and tests
pub struct VirtualSdlsEngine {
    seed: u64,
    config: Option<RunConfiguration>,
    associations: Vec<SecurityAssociation>,
    arsn_window: u32,
    frames_applied: u64,
    frames_processed: u64,
}

impl VirtualSdlsEngine {
    /// Create an engine whose SA keys derive from `seed`
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            config: None,
            associations: Vec::new(),
            arsn_window: DEFAULT_ARSN_WINDOW,
            frames_applied: 0,
            frames_processed: 0,
        }
    }

    pub fn with_arsn_window(mut self, window: u32) -> Self {
        self.arsn_window = window;
        self
    }

    pub fn is_initialized(&self) -> bool {
        self.config.is_some()
    }

    pub fn frames_applied(&self) -> u64 {
        self.frames_applied
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    /// SPI assigned to a managed channel
    pub fn spi_for(&self, tfvn: u8, scid: u16, vcid: u8) -> Option<u16> {
        self.find_sa(tfvn, scid, vcid).map(|idx| self.associations[idx].spi)
    }

    fn flags(&self) -> Result<EngineFlags, EngineStatus> {
        self.config
            .as_ref()
            .map(|c| c.flags().clone())
            .ok_or(EngineStatus::NOT_INITIALIZED)
    }

    fn find_sa(&self, tfvn: u8, scid: u16, vcid: u8) -> Option<usize> {
        self.associations
            .iter()
            .position(|sa| sa.channel.matches(tfvn, scid, vcid))
    }

    fn create_associations(&mut self, config: &RunConfiguration) -> Result<(), EngineStatus> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut master = [0u8; 32];
        rng.fill(&mut master);

        self.associations.clear();
        for (idx, channel) in config.channels().iter().enumerate() {
            let context = [
                channel.tfvn,
                (channel.scid >> 8) as u8,
                (channel.scid & 0xFF) as u8,
                channel.vcid,
            ];
            let key = crypto::derive_material(&master, b"sa-key", &context)?;
            let iv = crypto::derive_material(&master, b"sa-iv", &context)?;
            let mut iv_prefix = [0u8; 8];
            iv_prefix.copy_from_slice(&iv[..8]);

            let spi = u16::try_from(idx + 1).map_err(|_| EngineStatus::INTERNAL_ERROR)?;
            debug!(spi, channel = %channel, "security association keyed");
            self.associations.push(SecurityAssociation {
                spi,
                channel: *channel,
                key,
                iv_prefix: u64::from_be_bytes(iv_prefix),
                tx_arsn: 0,
                replay: ReplayWindow::new(self.arsn_window),
            });
        }
        Ok(())
    }
}

impl Default for VirtualSdlsEngine {
    fn default() -> Self {
        Self::new(DEFAULT_SEED)
    }
}

impl SecurityEngine for VirtualSdlsEngine {
    fn initialize(&mut self, config: &RunConfiguration) -> Result<(), EngineStatus> {
        let flags = config.flags();
        if flags.sa_backend == SaBackend::MariaDb {
            info!(
                host = config.sa_database().host.as_deref().unwrap_or("-"),
                database = %config.sa_database().database,
                "MariaDB SA backend emulated in-process"
            );
        }
        if flags.crypto_backend == CryptoBackend::KmcCrypto {
            info!(
                host = config.crypto_service().host.as_deref().unwrap_or("-"),
                port = config.crypto_service().port,
                "KMC crypto service emulated in-process"
            );
        }
        if let Some(cam) = config.cam() {
            info!(login = cam.login_method.as_str(), "CAM authentication emulated in-process");
        }
        debug!(
            ignore_sa_state = flags.ignore_sa_state,
            process_sdls_pdus = flags.process_sdls_pdus,
            has_pus_header = flags.has_pus_header,
            unique_sa_per_mapid = flags.unique_sa_per_mapid,
            "engine flags"
        );

        self.create_associations(config)?;
        self.config = Some(config.clone());
        self.frames_applied = 0;
        self.frames_processed = 0;
        info!(
            associations = self.associations.len(),
            "virtual SDLS engine initialized"
        );
        Ok(())
    }

    fn apply_security(
        &mut self,
        layer: SecurityLayer,
        frame: &[u8],
    ) -> Result<Vec<u8>, EngineStatus> {
        let flags = self.flags()?;
        if layer != SecurityLayer::Telecommand {
            return Err(EngineStatus::LAYER_UNSUPPORTED);
        }

        let header = TcPrimaryHeader::parse(frame)?;
        if header.frame_length != frame.len() {
            debug!(
                declared = header.frame_length,
                actual = frame.len(),
                "frame length field mismatch"
            );
            return Err(EngineStatus::INVALID_FRAME_LENGTH);
        }
        let idx = self
            .find_sa(header.tfvn, header.scid, header.vcid)
            .ok_or(EngineStatus::UNKNOWN_CHANNEL)?;
        let sa = &mut self.associations[idx];

        let hdr_len = sa.header_len();
        if frame.len() < hdr_len {
            return Err(EngineStatus::INVALID_FRAME_LENGTH);
        }
        let payload = &frame[hdr_len..];
        let out_len = hdr_len + SECURITY_HEADER_LEN + payload.len() + sa.trailer_len();
        if out_len > sa.channel.max_frame_size as usize {
            return Err(EngineStatus::FRAME_TOO_LARGE);
        }

        let arsn = sa.next_arsn(flags.increment_nontransmitted_iv);
        let nonce = crypto::build_nonce(sa.iv_prefix, arsn);

        let secured_header = TcPrimaryHeader {
            frame_length: out_len,
            ..header
        };
        let mut out = Vec::with_capacity(out_len);
        out.extend_from_slice(&secured_header.encode());
        out.extend_from_slice(&frame[PRIMARY_HEADER_LEN..hdr_len]);
        out.extend_from_slice(&sa.spi.to_be_bytes());
        out.extend_from_slice(&arsn.to_be_bytes());
        out.extend_from_slice(payload);

        let (aad, body) = out.split_at_mut(hdr_len + SECURITY_HEADER_LEN);
        let tag = crypto::seal_in_place(&sa.key, &nonce, aad, body)?;
        out.extend_from_slice(&tag);

        if sa.channel.has_fecf {
            let fecf = if flags.create_fecf {
                crypto::calculate_fecf(&out)
            } else {
                0
            };
            out.extend_from_slice(&fecf.to_be_bytes());
        }

        self.frames_applied += 1;
        debug!(spi = sa.spi, arsn, len = out.len(), "applied TC security");
        debug!(frame = %hex::encode_upper(&out), "secured frame");
        Ok(out)
    }

    fn process_security(
        &mut self,
        layer: SecurityLayer,
        frame: &mut [u8],
    ) -> Result<ProcessedFrame, EngineStatus> {
        let flags = self.flags()?;
        if layer != SecurityLayer::Telecommand {
            return Err(EngineStatus::LAYER_UNSUPPORTED);
        }

        let header = TcPrimaryHeader::parse(frame)?;
        if header.frame_length != frame.len() {
            return Err(EngineStatus::INVALID_FRAME_LENGTH);
        }
        if header.vcid & !flags.vcid_bitmask != 0 {
            return Err(EngineStatus::VCID_NOT_ADMITTED);
        }
        let idx = self
            .find_sa(header.tfvn, header.scid, header.vcid)
            .ok_or(EngineStatus::UNKNOWN_CHANNEL)?;
        let sa = &mut self.associations[idx];

        let hdr_len = sa.header_len();
        let fecf_len = if sa.channel.has_fecf { FECF_LEN } else { 0 };
        if frame.len() < hdr_len + SECURITY_HEADER_LEN + sa.trailer_len() {
            return Err(EngineStatus::INVALID_FRAME_LENGTH);
        }
        let end = frame.len() - fecf_len;

        if sa.channel.has_fecf && flags.check_fecf {
            let received = u16::from_be_bytes([frame[end], frame[end + 1]]);
            if !crypto::verify_fecf(&frame[..end], received) {
                return Err(EngineStatus::FECF_MISMATCH);
            }
        }

        let spi = u16::from_be_bytes([frame[hdr_len], frame[hdr_len + 1]]);
        if spi != sa.spi {
            return Err(EngineStatus::INVALID_SPI);
        }
        let arsn = u32::from_be_bytes([
            frame[hdr_len + 2],
            frame[hdr_len + 3],
            frame[hdr_len + 4],
            frame[hdr_len + 5],
        ]);

        let tag_start = end - TAG_LEN;
        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(&frame[tag_start..end]);

        let nonce = crypto::build_nonce(sa.iv_prefix, arsn);
        let (aad, body) = frame[..tag_start].split_at_mut(hdr_len + SECURITY_HEADER_LEN);
        crypto::open_in_place(&sa.key, &nonce, aad, body, &tag)?;

        if !flags.ignore_anti_replay
            && let Err(e) = sa.replay.validate(arsn)
        {
            warn!(spi, "{}", e);
            return Err(EngineStatus::ANTI_REPLAY_VIOLATION);
        }
        sa.replay.accept(arsn);

        self.frames_processed += 1;
        debug!(spi, arsn, len = body.len(), "processed TC security");
        Ok(ProcessedFrame {
            spi,
            sequence_number: arsn,
            payload: body.to_vec(),
        })
    }

    fn shutdown(&mut self) {
        if self.config.take().is_some() {
            info!(
                applied = self.frames_applied,
                processed = self.frames_processed,
                "virtual SDLS engine shut down"
            );
        }
        self.associations.clear();
    }
}
