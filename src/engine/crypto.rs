use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce, Tag};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::EngineStatus;

pub const TAG_LEN: usize = 16;
pub const FECF_LEN: usize = 2;

const FECF_CRC: crc::Crc<u16> = crc::Crc::<u16>::new(&crc::CRC_16_IBM_3740);

/// HMAC-SHA256 over a label and a channel identity, used to derive SA material
pub fn derive_material(
    master: &[u8; 32],
    label: &[u8],
    context: &[u8],
) -> Result<[u8; 32], EngineStatus> {
    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(master)
        .map_err(|_| EngineStatus::INTERNAL_ERROR)?;
    mac.update(label);
    mac.update(context);

    let mut output = [0u8; 32];
    output.copy_from_slice(&mac.finalize().into_bytes());
    Ok(output)
}

/// 96-bit GCM nonce: 8 non-transmitted bytes followed by the ARSN
pub fn build_nonce(iv_prefix: u64, arsn: u32) -> [u8; 12] {
    let mut nonce = [0u8; 12];
    nonce[..8].copy_from_slice(&iv_prefix.to_be_bytes());
    nonce[8..].copy_from_slice(&arsn.to_be_bytes());
    nonce
}

/// Encrypt `buffer` in place, returning the detached tag
pub fn seal_in_place(
    key: &[u8; 32],
    nonce: &[u8; 12],
    aad: &[u8],
    buffer: &mut [u8],
) -> Result<[u8; TAG_LEN], EngineStatus> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| EngineStatus::INTERNAL_ERROR)?;
    let tag = cipher
        .encrypt_in_place_detached(Nonce::from_slice(nonce), aad, buffer)
        .map_err(|_| EngineStatus::INTERNAL_ERROR)?;

    let mut output = [0u8; TAG_LEN];
    output.copy_from_slice(&tag);
    Ok(output)
}

/// Authenticate and decrypt `buffer` in place
pub fn open_in_place(
    key: &[u8; 32],
    nonce: &[u8; 12],
    aad: &[u8],
    buffer: &mut [u8],
    tag: &[u8],
) -> Result<(), EngineStatus> {
    if tag.len() != TAG_LEN {
        return Err(EngineStatus::INVALID_FRAME_LENGTH);
    }
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| EngineStatus::INTERNAL_ERROR)?;
    cipher
        .decrypt_in_place_detached(Nonce::from_slice(nonce), aad, buffer, Tag::from_slice(tag))
        .map_err(|_| EngineStatus::MAC_VALIDATION_ERROR)
}

/// Frame error control field, CRC-16/CCITT-FALSE
pub fn calculate_fecf(data: &[u8]) -> u16 {
    FECF_CRC.checksum(data)
}

pub fn verify_fecf(data: &[u8], expected: u16) -> bool {
    calculate_fecf(data) == expected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fecf_check_value() {
        // Standard check input for CRC-16/CCITT-FALSE
        assert_eq!(calculate_fecf(b"123456789"), 0x29B1);
        assert!(verify_fecf(b"123456789", 0x29B1));
        assert!(!verify_fecf(b"123456780", 0x29B1));
    }

    #[test]
    fn test_seal_and_open() {
        let key = [7u8; 32];
        let nonce = build_nonce(0, 1);
        let mut buffer = b"payload bytes".to_vec();

        let tag = seal_in_place(&key, &nonce, b"header", &mut buffer).unwrap();
        assert_ne!(buffer, b"payload bytes");

        open_in_place(&key, &nonce, b"header", &mut buffer, &tag).unwrap();
        assert_eq!(buffer, b"payload bytes");
    }

    #[test]
    fn test_open_rejects_modified_aad() {
        let key = [7u8; 32];
        let nonce = build_nonce(0, 1);
        let mut buffer = b"payload bytes".to_vec();
        let tag = seal_in_place(&key, &nonce, b"header", &mut buffer).unwrap();

        assert_eq!(
            open_in_place(&key, &nonce, b"HEADER", &mut buffer, &tag),
            Err(EngineStatus::MAC_VALIDATION_ERROR)
        );
    }

    #[test]
    fn test_derived_material_depends_on_context() {
        let master = [1u8; 32];
        let a = derive_material(&master, b"sa-key", &[0, 0, 44, 1]).unwrap();
        let b = derive_material(&master, b"sa-key", &[0, 0, 44, 2]).unwrap();
        assert_ne!(a, b);
        assert_eq!(a, derive_material(&master, b"sa-key", &[0, 0, 44, 1]).unwrap());
    }
}
