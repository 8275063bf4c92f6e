//! Run configuration consumed once at engine initialization

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// Private modules
mod builder;

// Public modules
pub mod properties;

pub use builder::RunConfigurationBuilder;

pub const DEFAULT_CA_BUNDLE: &str = "/etc/pki/tls/certs/ammos-ca-bundle.crt";
pub const DEFAULT_CLIENT_CERT: &str = "/ammos/kmc-test/tls/ammos-client-cert.pem";
pub const DEFAULT_CLIENT_KEY: &str = "/ammos/kmc-test/tls/ammos-client-key.pem";

/// Largest TC transfer frame the engine accepts
pub const MAX_TC_FRAME_SIZE: u16 = 1024;

/// Security association storage backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaBackend {
    MariaDb,
    InMemory,
}

impl SaBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaBackend::MariaDb => "MARIADB",
            SaBackend::InMemory => "INMEMORY",
        }
    }
}

impl FromStr for SaBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mariadb" => Ok(SaBackend::MariaDb),
            "inmemory" => Ok(SaBackend::InMemory),
            other => Err(format!("unknown SA backend '{}'", other)),
        }
    }
}

/// Cryptography provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CryptoBackend {
    /// Remote KMC crypto service
    KmcCrypto,
    /// Local library
    Libgcrypt,
}

impl CryptoBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            CryptoBackend::KmcCrypto => "KMCCRYPTO",
            CryptoBackend::Libgcrypt => "LIBGCRYPT",
        }
    }
}

impl FromStr for CryptoBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "kmccryptoservice" | "kmccrypto" => Ok(CryptoBackend::KmcCrypto),
            "libgcrypt" => Ok(CryptoBackend::Libgcrypt),
            other => Err(format!("unknown crypto backend '{}'", other)),
        }
    }
}

/// Engine-wide behavior flags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineFlags {
    pub sa_backend: SaBackend,
    pub crypto_backend: CryptoBackend,
    /// Compute the FECF on applied frames
    pub create_fecf: bool,
    /// Treat embedded SDLS PDUs as extended procedures
    pub process_sdls_pdus: bool,
    pub has_pus_header: bool,
    pub ignore_sa_state: bool,
    pub ignore_anti_replay: bool,
    pub unique_sa_per_mapid: bool,
    /// Validate the FECF on processed frames
    pub check_fecf: bool,
    /// Mask applied to the 6-bit VCID. Frames with a VCID bit outside the
    /// mask are not admitted.
    pub vcid_bitmask: u8,
    pub increment_nontransmitted_iv: bool,
}

impl Default for EngineFlags {
    fn default() -> Self {
        Self {
            sa_backend: SaBackend::MariaDb,
            crypto_backend: CryptoBackend::KmcCrypto,
            create_fecf: false,
            process_sdls_pdus: false,
            has_pus_header: false,
            ignore_sa_state: false,
            ignore_anti_replay: true,
            unique_sa_per_mapid: false,
            check_fecf: false,
            vcid_bitmask: 0x3F,
            increment_nontransmitted_iv: true,
        }
    }
}

/// Connection parameters for the persistent SA database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaDatabaseParameters {
    pub host: Option<String>,
    pub database: String,
    pub port: u16,
    pub require_secure_transport: bool,
    pub verify_server: bool,
    pub tls_ca: Option<String>,
    pub tls_ca_path: Option<String>,
    pub mtls_cert: Option<String>,
    pub mtls_key: Option<String>,
    pub mtls_client_key_password: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for SaDatabaseParameters {
    fn default() -> Self {
        Self {
            host: None,
            database: "sadb".to_string(),
            port: 3306,
            require_secure_transport: true,
            verify_server: true,
            tls_ca: Some(DEFAULT_CA_BUNDLE.to_string()),
            tls_ca_path: None,
            mtls_cert: Some(DEFAULT_CLIENT_CERT.to_string()),
            mtls_key: Some(DEFAULT_CLIENT_KEY.to_string()),
            mtls_client_key_password: None,
            username: None,
            password: None,
        }
    }
}

/// Connection parameters for the remote crypto service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CryptoServiceParameters {
    pub protocol: String,
    pub host: Option<String>,
    pub port: u16,
    pub app: String,
    pub tls_ca_bundle: Option<String>,
    pub tls_ca_path: Option<String>,
    pub ignore_hostname_validation: bool,
    pub mtls_client_cert: Option<String>,
    /// Certificate encoding, `PEM` or `DER`
    pub mtls_client_cert_type: String,
    pub mtls_client_key: Option<String>,
    pub mtls_client_key_password: Option<String>,
    pub mtls_issuer_cert: Option<String>,
}

impl Default for CryptoServiceParameters {
    fn default() -> Self {
        Self {
            protocol: "https".to_string(),
            host: None,
            port: 8443,
            app: "crypto-service".to_string(),
            tls_ca_bundle: Some(DEFAULT_CA_BUNDLE.to_string()),
            tls_ca_path: None,
            ignore_hostname_validation: false,
            mtls_client_cert: Some(DEFAULT_CLIENT_CERT.to_string()),
            mtls_client_cert_type: "PEM".to_string(),
            mtls_client_key: Some(DEFAULT_CLIENT_KEY.to_string()),
            mtls_client_key_password: None,
            mtls_issuer_cert: None,
        }
    }
}

/// Global virtual channel identity plus its framing rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ManagedChannel {
    /// Transfer frame version number (2 bits)
    pub tfvn: u8,
    /// Spacecraft id (10 bits)
    pub scid: u16,
    /// Virtual channel id (6 bits)
    pub vcid: u8,
    pub has_fecf: bool,
    pub has_segmentation_header: bool,
    pub max_frame_size: u16,
}

impl ManagedChannel {
    pub fn new(tfvn: u8, scid: u16, vcid: u8) -> Self {
        Self {
            tfvn,
            scid,
            vcid,
            ..Self::default()
        }
    }

    /// True if this channel addresses the given GVCID
    pub fn matches(&self, tfvn: u8, scid: u16, vcid: u8) -> bool {
        self.tfvn == tfvn && self.scid == scid && self.vcid == vcid
    }
}

impl Default for ManagedChannel {
    fn default() -> Self {
        Self {
            tfvn: 0,
            scid: 0x002C,
            vcid: 1,
            has_fecf: true,
            has_segmentation_header: false,
            max_frame_size: MAX_TC_FRAME_SIZE,
        }
    }
}

impl fmt::Display for ManagedChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tfvn={} scid=0x{:04x} vcid={}",
            self.tfvn, self.scid, self.vcid
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CamLoginMethod {
    None,
    Kerberos,
    KeytabFile,
}

impl CamLoginMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CamLoginMethod::None => "NONE",
            CamLoginMethod::Kerberos => "KERBEROS",
            CamLoginMethod::KeytabFile => "KEYTAB_FILE",
        }
    }
}

impl FromStr for CamLoginMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "0" => Ok(CamLoginMethod::None),
            "kerberos" | "1" => Ok(CamLoginMethod::Kerberos),
            "keytab_file" | "keytab" | "2" => Ok(CamLoginMethod::KeytabFile),
            other => Err(format!("unknown CAM login method '{}'", other)),
        }
    }
}

/// Common access manager authentication settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CamParameters {
    pub enabled: bool,
    pub cookie_file: Option<String>,
    pub keytab_file: Option<String>,
    pub login_method: CamLoginMethod,
    pub access_manager_uri: Option<String>,
    pub username: Option<String>,
    pub cam_home: Option<String>,
}

impl Default for CamParameters {
    fn default() -> Self {
        Self {
            enabled: false,
            cookie_file: None,
            keytab_file: None,
            login_method: CamLoginMethod::None,
            access_manager_uri: None,
            username: None,
            cam_home: None,
        }
    }
}

/// Fully resolved, validated settings for one engine lifetime
///
/// Only [`RunConfigurationBuilder::build`] and the presets construct one, so
/// every instance has passed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfiguration {
    flags: EngineFlags,
    sa_database: SaDatabaseParameters,
    crypto_service: CryptoServiceParameters,
    channels: Vec<ManagedChannel>,
    cam: Option<CamParameters>,
}

impl RunConfiguration {
    pub fn builder() -> RunConfigurationBuilder {
        RunConfigurationBuilder::new()
    }

    /// In-memory SAs, local crypto, the default managed channel
    pub fn unit_test() -> Self {
        Self {
            flags: EngineFlags {
                sa_backend: SaBackend::InMemory,
                crypto_backend: CryptoBackend::Libgcrypt,
                ..EngineFlags::default()
            },
            sa_database: SaDatabaseParameters::default(),
            crypto_service: CryptoServiceParameters::default(),
            channels: vec![ManagedChannel::default()],
            cam: None,
        }
    }

    pub fn flags(&self) -> &EngineFlags {
        &self.flags
    }

    pub fn sa_database(&self) -> &SaDatabaseParameters {
        &self.sa_database
    }

    pub fn crypto_service(&self) -> &CryptoServiceParameters {
        &self.crypto_service
    }

    pub fn channels(&self) -> &[ManagedChannel] {
        &self.channels
    }

    /// CAM settings, present only when CAM is enabled
    pub fn cam(&self) -> Option<&CamParameters> {
        self.cam.as_ref()
    }

    pub fn find_channel(&self, tfvn: u8, scid: u16, vcid: u8) -> Option<&ManagedChannel> {
        self.channels.iter().find(|c| c.matches(tfvn, scid, vcid))
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
