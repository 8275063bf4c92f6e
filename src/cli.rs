//! Command line surface shared by the driver binaries
//!
//! Long option names are spelled with underscores (`--fecf_yes`,
//! `--sql_host`, ...) to stay compatible with existing test scripts. Paired
//! `_yes`/`_no` switches override each other; the last one given wins.

use crate::config::{properties, RunConfiguration, RunConfigurationBuilder};
use crate::config::{CamLoginMethod, CryptoBackend, SaBackend};
use crate::engine::virtual_engine::DEFAULT_SEED;
use crate::error::{HarnessError, Result};
use crate::types::{FrameSource, OperationKind, SequenceStep};
use clap::{ArgAction, ArgGroup, Args, Parser};
use std::path::PathBuf;

/// Integer option with C `strtol(.., 0)` prefixes (`0x2C`, `054`, `44`)
fn c_number<T: TryFrom<u64>>(value: &str) -> std::result::Result<T, String> {
    properties::parse_number("value", value).map_err(|e| match e {
        HarnessError::ConfigurationInvalid { reason, .. } => reason,
        other => other.to_string(),
    })
}

fn toggle(yes: bool, no: bool) -> Option<bool> {
    match (yes, no) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

/// Verbosity and terminal output
#[derive(Args, Debug, Clone, Default)]
pub struct OutputArgs {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Disable ANSI colors in the report
    #[arg(long = "no-color")]
    pub no_color: bool,
}

/// Engine behavior flags
#[derive(Args, Debug, Clone, Default)]
pub struct EngineFlagArgs {
    /// Persistent MariaDB SA store
    #[arg(long, overrides_with = "inmemory")]
    pub mariadb: bool,
    /// In-memory SA store
    #[arg(long, overrides_with = "mariadb")]
    pub inmemory: bool,
    /// Remote KMC crypto service
    #[arg(long, overrides_with = "libgcrypt")]
    pub kmccrypto: bool,
    /// Local crypto library
    #[arg(long, overrides_with = "kmccrypto")]
    pub libgcrypt: bool,

    /// Compute the FECF on applied frames
    #[arg(long = "fecf_yes", overrides_with = "fecf_no")]
    pub fecf_yes: bool,
    #[arg(long = "fecf_no", overrides_with = "fecf_yes")]
    pub fecf_no: bool,

    /// Process embedded SDLS PDUs
    #[arg(long = "sdls_pdu_yes", overrides_with = "sdls_pdu_no")]
    pub sdls_pdu_yes: bool,
    #[arg(long = "sdls_pdu_no", overrides_with = "sdls_pdu_yes")]
    pub sdls_pdu_no: bool,

    #[arg(long = "has_pus_hdr_yes", overrides_with = "has_pus_hdr_no")]
    pub has_pus_hdr_yes: bool,
    #[arg(long = "has_pus_hdr_no", overrides_with = "has_pus_hdr_yes")]
    pub has_pus_hdr_no: bool,

    #[arg(long = "ignore_sa_state_yes", overrides_with = "ignore_sa_state_no")]
    pub ignore_sa_state_yes: bool,
    #[arg(long = "ignore_sa_state_no", overrides_with = "ignore_sa_state_yes")]
    pub ignore_sa_state_no: bool,

    #[arg(long = "ignore_anti_replay_yes", overrides_with = "ignore_anti_replay_no")]
    pub ignore_anti_replay_yes: bool,
    #[arg(long = "ignore_anti_replay_no", overrides_with = "ignore_anti_replay_yes")]
    pub ignore_anti_replay_no: bool,

    #[arg(long = "unique_sa_yes", overrides_with = "unique_sa_no")]
    pub unique_sa_yes: bool,
    #[arg(long = "unique_sa_no", overrides_with = "unique_sa_yes")]
    pub unique_sa_no: bool,

    /// Validate the FECF on processed frames
    #[arg(long = "check_fecf_yes", overrides_with = "check_fecf_no")]
    pub check_fecf_yes: bool,
    #[arg(long = "check_fecf_no", overrides_with = "check_fecf_yes")]
    pub check_fecf_no: bool,

    /// Bump the non-transmitted IV when the ARSN rolls over
    #[arg(long = "increment_nt_iv_yes", overrides_with = "increment_nt_iv_no")]
    pub increment_nt_iv_yes: bool,
    #[arg(long = "increment_nt_iv_no", overrides_with = "increment_nt_iv_yes")]
    pub increment_nt_iv_no: bool,

    /// Virtual channels admitted for processing
    #[arg(long = "vcid_bitmask", value_parser = c_number::<u8>)]
    pub vcid_bitmask: Option<u8>,
}

impl EngineFlagArgs {
    fn apply(&self, builder: &mut RunConfigurationBuilder) {
        let flags = builder.flags_mut();
        if self.mariadb {
            flags.sa_backend = SaBackend::MariaDb;
        } else if self.inmemory {
            flags.sa_backend = SaBackend::InMemory;
        }
        if self.kmccrypto {
            flags.crypto_backend = CryptoBackend::KmcCrypto;
        } else if self.libgcrypt {
            flags.crypto_backend = CryptoBackend::Libgcrypt;
        }

        if let Some(v) = toggle(self.fecf_yes, self.fecf_no) {
            flags.create_fecf = v;
        }
        if let Some(v) = toggle(self.sdls_pdu_yes, self.sdls_pdu_no) {
            flags.process_sdls_pdus = v;
        }
        if let Some(v) = toggle(self.has_pus_hdr_yes, self.has_pus_hdr_no) {
            flags.has_pus_header = v;
        }
        if let Some(v) = toggle(self.ignore_sa_state_yes, self.ignore_sa_state_no) {
            flags.ignore_sa_state = v;
        }
        if let Some(v) = toggle(self.ignore_anti_replay_yes, self.ignore_anti_replay_no) {
            flags.ignore_anti_replay = v;
        }
        if let Some(v) = toggle(self.unique_sa_yes, self.unique_sa_no) {
            flags.unique_sa_per_mapid = v;
        }
        if let Some(v) = toggle(self.check_fecf_yes, self.check_fecf_no) {
            flags.check_fecf = v;
        }
        if let Some(v) = toggle(self.increment_nt_iv_yes, self.increment_nt_iv_no) {
            flags.increment_nontransmitted_iv = v;
        }
        if let Some(mask) = self.vcid_bitmask {
            flags.vcid_bitmask = mask;
        }
    }
}

/// MariaDB SA store connection
#[derive(Args, Debug, Clone, Default)]
pub struct SaDatabaseArgs {
    #[arg(long = "req_sec_trans_yes", overrides_with = "req_sec_trans_no")]
    pub req_sec_trans_yes: bool,
    #[arg(long = "req_sec_trans_no", overrides_with = "req_sec_trans_yes")]
    pub req_sec_trans_no: bool,

    #[arg(long = "verify_tls_yes", overrides_with = "verify_tls_no")]
    pub verify_tls_yes: bool,
    #[arg(long = "verify_tls_no", overrides_with = "verify_tls_yes")]
    pub verify_tls_no: bool,

    #[arg(long = "sql_host")]
    pub sql_host: Option<String>,
    #[arg(long = "sql_db")]
    pub sql_db: Option<String>,
    #[arg(long = "sql_port", value_parser = c_number::<u16>)]
    pub sql_port: Option<u16>,
    #[arg(long = "sql_tls_ca")]
    pub sql_tls_ca: Option<String>,
    #[arg(long = "sql_tls_ca_path")]
    pub sql_tls_ca_path: Option<String>,
    #[arg(long = "sql_mtls_cert")]
    pub sql_mtls_cert: Option<String>,
    #[arg(long = "sql_mtls_key")]
    pub sql_mtls_key: Option<String>,
    #[arg(long = "sql_mtls_client_key_password")]
    pub sql_mtls_client_key_password: Option<String>,
    #[arg(long = "sql_username")]
    pub sql_username: Option<String>,
    #[arg(long = "sql_password")]
    pub sql_password: Option<String>,
}

impl SaDatabaseArgs {
    fn apply(&self, builder: &mut RunConfigurationBuilder) {
        let db = builder.sa_database_mut();
        if let Some(v) = toggle(self.req_sec_trans_yes, self.req_sec_trans_no) {
            db.require_secure_transport = v;
        }
        if let Some(v) = toggle(self.verify_tls_yes, self.verify_tls_no) {
            db.verify_server = v;
        }
        if let Some(host) = &self.sql_host {
            db.host = Some(host.clone());
        }
        if let Some(name) = &self.sql_db {
            db.database = name.clone();
        }
        if let Some(port) = self.sql_port {
            db.port = port;
        }
        override_with(&mut db.tls_ca, &self.sql_tls_ca);
        override_with(&mut db.tls_ca_path, &self.sql_tls_ca_path);
        override_with(&mut db.mtls_cert, &self.sql_mtls_cert);
        override_with(&mut db.mtls_key, &self.sql_mtls_key);
        override_with(
            &mut db.mtls_client_key_password,
            &self.sql_mtls_client_key_password,
        );
        override_with(&mut db.username, &self.sql_username);
        override_with(&mut db.password, &self.sql_password);
    }
}

/// KMC crypto service connection
#[derive(Args, Debug, Clone, Default)]
pub struct CryptoServiceArgs {
    #[arg(
        long = "ignore_hostname_validation_yes",
        overrides_with = "ignore_hostname_validation_no"
    )]
    pub ignore_hostname_validation_yes: bool,
    #[arg(
        long = "ignore_hostname_validation_no",
        overrides_with = "ignore_hostname_validation_yes"
    )]
    pub ignore_hostname_validation_no: bool,

    /// `http` or `https`
    #[arg(long)]
    pub protocol: Option<String>,
    #[arg(long = "kmc_crypto_hostname")]
    pub kmc_crypto_hostname: Option<String>,
    #[arg(long = "kmc_crypto_port", value_parser = c_number::<u16>)]
    pub kmc_crypto_port: Option<u16>,
    #[arg(long = "kmc_crypto_app")]
    pub kmc_crypto_app: Option<String>,
    #[arg(long = "kmc_tls_ca_bundle")]
    pub kmc_tls_ca_bundle: Option<String>,
    #[arg(long = "kmc_tls_ca_path")]
    pub kmc_tls_ca_path: Option<String>,
    #[arg(long = "mtls_client_cert_path")]
    pub mtls_client_cert_path: Option<String>,
    /// `PEM` or `DER`
    #[arg(long = "mtls_client_cert_type")]
    pub mtls_client_cert_type: Option<String>,
    #[arg(long = "mtls_client_key_path")]
    pub mtls_client_key_path: Option<String>,
    #[arg(long = "mtls_client_key_pass")]
    pub mtls_client_key_pass: Option<String>,
    #[arg(long = "mtls_issuer_cert")]
    pub mtls_issuer_cert: Option<String>,
}

impl CryptoServiceArgs {
    fn apply(&self, builder: &mut RunConfigurationBuilder) {
        let service = builder.crypto_service_mut();
        if let Some(v) = toggle(
            self.ignore_hostname_validation_yes,
            self.ignore_hostname_validation_no,
        ) {
            service.ignore_hostname_validation = v;
        }
        if let Some(protocol) = &self.protocol {
            service.protocol = protocol.to_ascii_lowercase();
        }
        override_with(&mut service.host, &self.kmc_crypto_hostname);
        if let Some(port) = self.kmc_crypto_port {
            service.port = port;
        }
        if let Some(app) = &self.kmc_crypto_app {
            service.app = app.clone();
        }
        override_with(&mut service.tls_ca_bundle, &self.kmc_tls_ca_bundle);
        override_with(&mut service.tls_ca_path, &self.kmc_tls_ca_path);
        override_with(&mut service.mtls_client_cert, &self.mtls_client_cert_path);
        if let Some(kind) = &self.mtls_client_cert_type {
            service.mtls_client_cert_type = kind.to_ascii_uppercase();
        }
        override_with(&mut service.mtls_client_key, &self.mtls_client_key_path);
        override_with(
            &mut service.mtls_client_key_password,
            &self.mtls_client_key_pass,
        );
        override_with(&mut service.mtls_issuer_cert, &self.mtls_issuer_cert);
    }
}

/// Identity and framing of the primary managed channel
#[derive(Args, Debug, Clone, Default)]
pub struct ChannelArgs {
    #[arg(long = "has_fecf_yes", overrides_with = "has_fecf_no")]
    pub has_fecf_yes: bool,
    #[arg(long = "has_fecf_no", overrides_with = "has_fecf_yes")]
    pub has_fecf_no: bool,

    #[arg(
        long = "segmentation_header_yes",
        overrides_with = "segmentation_header_no"
    )]
    pub segmentation_header_yes: bool,
    #[arg(
        long = "segmentation_header_no",
        overrides_with = "segmentation_header_yes"
    )]
    pub segmentation_header_no: bool,

    /// Transfer frame version number
    #[arg(long, value_parser = c_number::<u8>)]
    pub tfvn: Option<u8>,
    /// Spacecraft id, e.g. `0x2C`
    #[arg(long, value_parser = c_number::<u16>)]
    pub scid: Option<u16>,
    /// Virtual channel id
    #[arg(long, value_parser = c_number::<u8>)]
    pub vcid: Option<u8>,
    #[arg(long = "max_tc_frame_size", value_parser = c_number::<u16>)]
    pub max_tc_frame_size: Option<u16>,
}

impl ChannelArgs {
    fn apply(&self, builder: &mut RunConfigurationBuilder) {
        let channel = builder.primary_channel_mut();
        if let Some(v) = toggle(self.has_fecf_yes, self.has_fecf_no) {
            channel.has_fecf = v;
        }
        if let Some(v) = toggle(self.segmentation_header_yes, self.segmentation_header_no) {
            channel.has_segmentation_header = v;
        }
        if let Some(tfvn) = self.tfvn {
            channel.tfvn = tfvn;
        }
        if let Some(scid) = self.scid {
            channel.scid = scid;
        }
        if let Some(vcid) = self.vcid {
            channel.vcid = vcid;
        }
        if let Some(size) = self.max_tc_frame_size {
            channel.max_frame_size = size;
        }
    }
}

/// Common access manager authentication
#[derive(Args, Debug, Clone, Default)]
pub struct CamArgs {
    #[arg(long = "cam_enabled", overrides_with = "cam_disabled")]
    pub cam_enabled: bool,
    #[arg(long = "cam_disabled", overrides_with = "cam_enabled")]
    pub cam_disabled: bool,

    #[arg(long = "cam_cookie_path")]
    pub cam_cookie_path: Option<String>,
    #[arg(long = "cam_keytab_path")]
    pub cam_keytab_path: Option<String>,
    /// `none`, `kerberos` or `keytab_file`
    #[arg(long = "cam_login_method")]
    pub cam_login_method: Option<CamLoginMethod>,
    #[arg(long = "cam_manager_uri")]
    pub cam_manager_uri: Option<String>,
    #[arg(long = "cam_username")]
    pub cam_username: Option<String>,
    #[arg(long = "cam_home")]
    pub cam_home: Option<String>,
}

impl CamArgs {
    fn apply(&self, builder: &mut RunConfigurationBuilder) {
        let cam = builder.cam_mut();
        if let Some(v) = toggle(self.cam_enabled, self.cam_disabled) {
            cam.enabled = v;
        }
        override_with(&mut cam.cookie_file, &self.cam_cookie_path);
        override_with(&mut cam.keytab_file, &self.cam_keytab_path);
        if let Some(method) = self.cam_login_method {
            cam.login_method = method;
        }
        override_with(&mut cam.access_manager_uri, &self.cam_manager_uri);
        override_with(&mut cam.username, &self.cam_username);
        override_with(&mut cam.cam_home, &self.cam_home);
    }
}

fn override_with(target: &mut Option<String>, value: &Option<String>) {
    if let Some(v) = value {
        *target = Some(v.clone());
    }
}

/// Everything that feeds the run configuration
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// `cryptolib.*` properties file applied before the flags below
    #[arg(long, value_name = "PROPERTIES")]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub engine: EngineFlagArgs,
    #[command(flatten)]
    pub sa_database: SaDatabaseArgs,
    #[command(flatten)]
    pub crypto_service: CryptoServiceArgs,
    #[command(flatten)]
    pub channel: ChannelArgs,
    #[command(flatten)]
    pub cam: CamArgs,
}

impl ConfigArgs {
    /// Properties file (if any) first, then command line overrides
    pub fn to_builder(&self) -> Result<RunConfigurationBuilder> {
        let mut builder = match &self.config {
            Some(path) => properties::load_file(path)?,
            None => RunConfigurationBuilder::new(),
        };
        self.engine.apply(&mut builder);
        self.sa_database.apply(&mut builder);
        self.crypto_service.apply(&mut builder);
        self.channel.apply(&mut builder);
        self.cam.apply(&mut builder);
        Ok(builder)
    }

    pub fn resolve(&self) -> Result<RunConfiguration> {
        self.to_builder()?.build()
    }
}

/// Benchmark one TC apply or process operation
#[derive(Parser, Debug, Clone)]
#[command(
    name = "performance_test",
    version,
    about = "Time repeated TC Apply/Process Security calls",
    group(ArgGroup::new("input").required(true).args(["frame", "frame_file"]))
)]
pub struct PerformanceCli {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Frame as a hex string
    #[arg(long)]
    pub frame: Option<String>,
    /// Frame as a raw binary file
    #[arg(long = "frame_file")]
    pub frame_file: Option<PathBuf>,

    /// Number of timed iterations
    #[arg(long, default_value_t = 1000, value_parser = clap::value_parser!(u32).range(1..))]
    pub numloops: u32,

    /// Time Apply Security (default)
    #[arg(long = "tc_apply", overrides_with = "tc_process")]
    pub tc_apply: bool,
    /// Time Process Security
    #[arg(long = "tc_process", overrides_with = "tc_apply")]
    pub tc_process: bool,

    /// Write the summary as JSON
    #[arg(long, value_name = "PATH")]
    pub json: Option<PathBuf>,
    /// Write per-iteration samples as CSV
    #[arg(long, value_name = "PATH")]
    pub csv: Option<PathBuf>,

    /// Key seed for the in-process engine
    #[arg(long, default_value_t = DEFAULT_SEED)]
    pub seed: u64,

    #[command(flatten)]
    pub output: OutputArgs,
}

impl PerformanceCli {
    pub fn kind(&self) -> OperationKind {
        if self.tc_process && !self.tc_apply {
            OperationKind::ProcessTelecommand
        } else {
            OperationKind::ApplyTelecommand
        }
    }

    /// The frame argument; clap guarantees exactly one is present
    pub fn frame_source(&self) -> Option<FrameSource> {
        match (&self.frame, &self.frame_file) {
            (Some(hex), _) => Some(FrameSource::Hex(hex.clone())),
            (None, Some(path)) => Some(FrameSource::File(path.clone())),
            (None, None) => None,
        }
    }
}

/// Run `<op> <file>` pairs through the engine in order
#[derive(Parser, Debug, Clone)]
#[command(
    name = "crypto_sequence",
    version,
    about = "Apply or process a sequence of frames read from files"
)]
pub struct SequenceCli {
    /// Alternating operation and file, e.g. `tc_a frame.bin tc_p frame.bin`
    #[arg(required = true, num_args = 2.., value_name = "OP FILE")]
    pub pairs: Vec<String>,

    /// Stop the sequence at the first engine failure
    #[arg(long = "stop-on-error")]
    pub stop_on_error: bool,

    /// Key seed for the in-process engine
    #[arg(long, default_value_t = DEFAULT_SEED)]
    pub seed: u64,

    #[command(flatten)]
    pub output: OutputArgs,
}

impl SequenceCli {
    /// Pair up the positional arguments
    pub fn steps(&self) -> std::result::Result<Vec<SequenceStep>, String> {
        parse_pairs(&self.pairs)
    }
}

pub fn parse_pairs(args: &[String]) -> std::result::Result<Vec<SequenceStep>, String> {
    if args.is_empty() || args.len() % 2 != 0 {
        return Err(format!(
            "expected <op> <file> pairs, got {} argument(s)",
            args.len()
        ));
    }
    args.chunks_exact(2)
        .map(|pair| -> std::result::Result<SequenceStep, String> {
            let kind: OperationKind = pair[0].parse()?;
            Ok(SequenceStep::new(
                kind,
                FrameSource::File(PathBuf::from(&pair[1])),
            ))
        })
        .collect()
}

fn parse_apply_kind(value: &str) -> std::result::Result<OperationKind, String> {
    OperationKind::parse_apply_token(value)
        .ok_or_else(|| format!("unknown layer '{}', expected tc, tm or aos", value))
}

/// Apply security to one frame file and print the result
#[derive(Parser, Debug, Clone)]
#[command(
    name = "apply_security",
    version,
    about = "Apply security to a single frame file"
)]
pub struct ApplyCli {
    /// `tc`, `tm` or `aos`
    #[arg(value_parser = parse_apply_kind)]
    pub layer: OperationKind,

    /// Raw frame file
    pub file: PathBuf,

    /// Key seed for the in-process engine
    #[arg(long, default_value_t = DEFAULT_SEED)]
    pub seed: u64,

    #[command(flatten)]
    pub output: OutputArgs,
}
