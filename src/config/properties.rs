//! `cryptolib.*` properties file loader
//!
//! Plain `key=value` lines. `#` and `!` start comments. Managed channels are
//! declared as `cryptolib.tc.<scid>.<vcid>.<tfvn>.has_ecf=<bool>` with optional
//! `.max_frame_length` and `.has_segmentation_header` siblings.

use super::RunConfigurationBuilder;
use crate::error::{HarnessError, Result};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

const MANAGED_PREFIX: &str = "cryptolib.tc.";

/// Load a properties file into a fresh builder
pub fn load_file(path: &Path) -> Result<RunConfigurationBuilder> {
    let text = fs::read_to_string(path).map_err(|e| {
        HarnessError::configuration("config", format!("{}: {}", path.display(), e))
    })?;
    let builder = parse(&text)?;
    info!(path = %path.display(), "loaded configuration properties");
    Ok(builder)
}

/// Parse properties text into a fresh builder
pub fn parse(text: &str) -> Result<RunConfigurationBuilder> {
    let mut builder = RunConfigurationBuilder::new();
    apply(&mut builder, text)?;
    Ok(builder)
}

/// Apply properties text on top of an existing builder
pub fn apply(builder: &mut RunConfigurationBuilder, text: &str) -> Result<()> {
    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }
        let (key, value) = line.split_once('=').ok_or_else(|| {
            HarnessError::configuration(
                format!("line {}", idx + 1),
                format!("expected key=value, found '{}'", line),
            )
        })?;
        apply_property(builder, key.trim(), value.trim())?;
    }
    Ok(())
}

fn apply_property(builder: &mut RunConfigurationBuilder, key: &str, value: &str) -> Result<()> {
    match key {
        "cryptolib.sadb.type" => {
            builder.flags_mut().sa_backend =
                value.parse().map_err(|e: String| HarnessError::configuration(key, e))?
        }
        "cryptolib.crypto.type" => {
            builder.flags_mut().crypto_backend =
                value.parse().map_err(|e: String| HarnessError::configuration(key, e))?
        }
        "cryptolib.process_tc.ignore_antireplay" => {
            builder.flags_mut().ignore_anti_replay = parse_bool(key, value)?
        }
        "cryptolib.process_tc.ignore_sa_state" => {
            builder.flags_mut().ignore_sa_state = parse_bool(key, value)?
        }
        "cryptolib.process_tc.process_pdus" => {
            builder.flags_mut().process_sdls_pdus = parse_bool(key, value)?
        }
        "cryptolib.process_tc.check_fecf" => {
            builder.flags_mut().check_fecf = parse_bool(key, value)?
        }
        "cryptolib.apply_tc.create_ecf" => {
            builder.flags_mut().create_fecf = parse_bool(key, value)?
        }
        "cryptolib.tc.has_pus_header" => {
            builder.flags_mut().has_pus_header = parse_bool(key, value)?
        }
        "cryptolib.tc.unique_sa_per_mapid" => {
            builder.flags_mut().unique_sa_per_mapid = parse_bool(key, value)?
        }
        "cryptolib.tc.vcid_bitmask" => builder.flags_mut().vcid_bitmask = parse_number(key, value)?,
        "cryptolib.tc.on_rollover_increment_nontransmitted_counter" => {
            builder.flags_mut().increment_nontransmitted_iv = parse_bool(key, value)?
        }

        "cryptolib.sadb.mariadb.fqdn" => builder.sa_database_mut().host = optional(value),
        "cryptolib.sadb.mariadb.port" => builder.sa_database_mut().port = parse_number(key, value)?,
        "cryptolib.sadb.mariadb.database_name" => {
            builder.sa_database_mut().database = value.to_string()
        }
        "cryptolib.sadb.mariadb.username" => builder.sa_database_mut().username = optional(value),
        "cryptolib.sadb.mariadb.password" => builder.sa_database_mut().password = optional(value),
        "cryptolib.sadb.mariadb.tls.cacert" => builder.sa_database_mut().tls_ca = optional(value),
        "cryptolib.sadb.mariadb.tls.capath" => {
            builder.sa_database_mut().tls_ca_path = optional(value)
        }
        "cryptolib.sadb.mariadb.tls.verifyserver" => {
            builder.sa_database_mut().verify_server = parse_bool(key, value)?
        }
        "cryptolib.sadb.mariadb.mtls.clientcert" => {
            builder.sa_database_mut().mtls_cert = optional(value)
        }
        "cryptolib.sadb.mariadb.mtls.clientkey" => {
            builder.sa_database_mut().mtls_key = optional(value)
        }
        "cryptolib.sadb.mariadb.mtls.clientkeypassword" => {
            builder.sa_database_mut().mtls_client_key_password = optional(value)
        }
        "cryptolib.sadb.mariadb.require_secure_transport" => {
            builder.sa_database_mut().require_secure_transport = parse_bool(key, value)?
        }

        "cryptolib.crypto.kmccryptoservice.protocol" => {
            builder.crypto_service_mut().protocol = value.to_ascii_lowercase()
        }
        "cryptolib.crypto.kmccryptoservice.fqdn" => {
            builder.crypto_service_mut().host = optional(value)
        }
        "cryptolib.crypto.kmccryptoservice.port" => {
            builder.crypto_service_mut().port = parse_number(key, value)?
        }
        "cryptolib.crypto.kmccryptoservice.app" => {
            builder.crypto_service_mut().app = value.to_string()
        }
        "cryptolib.crypto.kmccryptoservice.mtls.clientcert" => {
            builder.crypto_service_mut().mtls_client_cert = optional(value)
        }
        "cryptolib.crypto.kmccryptoservice.mtls.clientcertformat" => {
            builder.crypto_service_mut().mtls_client_cert_type = value.to_ascii_uppercase()
        }
        "cryptolib.crypto.kmccryptoservice.mtls.clientkey" => {
            builder.crypto_service_mut().mtls_client_key = optional(value)
        }
        "cryptolib.crypto.kmccryptoservice.mtls.clientkeypassword" => {
            builder.crypto_service_mut().mtls_client_key_password = optional(value)
        }
        "cryptolib.crypto.kmccryptoservice.cacert" => {
            builder.crypto_service_mut().tls_ca_bundle = optional(value)
        }
        "cryptolib.crypto.kmccryptoservice.cacertpath" => {
            builder.crypto_service_mut().tls_ca_path = optional(value)
        }
        "cryptolib.crypto.kmccryptoservice.issuercert" => {
            builder.crypto_service_mut().mtls_issuer_cert = optional(value)
        }
        "cryptolib.crypto.kmccryptoservice.verifyserver" => {
            builder.crypto_service_mut().ignore_hostname_validation = !parse_bool(key, value)?
        }

        "cryptolib.cam.enabled" => builder.cam_mut().enabled = parse_bool(key, value)?,
        "cryptolib.cam.cookie_file" => builder.cam_mut().cookie_file = optional(value),
        "cryptolib.cam.keytab_file" => builder.cam_mut().keytab_file = optional(value),
        "cryptolib.cam.cam_home" => builder.cam_mut().cam_home = optional(value),
        "cryptolib.cam.login_method" => {
            builder.cam_mut().login_method =
                value.parse().map_err(|e: String| HarnessError::configuration(key, e))?
        }
        "cryptolib.cam.access_manager_uri" => {
            builder.cam_mut().access_manager_uri = optional(value)
        }
        "cryptolib.cam.username" => builder.cam_mut().username = optional(value),

        _ if key.starts_with(MANAGED_PREFIX) && is_managed_key(key) => {
            apply_managed_parameter(builder, key, value)?
        }
        _ => debug!(key, "ignoring unrecognized property"),
    }
    Ok(())
}

fn is_managed_key(key: &str) -> bool {
    key.ends_with(".has_ecf")
        || key.ends_with(".max_frame_length")
        || key.ends_with(".has_segmentation_header")
}

/// `cryptolib.tc.<scid>.<vcid>.<tfvn>.<attribute>`
fn apply_managed_parameter(
    builder: &mut RunConfigurationBuilder,
    key: &str,
    value: &str,
) -> Result<()> {
    let invalid = || {
        HarnessError::configuration(
            key,
            "managed parameters must look like cryptolib.tc.<scid>.<vcid>.<tfvn>.has_ecf",
        )
    };

    let rest = key.strip_prefix(MANAGED_PREFIX).ok_or_else(invalid)?;
    let parts: Vec<&str> = rest.split('.').collect();
    let &[scid, vcid, tfvn, attribute] = parts.as_slice() else {
        return Err(invalid());
    };
    let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(scid) || !all_digits(vcid) || !all_digits(tfvn) {
        return Err(invalid());
    }
    let scid: u16 = scid.parse().map_err(|_| invalid())?;
    let vcid: u8 = vcid.parse().map_err(|_| invalid())?;
    let tfvn: u8 = tfvn.parse().map_err(|_| invalid())?;

    let channel = builder.channel_mut(tfvn, scid, vcid);
    match attribute {
        "has_ecf" => channel.has_fecf = parse_bool(key, value)?,
        "has_segmentation_header" => channel.has_segmentation_header = parse_bool(key, value)?,
        "max_frame_length" => channel.max_frame_size = parse_number(key, value)?,
        _ => return Err(invalid()),
    }
    Ok(())
}

fn optional(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Accepts the `strtobool` spellings: y/yes/t/true/on/1 and n/no/f/false/off/0
pub fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "y" | "yes" | "t" | "true" | "on" | "1" => Ok(true),
        "n" | "no" | "f" | "false" | "off" | "0" => Ok(false),
        other => Err(HarnessError::configuration(
            key,
            format!("'{}' is not a boolean", other),
        )),
    }
}

/// Integer with an optional `0x` (hex) or leading-zero (octal) prefix
pub fn parse_number<T>(key: &str, value: &str) -> Result<T>
where
    T: TryFrom<u64>,
{
    let text = value.trim();
    let parsed = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
    } else if text.len() > 1 && text.starts_with('0') {
        u64::from_str_radix(&text[1..], 8)
    } else {
        text.parse::<u64>()
    };
    let number = parsed.map_err(|_| {
        HarnessError::configuration(key, format!("'{}' is not a number", value))
    })?;
    T::try_from(number)
        .map_err(|_| HarnessError::configuration(key, format!("{} is out of range", number)))
}
