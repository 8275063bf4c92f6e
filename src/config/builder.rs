use super::{
    CamLoginMethod, CamParameters, CryptoBackend, CryptoServiceParameters, EngineFlags,
    ManagedChannel, RunConfiguration, SaBackend, SaDatabaseParameters, MAX_TC_FRAME_SIZE,
};
use crate::error::{HarnessError, Result};
use std::collections::HashSet;
use tracing::debug;

/// Collects overrides on top of the documented defaults
#[derive(Debug, Clone, Default)]
pub struct RunConfigurationBuilder {
    flags: EngineFlags,
    sa_database: SaDatabaseParameters,
    crypto_service: CryptoServiceParameters,
    channels: Vec<ManagedChannel>,
    cam: CamParameters,
}

impl RunConfigurationBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sa_backend(mut self, backend: SaBackend) -> Self {
        self.flags.sa_backend = backend;
        self
    }

    pub fn crypto_backend(mut self, backend: CryptoBackend) -> Self {
        self.flags.crypto_backend = backend;
        self
    }

    pub fn sa_database_host(mut self, host: impl Into<String>) -> Self {
        self.sa_database.host = Some(host.into());
        self
    }

    pub fn crypto_service_host(mut self, host: impl Into<String>) -> Self {
        self.crypto_service.host = Some(host.into());
        self
    }

    /// Add one managed channel
    pub fn channel(mut self, channel: ManagedChannel) -> Self {
        self.channels.push(channel);
        self
    }

    pub fn cam(mut self, cam: CamParameters) -> Self {
        self.cam = cam;
        self
    }

    pub fn flags_mut(&mut self) -> &mut EngineFlags {
        &mut self.flags
    }

    pub fn sa_database_mut(&mut self) -> &mut SaDatabaseParameters {
        &mut self.sa_database
    }

    pub fn crypto_service_mut(&mut self) -> &mut CryptoServiceParameters {
        &mut self.crypto_service
    }

    pub fn cam_mut(&mut self) -> &mut CamParameters {
        &mut self.cam
    }

    /// First managed channel, created with defaults if none was added yet
    pub fn primary_channel_mut(&mut self) -> &mut ManagedChannel {
        if self.channels.is_empty() {
            self.channels.push(ManagedChannel::default());
        }
        &mut self.channels[0]
    }

    /// Existing channel with this GVCID, or a new default one
    pub fn channel_mut(&mut self, tfvn: u8, scid: u16, vcid: u8) -> &mut ManagedChannel {
        let idx = match self
            .channels
            .iter()
            .position(|c| c.matches(tfvn, scid, vcid))
        {
            Some(idx) => idx,
            None => {
                self.channels.push(ManagedChannel::new(tfvn, scid, vcid));
                self.channels.len() - 1
            }
        };
        &mut self.channels[idx]
    }

    /// Resolve defaults and validate
    pub fn build(self) -> Result<RunConfiguration> {
        let mut channels = self.channels;
        if channels.is_empty() {
            channels.push(ManagedChannel::default());
        }

        validate_backends(&self.flags, &self.sa_database, &self.crypto_service)?;
        validate_channels(&channels)?;

        let cam = if self.cam.enabled {
            validate_cam(&self.cam)?;
            Some(self.cam)
        } else {
            None
        };

        debug!(
            sa_backend = self.flags.sa_backend.as_str(),
            crypto_backend = self.flags.crypto_backend.as_str(),
            channels = channels.len(),
            cam = cam.is_some(),
            "run configuration resolved"
        );

        Ok(RunConfiguration {
            flags: self.flags,
            sa_database: self.sa_database,
            crypto_service: self.crypto_service,
            channels,
            cam,
        })
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().is_none_or(|v| v.trim().is_empty())
}

fn validate_backends(
    flags: &EngineFlags,
    sa_database: &SaDatabaseParameters,
    crypto_service: &CryptoServiceParameters,
) -> Result<()> {
    if flags.sa_backend == SaBackend::MariaDb && is_blank(&sa_database.host) {
        return Err(HarnessError::configuration(
            "sql_host",
            "required when the MariaDB SA backend is selected",
        ));
    }

    if flags.crypto_backend == CryptoBackend::KmcCrypto {
        if is_blank(&crypto_service.host) {
            return Err(HarnessError::configuration(
                "kmc_crypto_hostname",
                "required when the KMC crypto backend is selected",
            ));
        }
        match crypto_service.protocol.as_str() {
            "https" => {
                if is_blank(&crypto_service.mtls_client_cert) {
                    return Err(HarnessError::configuration(
                        "mtls_client_cert_path",
                        "required for https crypto service connections",
                    ));
                }
                if is_blank(&crypto_service.mtls_client_key) {
                    return Err(HarnessError::configuration(
                        "mtls_client_key_path",
                        "required for https crypto service connections",
                    ));
                }
            }
            "http" => {}
            other => {
                return Err(HarnessError::configuration(
                    "protocol",
                    format!("unsupported protocol '{}', expected http or https", other),
                ));
            }
        }
    }

    Ok(())
}

fn validate_channels(channels: &[ManagedChannel]) -> Result<()> {
    let mut seen = HashSet::new();
    for channel in channels {
        if channel.tfvn > 3 {
            return Err(HarnessError::configuration(
                "tfvn",
                format!("{} does not fit in 2 bits", channel.tfvn),
            ));
        }
        if channel.scid > 0x3FF {
            return Err(HarnessError::configuration(
                "scid",
                format!("0x{:04x} does not fit in 10 bits", channel.scid),
            ));
        }
        if channel.vcid > 63 {
            return Err(HarnessError::configuration(
                "vcid",
                format!("{} does not fit in 6 bits", channel.vcid),
            ));
        }
        if channel.max_frame_size == 0 || channel.max_frame_size > MAX_TC_FRAME_SIZE {
            return Err(HarnessError::configuration(
                "max_tc_frame_size",
                format!(
                    "{} outside 1..={}",
                    channel.max_frame_size, MAX_TC_FRAME_SIZE
                ),
            ));
        }
        if !seen.insert((channel.tfvn, channel.scid, channel.vcid)) {
            return Err(HarnessError::configuration(
                "managed_channel",
                format!("duplicate channel {}", channel),
            ));
        }
    }
    Ok(())
}

fn validate_cam(cam: &CamParameters) -> Result<()> {
    if is_blank(&cam.access_manager_uri) {
        return Err(HarnessError::configuration(
            "cam_manager_uri",
            "required when CAM is enabled",
        ));
    }
    if cam.login_method == CamLoginMethod::KeytabFile && is_blank(&cam.keytab_file) {
        return Err(HarnessError::configuration(
            "cam_keytab_path",
            "required for the keytab_file login method",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_of(err: HarnessError) -> String {
        match err {
            HarnessError::ConfigurationInvalid { field, .. } => field,
            other => panic!("unexpected error: {:?}", other),
        }
    }

    fn local() -> RunConfigurationBuilder {
        RunConfigurationBuilder::new()
            .sa_backend(SaBackend::InMemory)
            .crypto_backend(CryptoBackend::Libgcrypt)
    }

    #[test]
    fn test_defaults_require_database_host() {
        let err = RunConfigurationBuilder::new().build().unwrap_err();
        assert_eq!(field_of(err), "sql_host");
    }

    #[test]
    fn test_kmc_requires_host() {
        let err = RunConfigurationBuilder::new()
            .sa_database_host("db.example.org")
            .build()
            .unwrap_err();
        assert_eq!(field_of(err), "kmc_crypto_hostname");
    }

    #[test]
    fn test_https_requires_client_key() {
        let mut builder = RunConfigurationBuilder::new()
            .sa_database_host("db.example.org")
            .crypto_service_host("crypto.example.org");
        builder.crypto_service_mut().mtls_client_key = None;
        assert_eq!(field_of(builder.build().unwrap_err()), "mtls_client_key_path");
    }

    #[test]
    fn test_remote_backends_with_hosts_build() {
        let config = RunConfigurationBuilder::new()
            .sa_database_host("db.example.org")
            .crypto_service_host("crypto.example.org")
            .build()
            .unwrap();
        assert_eq!(config.sa_database().host.as_deref(), Some("db.example.org"));
        assert_eq!(config.channels(), &[ManagedChannel::default()]);
    }

    #[test]
    fn test_local_backends_ignore_missing_hosts() {
        let config = local().build().unwrap();
        assert_eq!(config.flags().sa_backend, SaBackend::InMemory);
        assert!(config.sa_database().host.is_none());
    }

    #[test]
    fn test_channel_field_widths() {
        let mut builder = local();
        builder.primary_channel_mut().scid = 0x400;
        assert_eq!(field_of(builder.build().unwrap_err()), "scid");

        let mut builder = local();
        builder.primary_channel_mut().vcid = 64;
        assert_eq!(field_of(builder.build().unwrap_err()), "vcid");

        let mut builder = local();
        builder.primary_channel_mut().tfvn = 4;
        assert_eq!(field_of(builder.build().unwrap_err()), "tfvn");

        let mut builder = local();
        builder.primary_channel_mut().max_frame_size = 2048;
        assert_eq!(field_of(builder.build().unwrap_err()), "max_tc_frame_size");
    }

    #[test]
    fn test_duplicate_channels_rejected() {
        let err = local()
            .channel(ManagedChannel::new(0, 3, 0))
            .channel(ManagedChannel::new(0, 3, 0))
            .build()
            .unwrap_err();
        assert_eq!(field_of(err), "managed_channel");
    }

    #[test]
    fn test_channel_mut_reuses_existing_gvcid() {
        let mut builder = local();
        builder.channel_mut(0, 3, 2).has_fecf = false;
        builder.channel_mut(0, 3, 2).max_frame_size = 512;
        let config = builder.build().unwrap();
        assert_eq!(config.channels().len(), 1);
        assert!(!config.channels()[0].has_fecf);
        assert_eq!(config.channels()[0].max_frame_size, 512);
    }

    #[test]
    fn test_cam_validation() {
        let cam = CamParameters {
            enabled: true,
            login_method: CamLoginMethod::KeytabFile,
            access_manager_uri: Some("https://cam.example.org/cam".to_string()),
            ..CamParameters::default()
        };
        let err = local().cam(cam.clone()).build().unwrap_err();
        assert_eq!(field_of(err), "cam_keytab_path");

        let cam = CamParameters {
            keytab_file: Some("/home/op/.keytab".to_string()),
            ..cam
        };
        let config = local().cam(cam).build().unwrap();
        assert!(config.cam().is_some());
    }

    #[test]
    fn test_disabled_cam_is_dropped() {
        let cam = CamParameters {
            cookie_file: Some("/tmp/cookie".to_string()),
            ..CamParameters::default()
        };
        let config = local().cam(cam).build().unwrap();
        assert!(config.cam().is_none());
    }
}
