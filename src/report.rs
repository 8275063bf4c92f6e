//! Report Formatter
//!
//! Renders configuration, benchmark and sequence results as console text.
//! Rendering never fails; missing values print as `(none)`.

use crate::config::RunConfiguration;
use crate::error::HarnessError;
use crate::frame_source::FrameBuffer;
use crate::performance::{PerformanceSummary, format_seconds};
use crate::sequence::{SequenceReport, SequenceState};
use crate::types::Direction;
use colored::Colorize;

const RULE: &str = "═══════════════════════════════════════════════════════════════";
const MASK: &str = "********";

#[derive(Debug, Clone, Copy)]
pub struct ReportFormatter {
    color: bool,
}

impl Default for ReportFormatter {
    fn default() -> Self {
        Self { color: true }
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "YES" } else { "NO" }
}

fn text(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("(none)")
}

fn secret(value: &Option<String>) -> &'static str {
    if value.is_some() { MASK } else { "(none)" }
}

fn optional_f64(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.6}", v),
        None => "n/a".to_string(),
    }
}

impl ReportFormatter {
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    /// Uncolored output, stable for comparisons
    pub fn plain() -> Self {
        Self { color: false }
    }

    fn label(&self, label: &str) -> String {
        if self.color {
            label.green().to_string()
        } else {
            label.to_string()
        }
    }

    fn alert(&self, message: &str) -> String {
        if self.color {
            message.red().to_string()
        } else {
            message.to_string()
        }
    }

    fn rule(&self) -> String {
        if self.color {
            RULE.cyan().bold().to_string()
        } else {
            RULE.to_string()
        }
    }

    fn ok_mark(&self) -> String {
        if self.color { "✓".green().to_string() } else { "✓".to_string() }
    }

    fn fail_mark(&self) -> String {
        if self.color { "✗".red().to_string() } else { "✗".to_string() }
    }

    fn field(&self, out: &mut String, label: &str, value: impl std::fmt::Display) {
        out.push_str(&format!("\t{} {}\n", self.label(&format!("{}:", label)), value));
    }

    /// Every configuration group, then the frame under test
    pub fn render_configuration(
        &self,
        config: &RunConfiguration,
        frame: Option<&FrameBuffer>,
    ) -> String {
        let mut out = String::new();
        let flags = config.flags();

        out.push_str("CRYPTO CONFIG:\n");
        self.field(&mut out, "SADB TYPE", flags.sa_backend.as_str());
        self.field(&mut out, "CRYPTOGRAPHY TYPE", flags.crypto_backend.as_str());
        self.field(&mut out, "TC Create FECF", yes_no(flags.create_fecf));
        self.field(&mut out, "PROCESS SDLS PDUs", yes_no(flags.process_sdls_pdus));
        self.field(&mut out, "TC HAS PUS HDR", yes_no(flags.has_pus_header));
        self.field(&mut out, "TC IGNORE SA STATE", yes_no(flags.ignore_sa_state));
        self.field(&mut out, "TC IGNORE ANTI-REPLAY", yes_no(flags.ignore_anti_replay));
        self.field(&mut out, "TC UNIQUE SA PER MAPID", yes_no(flags.unique_sa_per_mapid));
        self.field(&mut out, "TC CHECK FECF", yes_no(flags.check_fecf));
        self.field(&mut out, "VCID BITMASK", format!("0x{:02x}", flags.vcid_bitmask));
        self.field(
            &mut out,
            "INCREMENT NONTRANSMITTED IV",
            yes_no(flags.increment_nontransmitted_iv),
        );

        let db = config.sa_database();
        out.push_str("\nMARIADB CONFIG:\n");
        self.field(&mut out, "MYSQL DATABASE NAME", &db.database);
        self.field(&mut out, "MYSQL PORT", db.port);
        self.field(
            &mut out,
            "MYSQL Require Secure Transport",
            yes_no(db.require_secure_transport),
        );
        self.field(&mut out, "MYSQL VERIFY TLS SERVER", yes_no(db.verify_server));
        self.field(&mut out, "MYSQL TLS CA", text(&db.tls_ca));
        self.field(&mut out, "MYSQL TLS CA PATH", text(&db.tls_ca_path));
        self.field(&mut out, "MYSQL HOSTNAME", text(&db.host));
        self.field(&mut out, "MYSQL MTLS CLIENT CERTIFICATE", text(&db.mtls_cert));
        self.field(&mut out, "MYSQL MTLS CLIENT CERTIFICATE KEY", text(&db.mtls_key));
        self.field(
            &mut out,
            "MYSQL MTLS CLIENT KEY PASSWORD",
            secret(&db.mtls_client_key_password),
        );
        self.field(&mut out, "MYSQL USERNAME", text(&db.username));
        self.field(&mut out, "MYSQL PASSWORD", secret(&db.password));

        let kmc = config.crypto_service();
        out.push_str("\nKMC CONFIG:\n");
        self.field(&mut out, "KMC PROTOCOL", &kmc.protocol);
        self.field(&mut out, "KMC CRYPTO HOSTNAME", text(&kmc.host));
        self.field(&mut out, "KMC CRYPTO PORT", kmc.port);
        self.field(&mut out, "KMC CRYPTO APP", &kmc.app);
        self.field(&mut out, "KMC TLS CA BUNDLE", text(&kmc.tls_ca_bundle));
        self.field(&mut out, "KMC TLS CA PATH", text(&kmc.tls_ca_path));
        self.field(
            &mut out,
            "KMC IGNORE SSL HOSTNAME VALIDATION",
            yes_no(kmc.ignore_hostname_validation),
        );
        self.field(&mut out, "KMC MTLS CLIENT CERT PATH", text(&kmc.mtls_client_cert));
        self.field(&mut out, "KMC MTLS CLIENT CERT TYPE", &kmc.mtls_client_cert_type);
        self.field(&mut out, "KMC MTLS CLIENT KEY PATH", text(&kmc.mtls_client_key));
        self.field(
            &mut out,
            "KMC MTLS CLIENT KEY PASSWORD",
            secret(&kmc.mtls_client_key_password),
        );
        self.field(&mut out, "KMC MTLS ISSUER CERTIFICATE", text(&kmc.mtls_issuer_cert));

        out.push_str("\nCAM CONFIG:\n");
        match config.cam() {
            Some(cam) => {
                self.field(&mut out, "CAM COOKIE PATH", text(&cam.cookie_file));
                self.field(&mut out, "CAM KEYTAB PATH", text(&cam.keytab_file));
                self.field(&mut out, "CAM LOGIN METHOD", cam.login_method.as_str());
                self.field(&mut out, "CAM MANAGER URI", text(&cam.access_manager_uri));
                self.field(&mut out, "CAM USERNAME", text(&cam.username));
                self.field(&mut out, "CAM HOME", text(&cam.cam_home));
            }
            None => out.push_str(&format!("\t{}\n", self.alert("CAM DISABLED"))),
        }

        for channel in config.channels() {
            out.push_str("\nGVCID CONFIG:\n");
            self.field(&mut out, "GVCID TFVN", channel.tfvn);
            self.field(&mut out, "GVCID SCID", format!("0x{:04x}", channel.scid));
            self.field(&mut out, "GVCID VCID", channel.vcid);
            self.field(&mut out, "GVCID HAS FECF", yes_no(channel.has_fecf));
            self.field(
                &mut out,
                "GVCID HAS SEGMENTATION HEADER",
                yes_no(channel.has_segmentation_header),
            );
            self.field(&mut out, "GVCID MAX TC FRAME SIZE", channel.max_frame_size);
        }

        if let Some(frame) = frame {
            out.push_str(&format!("\n{}\n", self.alert("FRAME:")));
            out.push_str(&format!(" {}\n", frame.to_hex()));
        }

        out
    }

    /// Benchmark statistics, followed by the failure if the run stopped early
    pub fn render_performance(
        &self,
        summary: &PerformanceSummary,
        error: Option<&HarnessError>,
    ) -> String {
        let mut out = String::new();
        let method = match summary.kind.direction() {
            Direction::Apply => "TC_APPLY",
            Direction::Process => "TC_PROCESS",
        };

        out.push_str("\nPERFORMANCE DATA:\n");
        out.push_str(&format!("TC Method: {}\n", method));
        out.push_str(&format!("\tNumber of Frames Sent: {}\n", summary.count));
        out.push_str(&format!(
            "\t\tEncrypted Bytes Per Frame: {}\n",
            summary.bytes_per_frame
        ));
        out.push_str(&format!("\t\tTotal Time: {:.6}\n", summary.total_time));
        out.push_str(&format!("\tMin Kbps: {}\n", optional_f64(summary.min_kbps)));
        out.push_str(&format!("\tAvg Kbps: {}\n", optional_f64(summary.avg_kbps)));
        out.push_str(&format!("\tMax Kbps: {}\n", optional_f64(summary.max_kbps)));

        if let (Some(min), Some(max)) = (summary.min_time, summary.max_time) {
            out.push_str("\nLATENCY:\n");
            self.field(&mut out, "Min", format_seconds(min));
            self.field(&mut out, "Max", format_seconds(max));
            for (label, value) in [
                ("P50", summary.p50),
                ("P95", summary.p95),
                ("P99", summary.p99),
            ] {
                if let Some(v) = value {
                    self.field(&mut out, label, format_seconds(v));
                }
            }
        }

        if let Some(failure) = &summary.failure {
            out.push_str(&format!(
                "\n{} {}\n",
                self.fail_mark(),
                self.alert(&format!(
                    "ERROR: {} ({}) on iteration {} of {}",
                    failure.status,
                    failure.status_name,
                    failure.iteration,
                    summary.iterations_requested
                ))
            ));
        }
        if let Some(err) = error {
            out.push_str(&format!("{} {}\n", self.fail_mark(), self.alert(&err.to_string())));
        }

        out
    }

    /// One line per executed step plus a totals line
    pub fn render_sequence(&self, report: &SequenceReport) -> String {
        let mut out = String::new();
        out.push_str(&format!("{}\n", self.rule()));
        out.push_str("CRYPTO SEQUENCE\n");
        out.push_str(&format!("{}\n", self.rule()));

        for outcome in &report.outcomes {
            let input = outcome
                .input_len
                .map(|n| format!("{} bytes", n))
                .unwrap_or_else(|| "unread".to_string());
            match &outcome.result {
                Ok(produced) => out.push_str(&format!(
                    "{} [{}] {} {} ({} -> {} bytes)\n",
                    self.ok_mark(),
                    outcome.index,
                    outcome.kind.token(),
                    outcome.source_id,
                    input,
                    produced
                )),
                Err(err) => out.push_str(&format!(
                    "{} [{}] {} {} ({}): {}\n",
                    self.fail_mark(),
                    outcome.index,
                    outcome.kind.token(),
                    outcome.source_id,
                    input,
                    self.alert(&err.to_string())
                )),
            }
        }

        out.push_str(&format!("{}\n", self.rule()));
        out.push_str(&format!(
            "State: {}  Succeeded: {}  Failed: {}  Not executed: {}\n",
            report.state.as_str(),
            report.succeeded(),
            report.failed(),
            report.not_executed()
        ));
        if report.state == SequenceState::Aborted
            && let Some(reason) = &report.abort_reason
        {
            out.push_str(&format!("{}\n", self.alert(&format!("Aborted: {}", reason))));
        }
        out
    }
}
