//! Threshold gate: refuses to sync a directory whose remote copy looks too
//! small next to its local counterpart.

use std::path::Path;

use eyre::{Context, Result};

use crate::client::{RemoteClient, SizeProbe};
use crate::config::ThresholdConfig;
use crate::direction::TransferDirection;

const BYTES_PER_MIB: f64 = (1u64 << 20) as f64;

/// Bytes to MiB, rounded to three decimals for operator-facing messages.
pub fn bytes_to_mib(bytes: f64) -> f64 {
    (bytes / BYTES_PER_MIB * 1000.0).round() / 1000.0
}

/// Result of one gate evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateVerdict {
    pub permitted: bool,
    /// `percentage / 100` of the local side's size.
    pub required_min_bytes: f64,
    /// Size measured on the remote side; unknown sizes count as zero.
    pub destination_actual_bytes: f64,
    /// Raw measurement behind `destination_actual_bytes`.
    pub probe: SizeProbe,
}

impl GateVerdict {
    pub fn required_mib(&self) -> f64 {
        bytes_to_mib(self.required_min_bytes)
    }

    pub fn actual_mib(&self) -> f64 {
        bytes_to_mib(self.destination_actual_bytes)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdGate {
    percentage: f64,
}

impl ThresholdGate {
    pub fn new(percentage: f64) -> Self {
        Self { percentage }
    }

    /// The gate for `config`, or `None` when the threshold is disabled.
    pub fn from_config(config: &ThresholdConfig) -> Option<Self> {
        config
            .enabled()
            .then(|| ThresholdGate::new(config.percentage()))
    }

    pub fn percentage(&self) -> f64 {
        self.percentage
    }

    /// Compare an already-measured pair. `reference_bytes` is the local
    /// side's size; `observed` the remote side's. The bar is inclusive.
    pub fn judge(&self, reference_bytes: u64, observed: SizeProbe) -> GateVerdict {
        let required_min_bytes = (self.percentage / 100.0) * reference_bytes as f64;
        let destination_actual_bytes = observed.bytes_or_zero() as f64;
        GateVerdict {
            permitted: destination_actual_bytes >= required_min_bytes,
            required_min_bytes,
            destination_actual_bytes,
            probe: observed,
        }
    }

    /// Measure both sides of a task and judge them.
    ///
    /// The local side of the pair is always the reference and the remote side
    /// is always the measured one, whichever way data flows.
    pub fn evaluate(
        &self,
        client: &mut RemoteClient,
        direction: TransferDirection,
        source_dir: &Path,
        destination_dir: &Path,
    ) -> Result<GateVerdict> {
        let (local_dir, remote_dir) = if direction.source_is_remote() {
            (destination_dir, source_dir)
        } else {
            (source_dir, destination_dir)
        };
        log::info!(
            "verifying {} against {}",
            source_dir.display(),
            destination_dir.display()
        );

        let reference_bytes = client
            .directory_size_local(local_dir)
            .wrap_err_with(|| format!("measuring local directory {}", local_dir.display()))?;
        let observed = client.directory_size_remote(remote_dir);
        let verdict = self.judge(reference_bytes, observed);

        log::debug!(
            "gate for {}: required {} byte(s), remote {} byte(s) ({:?}), permitted={}",
            remote_dir.display(),
            verdict.required_min_bytes,
            verdict.destination_actual_bytes,
            verdict.probe,
            verdict.permitted
        );
        Ok(verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destination_meeting_bar_is_permitted() {
        let verdict = ThresholdGate::new(85.0).judge(1000, SizeProbe::Measured(900));
        assert!(verdict.permitted);
        assert_eq!(verdict.required_min_bytes, 850.0);
        assert_eq!(verdict.destination_actual_bytes, 900.0);
    }

    #[test]
    fn shrunken_destination_is_rejected() {
        let verdict = ThresholdGate::new(85.0).judge(1000, SizeProbe::Measured(100));
        assert!(!verdict.permitted);
        assert_eq!(verdict.required_min_bytes, 850.0);
        assert_eq!(verdict.required_mib(), 0.001);
        assert_eq!(verdict.actual_mib(), 0.0);
    }

    #[test]
    fn bar_is_inclusive() {
        let verdict = ThresholdGate::new(50.0).judge(2000, SizeProbe::Measured(1000));
        assert_eq!(verdict.required_min_bytes, verdict.destination_actual_bytes);
        assert!(verdict.permitted);
    }

    #[test]
    fn permission_matches_inequality_across_grid() {
        for percentage in [40.0, 55.5, 85.0, 100.0] {
            let gate = ThresholdGate::new(percentage);
            for source in [0u64, 1, 999, 1000, 1 << 20, 7 << 30] {
                for destination in [0u64, 1, 850, 1000, 1 << 20, 8 << 30] {
                    let verdict = gate.judge(source, SizeProbe::Measured(destination));
                    let expected = destination as f64 >= percentage / 100.0 * source as f64;
                    assert_eq!(verdict.permitted, expected, "{percentage} {source} {destination}");
                }
            }
        }
    }

    #[test]
    fn unknown_sizes_block_unless_nothing_is_required() {
        let gate = ThresholdGate::new(85.0);
        assert!(!gate.judge(1000, SizeProbe::Unsupported).permitted);
        assert!(!gate.judge(1000, SizeProbe::ProbeFailed).permitted);
        assert!(gate.judge(0, SizeProbe::ProbeFailed).permitted);
    }

    #[test]
    fn disabled_config_has_no_gate() {
        assert!(ThresholdGate::from_config(&ThresholdConfig::disabled()).is_none());
        let enabled = ThresholdConfig::new(true, 85.0).unwrap();
        assert_eq!(
            ThresholdGate::from_config(&enabled).map(|g| g.percentage()),
            Some(85.0)
        );
    }

    #[test]
    fn mib_rounding_uses_three_decimals() {
        assert_eq!(bytes_to_mib(850.0), 0.001);
        assert_eq!(bytes_to_mib(1_572_864.0), 1.5);
        assert_eq!(bytes_to_mib(0.0), 0.0);
    }
}
