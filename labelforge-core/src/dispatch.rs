//! Dispatch - Handing Accepted Labels to a Printer
//!
//! The engine never talks to a device. A `DispatchAdapter` owns the printer
//! handle, serializes writes and decides about retries. `dispatch_accepted`
//! is the only path from pipeline output to an adapter and re-checks the
//! validator verdict before every send.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::pipeline::LabelOutcome;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Invalid device id '{0}'")]
    InvalidDevice(String),

    #[error("Device I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Device rejected job: {0}")]
    Rejected(String),
}

/// Printer-side collaborator. Returns the number of bytes written.
pub trait DispatchAdapter {
    fn send(&self, document: &str, device: &str) -> Result<usize, DispatchError>;
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DispatchStatus {
    Sent,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchReceipt {
    pub sequence_index: u32,
    pub device: String,
    pub status: DispatchStatus,
    pub bytes_written: usize,
    pub message: String,
}

/// Writes each job as a file in a spool directory, named so that a directory
/// listing sorts in dispatch order.
pub struct SpoolDirectoryAdapter {
    dir: PathBuf,
    jobs: AtomicU64,
}

impl SpoolDirectoryAdapter {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, DispatchError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, jobs: AtomicU64::new(0) })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn check_device(device: &str) -> Result<(), DispatchError> {
        let ok = !device.is_empty()
            && device
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && device != "."
            && device != "..";
        if ok {
            Ok(())
        } else {
            Err(DispatchError::InvalidDevice(device.to_string()))
        }
    }
}

impl DispatchAdapter for SpoolDirectoryAdapter {
    fn send(&self, document: &str, device: &str) -> Result<usize, DispatchError> {
        Self::check_device(device)?;
        let job = self.jobs.fetch_add(1, Ordering::SeqCst) + 1;
        let name = format!(
            "{}-{}-{:06}.zpl",
            device,
            Utc::now().format("%Y%m%dT%H%M%S%3f"),
            job
        );
        fs::write(self.dir.join(name), document.as_bytes())?;
        Ok(document.len())
    }
}

/// Send accepted labels in order, waiting `settle` between physical jobs.
/// Rejected labels and anything the validator blocked come back `Skipped`.
pub fn dispatch_accepted(
    outcomes: Vec<LabelOutcome>,
    adapter: &dyn DispatchAdapter,
    device: &str,
    settle: Duration,
) -> Vec<DispatchReceipt> {
    let mut receipts = Vec::with_capacity(outcomes.len());
    let mut sent_any = false;

    for outcome in outcomes {
        let sequence_index = outcome.instance.sequence_index;
        let skipped = |message: String| DispatchReceipt {
            sequence_index,
            device: device.to_string(),
            status: DispatchStatus::Skipped,
            bytes_written: 0,
            message,
        };

        let rendered = match outcome.rendered {
            Some(rendered) if outcome.accepted_for_dispatch => rendered,
            _ => {
                receipts.push(skipped(outcome.reason));
                continue;
            }
        };
        if rendered.validation.is_blocked() {
            warn!(sequence_index, "refusing to dispatch a blocked document");
            receipts.push(skipped(rendered.validation.reason));
            continue;
        }

        if sent_any && !settle.is_zero() {
            thread::sleep(settle);
        }
        sent_any = true;

        let receipt = match adapter.send(&rendered.document, device) {
            Ok(bytes_written) => {
                info!(sequence_index, device, bytes_written, "label dispatched");
                DispatchReceipt {
                    sequence_index,
                    device: device.to_string(),
                    status: DispatchStatus::Sent,
                    bytes_written,
                    message: format!("Label {} sent", sequence_index),
                }
            }
            Err(e) => {
                warn!(sequence_index, device, error = %e, "dispatch failed");
                DispatchReceipt {
                    sequence_index,
                    device: device.to_string(),
                    status: DispatchStatus::Failed,
                    bytes_written: 0,
                    message: e.to_string(),
                }
            }
        };
        receipts.push(receipt);
    }
    receipts
}
