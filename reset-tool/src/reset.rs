//! The four-step wipe of on-device storage

use crate::storage::{FlashFilesystem, Namespace, PreferenceStore};
use std::io::{self, Write};
use tracing::{info, warn};

/// What a reset run did and found
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResetReport {
    /// Entries listed before formatting; `None` if the mount failed
    pub files_before: Option<usize>,
    pub format_ok: bool,
    /// Entries left after formatting; `None` if the verify mount failed
    pub remaining_files: Option<usize>,
    pub namespaces_cleared: Vec<String>,
    /// Namespaces whose probe key read back empty
    pub namespaces_verified: Vec<String>,
}

impl ResetReport {
    /// Everything was wiped and verified
    pub fn is_clean(&self, namespaces: &[String]) -> bool {
        self.format_ok
            && self.remaining_files == Some(0)
            && self.namespaces_verified.len() == namespaces.len()
    }
}

/// Which preferences to clear and how to verify them
#[derive(Debug, Clone)]
pub struct ResetPlan {
    pub namespaces: Vec<String>,
    /// Key whose stored length shows whether a namespace was cleared
    pub probe_key: String,
}

impl Default for ResetPlan {
    fn default() -> Self {
        Self {
            namespaces: vec!["vehicle_config".to_string()],
            probe_key: "ngrokHost".to_string(),
        }
    }
}

pub fn print_banner(out: &mut dyn Write) -> io::Result<()> {
    writeln!(out, "Flash filesystem & Preferences Reset Tool")?;
    writeln!(out, "========================================")
}

/// Run all four steps, reporting progress to `out`
///
/// Storage failures are reported and recorded, never fatal; only failing to
/// write to `out` aborts the run.
pub fn run<F, P>(flash: &mut F, prefs: &P, plan: &ResetPlan, out: &mut dyn Write) -> io::Result<ResetReport>
where
    F: FlashFilesystem,
    P: PreferenceStore,
{
    let mut report = ResetReport::default();

    format_flash(flash, &mut report, out)?;
    clear_preferences(prefs, plan, &mut report, out)?;
    verify(flash, prefs, plan, &mut report, out)?;
    print_summary(out)?;

    info!(
        "Reset finished: before={:?} format_ok={} remaining={:?} cleared={}",
        report.files_before,
        report.format_ok,
        report.remaining_files,
        report.namespaces_cleared.len()
    );
    Ok(report)
}

fn format_flash<F: FlashFilesystem>(flash: &mut F, report: &mut ResetReport, out: &mut dyn Write) -> io::Result<()> {
    writeln!(out, "Step 1: Formatting flash filesystem...")?;
    if let Err(e) = flash.mount(true) {
        warn!("Mount failed: {}", e);
        return writeln!(out, "Failed to mount flash filesystem");
    }
    writeln!(out, "Flash filesystem mounted successfully")?;

    writeln!(out, "Files before reset:")?;
    match flash.entries() {
        Ok(entries) => {
            for entry in &entries {
                writeln!(out, "  - {} ({} bytes)", entry.name, entry.size)?;
            }
            writeln!(out, "Total files found: {}", entries.len())?;
            report.files_before = Some(entries.len());
        }
        Err(e) => {
            warn!("Listing failed: {}", e);
            writeln!(out, "Could not list files: {}", e)?;
        }
    }

    writeln!(out, "Formatting flash filesystem (deleting all files)...")?;
    match flash.format() {
        Ok(()) => {
            report.format_ok = true;
            writeln!(out, "Flash filesystem formatted successfully - All files deleted!")?;
        }
        Err(e) => {
            warn!("Format failed: {}", e);
            writeln!(out, "Flash filesystem format failed!")?;
        }
    }

    flash.unmount();
    Ok(())
}

fn clear_preferences<P: PreferenceStore>(
    prefs: &P,
    plan: &ResetPlan,
    report: &mut ResetReport,
    out: &mut dyn Write,
) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "Step 2: Clearing Preferences...")?;

    for name in &plan.namespaces {
        let cleared = prefs.open(name, false).and_then(|mut ns| {
            ns.clear()?;
            ns.close()
        });
        match cleared {
            Ok(()) => {
                writeln!(out, "Preferences '{}' cleared", name)?;
                report.namespaces_cleared.push(name.clone());
            }
            Err(e) => {
                warn!("Clearing {} failed: {}", name, e);
                writeln!(out, "Failed to clear preferences '{}': {}", name, e)?;
            }
        }
    }
    Ok(())
}

fn verify<F, P>(flash: &mut F, prefs: &P, plan: &ResetPlan, report: &mut ResetReport, out: &mut dyn Write) -> io::Result<()>
where
    F: FlashFilesystem,
    P: PreferenceStore,
{
    writeln!(out)?;
    writeln!(out, "Step 3: Verification...")?;

    if flash.mount(true).is_ok() {
        let remaining = flash.entries().map(|e| e.len());
        flash.unmount();
        match remaining {
            Ok(0) => {
                report.remaining_files = Some(0);
                writeln!(out, "Flash filesystem is completely empty")?;
            }
            Ok(n) => {
                report.remaining_files = Some(n);
                writeln!(out, "Warning: {} files still remain", n)?;
            }
            Err(e) => warn!("Verify listing failed: {}", e),
        }
    }

    for name in &plan.namespaces {
        let stored = match prefs.open(name, true) {
            Ok(ns) => {
                let len = ns.bytes_len(&plan.probe_key);
                if let Err(e) = ns.close() {
                    warn!("Closing {} failed: {}", name, e);
                }
                Some(len)
            }
            Err(e) => {
                warn!("Opening {} read-only failed: {}", name, e);
                None
            }
        };

        if stored == Some(0) {
            report.namespaces_verified.push(name.clone());
            writeln!(out, "Preferences ({}) appear cleared", name)?;
        } else {
            writeln!(out, "Warning: Some preferences may still exist in '{}'", name)?;
        }
    }
    Ok(())
}

fn print_summary(out: &mut dyn Write) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "===== RESET COMPLETE =====")?;
    writeln!(out, "Flash filesystem memory cleared")?;
    writeln!(out, "Preferences cleared")?;
    writeln!(out, "System ready for fresh start")?;
    writeln!(out)?;
    writeln!(out, "You can now upload your main code")?;
    writeln!(out, "Or reset this device to start fresh")?;
    writeln!(out, "================================")
}
