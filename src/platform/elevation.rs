use crate::error::{HardmonError, Result};

#[cfg(unix)]
pub fn is_elevated() -> bool {
    // On Unix, check if running as root
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
pub fn is_elevated() -> bool {
    false
}

/// Fails with a hint when register access would need root
pub fn ensure_elevated() -> Result<()> {
    if is_elevated() {
        return Ok(());
    }

    Err(HardmonError::elevation_required(
        "reading MSRs and PCI config space requires root (try sudo)",
    ))
}
