//! SIGINT/SIGTERM wiring for cooperative loop cancellation.

use anyhow::{Context, Result};
use tracing::warn;

use crate::looping::StopFlag;

/// Route Ctrl-C and SIGTERM into `flag`.
///
/// The loop checks the flag between iterations only; an agent session that is
/// already running is allowed to finish.
pub fn install_stop_handler(flag: &StopFlag) -> Result<()> {
    let flag = flag.clone();
    ctrlc::set_handler(move || {
        if !flag.is_set() {
            warn!("stop requested; finishing the current iteration");
        }
        flag.request_stop();
    })
    .context("failed to set ctrl-c handler")
}
