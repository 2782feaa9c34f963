//! Bus subjects and request deadlines.

use std::time::Duration;

/// Commands from the brain to the resource manager.
pub const CH_BRAIN_TO_RES: &str = "ch_brain_res";

/// Replies from the resource manager to the brain, used when a command
/// arrives without a reply subject.
pub const CH_RES_TO_BRAIN: &str = "ch_res_brain";

/// Deadline for a request when the caller does not choose one.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(3000);

/// Deadline for deletion-class commands, which wait on container teardown.
pub const REMOVE_REQUEST_TIMEOUT: Duration = Duration::from_millis(6000);
