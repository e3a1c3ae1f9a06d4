//! Named fault injection points, active only with the `failpoints` feature.
//!
//! A point configured with `return(unavailable)` or `return(deadline)` fails with a transient
//! store error; any other parameter fails with [`ErrorKind::StoreCommitFailed`].

use fail::fail_point;

use crate::bail;
use crate::error::{ErrorKind, SyncResult};

/// Hit before every commit attempt of a batch unit.
pub const COMMIT_UNIT_BEFORE_COMMIT: &str = "commit_unit.before_commit";

/// Hit after the reconciler submitted every update and before the final flush.
pub const RECONCILER_BEFORE_FLUSH: &str = "reconciler.before_flush";

pub fn sync_fail_point(name: &str) -> SyncResult<()> {
    fail_point!(name, |parameter| {
        let error_kind = match parameter.as_deref() {
            Some("unavailable") => ErrorKind::StoreUnavailable,
            Some("deadline") => ErrorKind::StoreDeadlineExceeded,
            _ => ErrorKind::StoreCommitFailed,
        };

        bail!(
            error_kind,
            "An error occurred in a fail point",
            format!("The failpoint '{name}' returned an error")
        );
    });

    Ok(())
}
