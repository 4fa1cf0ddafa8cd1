//! Logging and reply helpers for the op table.
//!
//! Every operation logs under the same two fields: `op` names the
//! operation, `stage` tells how far it got (`enter`, `done`, `fail`), and
//! failures carry the errno name.

/// Log one stage of a filesystem operation.
///
/// `fs_op!("read", ino = ino)` marks entry; the `done:` and `fail:` forms
/// record the outcome with whatever result fields matter.
#[macro_export]
macro_rules! fs_op {
    (done: $op:expr $(, $key:ident = $value:expr)* $(,)? ) => {
        ::tracing::debug!(op = $op, stage = "done" $(, $key = $value)*);
    };
    (fail: $op:expr, $error:expr $(, $key:ident = $value:expr)* $(,)? ) => {
        ::tracing::debug!(op = $op, stage = "fail", error = $error $(, $key = $value)*);
    };
    ($op:expr $(, $key:ident = $value:expr)* $(,)? ) => {
        ::tracing::debug!(op = $op, stage = "enter" $(, $key = $value)*);
    };
}

/// Reply with the errno for an [`crate::fs::error::FsError`] and log the
/// failure.
#[macro_export]
macro_rules! reply_fs_error {
    ($reply:expr, $op:expr, $err:expr $(, $key:ident = $value:expr)* $(,)? ) => {{
        let err = $err;
        fs_op!(fail: $op, err.name() $(, $key = $value)*);
        $reply.error(err.errno());
    }};
}

pub use fs_op;
pub use reply_fs_error;
