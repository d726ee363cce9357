//! Interrupted-call handling for DRM ioctls

use nix::errno::Errno;

/// Run `call` until it stops failing with `EINTR` or `EAGAIN`
///
/// Any other result, success or failure, is returned as is.
pub fn retry_interrupted<T, F>(mut call: F) -> nix::Result<T>
where
    F: FnMut() -> nix::Result<T>,
{
    loop {
        match call() {
            Err(Errno::EINTR) | Err(Errno::EAGAIN) => {
                tracing::trace!("ioctl interrupted, retrying");
            }
            other => return other,
        }
    }
}
