//! Integration tests for error handling

use std::io;
use std::time::Duration;

use vmdisplay_core::error::{ResultExt, VmDisplayError};

#[test]
fn test_error_context_chaining() {
    let base_error = VmDisplayError::Allocation(io::Error::from_raw_os_error(libc::ENOMEM));
    let with_context = base_error.with_context("Allocating frame 3");

    let msg = format!("{}", with_context);
    assert!(msg.contains("Allocating frame 3"));
    assert!(msg.contains("allocat"));
}

#[test]
fn test_error_context_preserves_hint() {
    let base_error = VmDisplayError::device_open("/dev/dri/card0", io::Error::from_raw_os_error(libc::EACCES));
    let hint_before = base_error.user_hint();

    let with_context = base_error.with_context("Starting session");
    let hint_after = with_context.user_hint();

    // Hint should be preserved through context
    assert!(hint_before.is_some());
    assert_eq!(hint_before, hint_after);
}

#[test]
fn test_result_ext_context() {
    let result: Result<(), VmDisplayError> = Err(VmDisplayError::config("bad pipe"));
    let with_context = result.context("Loading configuration");

    let err = with_context.unwrap_err();
    let msg = format!("{}", err);
    assert!(msg.contains("Loading configuration"));
    assert!(matches!(err.root(), VmDisplayError::Config(_)));
}

#[test]
fn test_user_hints() {
    let err = VmDisplayError::device_open("/dev/dri/card0", io::Error::from_raw_os_error(libc::ENOENT));
    assert!(err.user_hint().unwrap().contains("video"));

    let err = VmDisplayError::unsupported_format("NV12");
    assert!(err.user_hint().unwrap().contains("BGRx"));

    let err = VmDisplayError::InvalidHandle { start: 0x1000 };
    assert!(err.user_hint().unwrap().contains("GVT-g"));

    let err = VmDisplayError::config("test");
    assert!(err.user_hint().unwrap().contains("config.toml"));

    assert!(VmDisplayError::Cancelled.user_hint().is_none());
}

#[test]
fn test_user_recoverable() {
    assert!(VmDisplayError::config("test").is_user_recoverable());
    assert!(VmDisplayError::SessionAlreadyRunning.is_user_recoverable());
    assert!(
        VmDisplayError::Timeout {
            waited: Duration::from_millis(100),
            polls: 20
        }
        .is_user_recoverable()
    );

    assert!(!VmDisplayError::Cancelled.is_user_recoverable());
    assert!(!VmDisplayError::Export(io::Error::from_raw_os_error(libc::EMFILE)).is_user_recoverable());
}

#[test]
fn test_errno_from_kernel_calls() {
    let err = VmDisplayError::Acquisition(io::Error::from_raw_os_error(libc::ENODEV));
    assert_eq!(err.errno(), Some(libc::ENODEV));

    let wrapped = err.with_context("Polling pipe 0");
    assert_eq!(wrapped.errno(), Some(libc::ENODEV));

    assert_eq!(VmDisplayError::delivery("full").errno(), None);
}

#[test]
fn test_io_error_conversion() {
    fn read_missing() -> vmdisplay_core::Result<String> {
        Ok(std::fs::read_to_string("/nonexistent/vmdisplay/file")?)
    }

    let err = read_missing().unwrap_err();
    assert!(matches!(err, VmDisplayError::Io(_)));
    assert_eq!(err.errno(), Some(libc::ENOENT));
}
