//! Writes to stderr that are safe between `fork()` and `execve()`.
//!
//! Only stack buffers and `write(2)`: no allocation, no locks.

#[cfg(unix)]
fn raw_write(bytes: &[u8]) {
    // SAFETY: the pointer and length come from a live slice.
    unsafe {
        libc::write(
            libc::STDERR_FILENO,
            bytes.as_ptr() as *const libc::c_void,
            bytes.len(),
        );
    }
}

#[cfg(not(unix))]
fn raw_write(bytes: &[u8]) {
    use std::io::Write;

    let _ = std::io::stderr().write_all(bytes);
}

/// Emit `pilot-exec: <msg>` followed by ` errno=<n>` when known, then a newline.
pub(crate) fn pre_exec_report(msg: &[u8], errno: Option<i32>) {
    raw_write(b"pilot-exec: ");
    raw_write(msg);
    if let Some(code) = errno {
        let mut buf = [0u8; 24];
        let digits = format_errno(code, &mut buf);
        raw_write(b" errno=");
        raw_write(digits);
    }
    raw_write(b"\n");
}

/// Decimal rendering of `code` into the tail of `buf`.
fn format_errno(code: i32, buf: &mut [u8; 24]) -> &[u8] {
    let mut n = code.unsigned_abs();
    let mut at = buf.len();
    loop {
        at -= 1;
        buf[at] = b'0' + (n % 10) as u8;
        n /= 10;
        if n == 0 {
            break;
        }
    }
    if code < 0 {
        at -= 1;
        buf[at] = b'-';
    }
    &buf[at..]
}
