// Author: Lukas Bower
// Purpose: Small OS helpers shared by the cohort client.

//! Hostname and process-identity helpers.

use std::env;

/// Name of this machine as reported by the OS, or `localhost` if the
/// lookup fails.
#[must_use]
pub fn hostname() -> String {
    let mut buf = [0u8; 256];
    // SAFETY: buf outlives the call and its length is passed alongside.
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast::<libc::c_char>(), buf.len()) };
    if rc != 0 {
        return "localhost".to_owned();
    }
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

/// Whether the supplied host names this machine.
#[must_use]
pub fn host_is_local(host: &str) -> bool {
    host == "localhost" || host == "127.0.0.1" || host == hostname()
}

/// Short name of the running executable.
#[must_use]
pub fn program_name() -> String {
    env::current_exe()
        .ok()
        .and_then(|path| path.file_name().map(|name| name.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "unknown".to_owned())
}
