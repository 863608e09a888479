//! Constants for the download module (redirect bound, timeouts, buffer sizes).

use std::time::Duration;

/// Maximum redirects followed before a request fails; shared by both backends.
pub const MAX_REDIRECTS: u32 = 50;

/// Per-call timeout for blocking native receives and status reads (15 seconds).
pub const TIMEOUT_SECS: u64 = 15;

/// [`TIMEOUT_SECS`] as a `Duration`.
pub const TIMEOUT: Duration = Duration::from_secs(TIMEOUT_SECS);

/// Capacity of a transport session's undecoded-input slab (32 KiB).
pub const SESSION_BUFFER_SIZE: usize = 32 * 1024;

/// Default working buffer size handed to data sinks (32 KiB).
pub const DEFAULT_BUFFER_SIZE: usize = 32 * 1024;

/// Largest working buffer a caller may request (16 MiB).
pub const MAX_BUFFER_SIZE: usize = 16 * 1024 * 1024;

/// Maximum length of a request URL, including the redirect-resolved form.
pub const URL_CAPACITY: usize = 1024;
