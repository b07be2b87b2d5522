/// Numerical epsilon for near-zero comparisons
pub const EPSILON: f64 = 1e-10;

/// Smallest |det| accepted for the rotation/scale block of a wire transform
pub const DETERMINANT_EPSILON: f64 = 1e-9;

/// Quaternion norm drift beyond this is renormalized on decode
pub const UNIT_DRIFT_TOLERANCE: f64 = 1e-6;

/// Number of floats in a flat column-major 4x4 wire matrix
pub const MATRIX_LEN: usize = 16;

/// Shortest hosted cloud anchor lifetime a provider may accept (1 second)
pub const MIN_TTL_SECONDS: u32 = 1;

/// Longest hosted cloud anchor lifetime a provider may accept (365 days)
pub const MAX_TTL_SECONDS: u32 = 365 * 24 * 60 * 60;

/// Prefix for placeholder names given to anchors while a resolve is in flight
pub const TEMP_NAME_PREFIX: &str = "resolve-";

/// Frames a resolved anchor may wait for the host to name it before release
pub const PENDING_DOWNLOAD_TIMEOUT_FRAMES: u64 = 900;

/// Frames a LocalAnchor may stay STOPPED before it is dropped
pub const DEFAULT_STOPPED_GRACE_FRAMES: u64 = 30;
