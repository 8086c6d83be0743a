// Constants module - centralized default values for configuration
//
// This module defines the default values used throughout the codebase.
// Using constants instead of magic numbers keeps the defaults in one place.

// =============================================================================
// Server defaults
// =============================================================================

/// Default listen address
pub const DEFAULT_ADDRESS: &str = "0.0.0.0";

/// Default listen port
pub const DEFAULT_PORT: u16 = 80;

/// Path of the liveness endpoint
pub const ALIVE_PATH: &str = "/alive";

// =============================================================================
// Source defaults
// =============================================================================

/// Timeout of the shared outbound HTTP client, in seconds
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 15;

/// Upper bound on a single external renderer invocation, in seconds
pub const DEFAULT_RENDER_TIMEOUT_SECS: u64 = 60;

/// Default AWS region used for object-store signing
pub const DEFAULT_S3_REGION: &str = "us-east-1";

// =============================================================================
// Transform defaults
// =============================================================================

/// Largest width or height a request may ask for
pub const MAX_DIMENSION: u32 = 3064;

/// Largest pixelation percentage
pub const MAX_PIXELATION: u8 = 100;

/// Largest blur sigma; blur cost grows with sigma times image area
pub const MAX_BLUR: f32 = 50.0;

/// Quality used when a route configures none
pub const DEFAULT_QUALITY: u8 = 80;

/// Pixelation is skipped for sources at or below this many bytes
pub const MIN_PIXELATE_SOURCE_BYTES: usize = 100;

/// Generated images at or below this many bytes are not cached
pub const MIN_CACHEABLE_BYTES: usize = 100;

/// Input extensions accepted when a route configures none
pub const DEFAULT_ALLOWED_EXTENSIONS: &[&str] = &[".png", ".jpg", ".jpeg", ".gif", ".webp"];

// =============================================================================
// Cache defaults
// =============================================================================

/// Cache lifetime in seconds (one week); 0 never expires, negative disables
pub const DEFAULT_CACHE_TIME_SECS: i64 = 604_800;

/// Default directory for cached renditions
pub const DEFAULT_CACHE_PATH: &str = "/var/cache/kagami";

/// Number of background cache-write workers
pub const DEFAULT_CACHE_WRITERS: usize = 4;

/// Pending cache jobs beyond this are dropped
pub const DEFAULT_CACHE_QUEUE_DEPTH: usize = 256;
