/// Default block duration in seconds.
pub const DEFAULT_BLOCK_SECONDS: u64 = 5;
/// Hard bounds on the block duration; values outside are clamped or rejected.
pub const MIN_BLOCK_SECONDS: u64 = 2;
pub const MAX_BLOCK_SECONDS: u64 = 10;

/// Engine sample rate for captured blocks (Hz).
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;
pub const MIN_SAMPLE_RATE: u32 = 8_000;
pub const MAX_SAMPLE_RATE: u32 = 192_000;

/// Per-block gain multiplier applied at schedule time.
pub const DEFAULT_GAIN: f32 = 1.0;
pub const MAX_GAIN: f32 = 8.0;

/// Per-block playback speed multiplier (linear resampling, shifts pitch).
pub const DEFAULT_SPEED: f32 = 1.0;
pub const MIN_SPEED: f32 = 0.25;
pub const MAX_SPEED: f32 = 4.0;

/// Capture-chunk channel capacity between the device callback and the engine.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;
pub const MIN_CHANNEL_CAPACITY: usize = 8;
pub const MAX_CHANNEL_CAPACITY: usize = 1024;

/// Characters we refuse in user-supplied device names.
pub(super) const FORBIDDEN_DEVICE_CHARS: &[char] = &['\0', '\n', '\r'];
