//! Default values shared across the pipeline.

/// Default number of candidate diagnoses surfaced per run.
pub const DEFAULT_NUM_RESULTS: usize = 5;

/// Spatial side length the classifiers expect, in pixels.
pub const MODEL_INPUT_SIDE: u32 = 224;

/// Lower bound of the intensity window fed to the classifiers.
pub const WINDOW_LOW: f32 = -1024.0;

/// Upper bound of the intensity window fed to the classifiers.
pub const WINDOW_HIGH: f32 = 1024.0;

/// Default weight given to the saliency colormap when compositing overlays.
pub const DEFAULT_BLEND_ALPHA: f32 = 0.7;

/// Luminance coefficients for collapsing RGB to a single gray channel.
pub const LUMA_WEIGHTS: [f32; 3] = [0.2989, 0.5870, 0.1140];

/// Values below this spread are treated as constant when normalizing maps.
pub const NORMALIZE_EPSILON: f32 = 1e-8;
