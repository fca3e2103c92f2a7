/// Configuration constants for the TI-99/4A flavour of BASIC.
///
/// These are the limits and layout rules the console BASIC enforces. Everything
/// that depends on a machine quirk (line-number range, name length, number
/// range, screen geometry) reads it from here rather than hard-coding it.

// =============================================================================
// PROGRAM CONFIGURATION
// =============================================================================

/// Smallest line number a program line may carry
pub const MIN_LINE_NUMBER: u32 = 1;

/// Largest line number a program line may carry
pub const MAX_LINE_NUMBER: u32 = 32767;

/// Defaults for RESEQUENCE and NUMBER when no arguments are given
pub const DEFAULT_INITIAL_LINE: u32 = 100;
pub const DEFAULT_LINE_INCREMENT: u32 = 10;

/// Maximum length of a variable name, not counting the `$` of string names
pub const MAX_NAME_LENGTH: usize = 15;

// =============================================================================
// NUMBER CONFIGURATION
// =============================================================================

/// Largest magnitude the machine can hold. Results beyond it are clamped here
/// and raise the NUMBER TOO BIG warning.
pub const MAX_MAGNITUDE: f64 = 9.9999999999999e127;

/// Smallest non-zero magnitude the machine can display. Anything smaller
/// prints as zero.
pub const MIN_MAGNITUDE: f64 = 1e-128;

/// Significant digits used for the fixed-point display form
pub const DISPLAY_DIGITS: usize = 10;

/// Significant digits used for the mantissa of the scientific display form
pub const SCIENTIFIC_DIGITS: usize = 6;

// =============================================================================
// STRING AND SCREEN CONFIGURATION
// =============================================================================

/// Strings are cut to this length when displayed. The stored value is not.
pub const MAX_STRING_LENGTH: usize = 255;

/// Usable columns of the text screen
pub const SCREEN_WIDTH: usize = 28;

/// Width of a print zone, the distance a comma separator advances
pub const PRINT_ZONE_WIDTH: usize = 14;

// =============================================================================
// ARRAY CONFIGURATION
// =============================================================================

/// Upper bound of every dimension of an array used without DIM
pub const DEFAULT_ARRAY_BOUND: usize = 10;

/// Maximum array dimensions
pub const MAX_ARRAY_DIMS: usize = 3;

/// Most cells one array may hold. Bigger declarations fail with MEMORY FULL.
pub const MAX_ARRAY_CELLS: usize = 1 << 20;

// =============================================================================
// RUNTIME LIMITS
// =============================================================================

/// Maximum number of nested GOSUB calls before MEMORY FULL
pub const MAX_GOSUB_DEPTH: usize = 1024;

/// Maximum nesting of user-defined function calls before MEMORY FULL
pub const MAX_FUNCTION_DEPTH: usize = 64;

/// Highest file channel number; channel 0 is the screen and keyboard
pub const MAX_FILE_CHANNEL: u32 = 255;

/// Highest character code accepted by CHR$
pub const MAX_CHARACTER_CODE: f64 = 32767.0;
