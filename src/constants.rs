//! Constants for board geometry, scoring defaults and engine parameters.
//!
//! Boards are stored as sets of cells rather than a padded array, so the only
//! hard geometric limit is [`MAX_BOARD_SIZE`], which is what the coordinate
//! alphabets (GTP columns, SGF letters) can express.

// =============================================================================
// Board Geometry
// =============================================================================

/// Largest supported board side. GTP column letters run out after 25.
pub const MAX_BOARD_SIZE: usize = 25;

/// Board size used when a move path carries no explicit size (joseki data).
pub const DEFAULT_BOARD_SIZE: usize = 19;

/// GTP column letters. `I` is skipped to avoid confusion with `J`.
pub const GTP_COLUMNS: &[u8; MAX_BOARD_SIZE] = b"ABCDEFGHJKLMNOPQRSTUVWXYZ";

/// Playout length cap, as a multiple of the board area.
pub const MAX_GAME_LEN_FACTOR: usize = 3;

// =============================================================================
// Special Move Values
// =============================================================================

/// GTP spelling of a pass.
pub const PASS_GTP: &str = "PASS";

/// SGF spelling of a pass in concatenated coordinate strings.
pub const PASS_SGF: &str = "..";

/// Move-path token for a pass.
pub const PASS_TOKEN: &str = "pass";

/// Move-path root marker.
pub const ROOT_TOKEN: &str = "root";

// =============================================================================
// Territory Estimator Parameters
// =============================================================================

/// Default number of random playouts per estimate.
pub const ESTIMATOR_TRIALS: u32 = 10_000;

/// Fraction of playouts a point must be owned in before it is called.
pub const ESTIMATOR_TOLERANCE: f32 = 0.3;

// =============================================================================
// Analysis Engine Defaults
// =============================================================================

/// Ruleset sent with analysis queries unless overridden.
pub const DEFAULT_RULES: &str = "japanese";

/// Search budget sent with analysis queries unless overridden.
pub const DEFAULT_MAX_VISITS: u32 = 30;

/// Line the analysis engine prints on stderr once it accepts queries.
pub const ENGINE_READY_LINE: &str = "Started, ready to begin handling requests";

// =============================================================================
// Komi and Handicap
// =============================================================================

/// Komi for an even game on 9x9.
pub const KOMI_9X9_EVEN: f32 = 5.5;

/// Komi for a handicap game on 9x9.
pub const KOMI_9X9_HANDICAP: f32 = 3.5;

/// Komi for an even game on any other size.
pub const KOMI_EVEN: f32 = 6.5;

/// Komi for a handicap game on any other size.
pub const KOMI_HANDICAP: f32 = 0.5;

/// Largest fixed handicap with a placement table.
pub const MAX_HANDICAP: usize = 9;

/// Fixed handicap placements as concatenated SGF pairs, indexed by handicap.
/// Handicap 0 and 1 place no stones.
pub const HANDICAP_19: [&str; MAX_HANDICAP + 1] = [
    "",
    "",
    "pddp",
    "pppddp",
    "ddpppddp",
    "jjddpppddp",
    "djpjddpppddp",
    "djpjjjddpppddp",
    "jdjpdjpjddpppddp",
    "jdjpdjpjjjddpppddp",
];

pub const HANDICAP_13: [&str; MAX_HANDICAP + 1] = [
    "",
    "",
    "jddj",
    "jjjddj",
    "ddjjjddj",
    "ggddjjjddj",
    "dgjgddjjjddj",
    "dgjgggddjjjddj",
    "gdgjdgjgddjjjddj",
    "gdgjdgjgggddjjjddj",
];

pub const HANDICAP_9: [&str; MAX_HANDICAP + 1] = [
    "",
    "",
    "gccg",
    "gggccg",
    "ccgggccg",
    "eeccgggccg",
    "cegeccgggccg",
    "cegeeeccgggccg",
    "ecegcegeccgggccg",
    "ecegcegeeeccgggccg",
];
