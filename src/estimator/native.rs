//! Bridge to a native estimator routine.
//!
//! The routine is reached through a plain C-ABI function pointer, so it can
//! come from a statically linked object or from a library the host loaded at
//! runtime. The routine keeps global scratch state, so calls are serialised
//! through a process-wide lock.

use std::sync::{Mutex, PoisonError};

use tracing::debug;

use super::{EstimateRequest, EstimatorError, Ownership, TerritoryEstimator};
use crate::cell::StoneType;

/// `estimate(width, height, board, player_to_move, trials, tolerance, out) -> status`
///
/// `board` and `out` point at `width * height` values in row-major order
/// (`1` black, `-1` white, `0` empty). `player_to_move` is `1` or `-1`.
/// A non-zero status means failure.
pub type EstimateFn = unsafe extern "C" fn(
    width: i32,
    height: i32,
    board: *const i32,
    player_to_move: i32,
    trials: i32,
    tolerance: f32,
    out: *mut i32,
) -> i32;

static NATIVE_LOCK: Mutex<()> = Mutex::new(());

/// Sentinel left in output slots the routine did not write.
const UNWRITTEN: i32 = i32::MIN;

pub struct NativeEstimator {
    func: EstimateFn,
}

impl NativeEstimator {
    /// # Safety
    /// `func` must follow the [`EstimateFn`] contract: read exactly
    /// `width * height` values from `board`, write at most that many to `out`,
    /// and not keep either pointer after returning.
    pub unsafe fn new(func: EstimateFn) -> Self {
        Self { func }
    }
}

impl TerritoryEstimator for NativeEstimator {
    fn estimate(&self, request: &EstimateRequest) -> Result<Vec<Ownership>, EstimatorError> {
        request.validate()?;
        let to_i32 = |v: usize| {
            i32::try_from(v).map_err(|_| EstimatorError::Failed(format!("dimension {v} out of range")))
        };
        let (width, height) = (to_i32(request.width)?, to_i32(request.height)?);
        let trials = i32::try_from(request.trials)
            .map_err(|_| EstimatorError::Failed(format!("{} trials out of range", request.trials)))?;
        let player = match request.player_to_move {
            StoneType::Black => 1,
            StoneType::White => -1,
        };

        let board: Vec<i32> = request.board.iter().map(|&v| v as i32).collect();
        let mut out = vec![UNWRITTEN; board.len()];

        let status = {
            let _guard = NATIVE_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
            debug!(width, height, trials, "calling native estimator");
            // SAFETY: both buffers hold width * height values and outlive the
            // call; the constructor's contract covers the rest.
            unsafe {
                (self.func)(
                    width,
                    height,
                    board.as_ptr(),
                    player,
                    trials,
                    request.tolerance,
                    out.as_mut_ptr(),
                )
            }
        };
        if status != 0 {
            return Err(EstimatorError::Failed(format!("native estimator returned status {status}")));
        }

        out.iter()
            .enumerate()
            .map(|(index, &value)| Ownership::from_raw(value).ok_or(EstimatorError::InvalidValue { index, value }))
            .collect()
    }
}
