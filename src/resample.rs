use crate::{
    error::{Error, Result},
    pose::PoseSequence,
};
use ndarray::{Array2, Zip};
use num_traits::cast::ToPrimitive;
use tracing::debug;

/// Position of sample `i` out of `n` evenly spaced samples over [0, 1].
fn position(i: usize, n: usize) -> Result<f64> {
    if n <= 1 {
        return Ok(0.0);
    }
    let i = i.to_f64().ok_or(Error::ConvertToF64)?;
    let last = (n - 1).to_f64().ok_or(Error::ConvertToF64)?;
    Ok(i / last)
}

/// Resample `seq` to exactly `target_len` frames by per-dimension linear
/// interpolation over normalized time.
///
/// Both the input and output samples span [0, 1], so the first and last
/// frames are preserved exactly. An empty input yields `target_len` zero
/// frames; callers are expected to reject empty inputs before scoring.
pub fn resample(seq: &PoseSequence, target_len: usize) -> Result<PoseSequence> {
    let len = seq.len();
    if len == target_len {
        return Ok(seq.clone());
    }
    if seq.is_empty() {
        return Ok(PoseSequence::zeros(target_len, seq.dim()));
    }

    let frames = seq.frames();
    let mut out = Array2::<f64>::zeros((target_len, seq.dim()));
    // index of the input sample at or left of the current output position
    let mut lo = 0;
    for (j, mut row) in out.outer_iter_mut().enumerate() {
        let t = position(j, target_len)?;
        while lo + 1 < len && position(lo + 1, len)? <= t {
            lo += 1;
        }
        if lo + 1 >= len {
            row.assign(&frames.row(len - 1));
            continue;
        }
        let (t0, t1) = (position(lo, len)?, position(lo + 1, len)?);
        let w = (t - t0) / (t1 - t0);
        Zip::from(&mut row)
            .and(frames.row(lo))
            .and(frames.row(lo + 1))
            .for_each(|v, &a, &b| *v = a + (b - a) * w);
    }
    PoseSequence::new(out)
}

/// Bring two sequences to a shared length by downsampling the longer one.
pub fn align_lengths(
    standard: &PoseSequence,
    user: &PoseSequence,
) -> Result<(PoseSequence, PoseSequence)> {
    standard.check_same_dim(user)?;
    let target_len = standard.len().min(user.len());
    if standard.len() != user.len() {
        debug!(
            message = "normalizing sequence lengths",
            standard = standard.len(),
            user = user.len(),
            target_len
        );
    }
    Ok((resample(standard, target_len)?, resample(user, target_len)?))
}
