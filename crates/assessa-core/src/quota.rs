//! Quota draws over a question pool.
//!
//! Required items are always kept; the remaining slots are filled by a
//! uniform sample without replacement and the result is shuffled with
//! Fisher–Yates (`SliceRandom::shuffle`).

use rand::seq::{index, SliceRandom};
use rand::Rng;

use crate::error::EngineError;

/// Draw `quota` items from `pool`.
///
/// `None` (or zero) takes the whole pool. Fails when the pool is smaller
/// than the quota, or when more items are required than the quota allows.
pub fn draw<T, R>(
    pool: Vec<T>,
    quota: Option<usize>,
    is_required: impl Fn(&T) -> bool,
    origin: &str,
    rng: &mut R,
) -> Result<Vec<T>, EngineError>
where
    R: Rng + ?Sized,
{
    let available = pool.len();
    let target = quota.filter(|&q| q > 0).unwrap_or(available);

    if target > available {
        return Err(EngineError::InsufficientQuestions {
            origin: origin.to_string(),
            requested: target,
            available,
        });
    }

    let (mut selected, mut optional): (Vec<T>, Vec<T>) =
        pool.into_iter().partition(|item| is_required(item));

    if selected.len() > target {
        return Err(EngineError::RequiredExceedsQuota {
            origin: origin.to_string(),
            required: selected.len(),
            quota: target,
        });
    }

    let slots = target - selected.len();
    let required = selected.len();

    // Highest index first so swap_remove never moves a pending pick.
    let mut picks = index::sample(rng, optional.len(), slots).into_vec();
    picks.sort_unstable_by(|a, b| b.cmp(a));
    for i in picks {
        selected.push(optional.swap_remove(i));
    }

    tracing::debug!(origin, required, drawn = slots, available, "quota draw");

    selected.shuffle(rng);
    Ok(selected)
}
