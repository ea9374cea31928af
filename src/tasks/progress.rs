//! Progress estimation for task polling.

/// Ceiling for synthetic progress. Only a real completion reaches 100.
pub const SYNTHETIC_PROGRESS_CAP: u8 = 90;

/// Computes the next displayed progress value.
///
/// A server-reported value is used as-is (clamped to 100) and may jump
/// anywhere. Without one, the previous value grows by `step` up to
/// [`SYNTHETIC_PROGRESS_CAP`].
pub fn next_progress(previous: Option<u8>, server: Option<u8>, step: u8) -> u8 {
    match server {
        Some(value) => value.min(100),
        None => previous
            .unwrap_or(0)
            .saturating_add(step)
            .min(SYNTHETIC_PROGRESS_CAP),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_value_wins_verbatim() {
        assert_eq!(next_progress(Some(80), Some(35), 10), 35);
        assert_eq!(next_progress(None, Some(100), 10), 100);
        assert_eq!(next_progress(None, Some(250), 10), 100);
    }

    #[test]
    fn synthetic_steps_from_zero() {
        assert_eq!(next_progress(None, None, 10), 10);
        assert_eq!(next_progress(Some(10), None, 15), 25);
    }

    #[test]
    fn synthetic_is_monotonic_and_capped() {
        let mut value = None;
        let mut seen = Vec::new();
        for _ in 0..50 {
            let next = next_progress(value, None, 15);
            if let Some(prev) = value {
                assert!(next >= prev);
            }
            assert!(next <= SYNTHETIC_PROGRESS_CAP);
            seen.push(next);
            value = Some(next);
        }
        assert_eq!(*seen.last().unwrap(), SYNTHETIC_PROGRESS_CAP);
    }

    #[test]
    fn large_previous_saturates() {
        assert_eq!(next_progress(Some(250), None, 90), SYNTHETIC_PROGRESS_CAP);
    }
}
