//! Validation and arithmetic for upvotes and poll tallies.
//!
//! Stateless; the stores call into it while holding whatever per-record
//! guarantee their backend provides.

use crate::error::{BoardError, Result};

pub const MAX_POLL_OPTIONS: usize = 4;

/// Blank options are dropped; nothing left means no poll. More than
/// [`MAX_POLL_OPTIONS`] are truncated.
pub fn normalize_options(mut options: Vec<String>) -> Option<Vec<String>> {
    options.retain(|option| !option.trim().is_empty());
    if options.is_empty() {
        return None;
    }
    options.truncate(MAX_POLL_OPTIONS);
    Some(options)
}

pub fn empty_tally(poll: Option<&[String]>) -> Option<Vec<u64>> {
    poll.map(|options| vec![0; options.len()])
}

/// Returns the tally slot for `index`, or why the vote cannot be counted.
pub fn check_option(poll: Option<&[String]>, index: i64) -> Result<usize> {
    let options = poll.ok_or(BoardError::NoPoll)?;

    usize::try_from(index)
        .ok()
        .filter(|slot| *slot < options.len())
        .ok_or(BoardError::InvalidOption {
            index,
            options: options.len(),
        })
}

/// Upvotes take any signed amount and may go negative; they stop at the i64 limits.
pub fn add_upvotes(current: i64, amount: i64) -> i64 {
    current.saturating_add(amount)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(labels: &[&str]) -> Vec<String> {
        labels.iter().map(|label| label.to_string()).collect()
    }

    #[test]
    fn empty_option_list_is_no_poll() {
        assert_eq!(normalize_options(Vec::new()), None);
    }

    #[test]
    fn blank_options_do_not_make_a_poll() {
        assert_eq!(normalize_options(options(&[""])), None);
        assert_eq!(normalize_options(options(&["  ", ""])), None);
        assert_eq!(
            normalize_options(options(&["", "a", " ", "b"])),
            Some(options(&["a", "b"]))
        );
    }

    #[test]
    fn options_truncate_to_four() {
        let poll = normalize_options(options(&["a", "b", "c", "d", "e"])).expect("poll");
        assert_eq!(poll, options(&["a", "b", "c", "d"]));
        assert_eq!(empty_tally(Some(poll.as_slice())), Some(vec![0, 0, 0, 0]));
    }

    #[test]
    fn option_index_is_bounds_checked() {
        let poll = options(&["x", "y"]);

        assert_eq!(check_option(Some(poll.as_slice()), 1).expect("in range"), 1);
        assert!(matches!(
            check_option(Some(poll.as_slice()), 2),
            Err(BoardError::InvalidOption { index: 2, options: 2 })
        ));
        assert!(matches!(
            check_option(Some(poll.as_slice()), -1),
            Err(BoardError::InvalidOption { .. })
        ));
        assert!(matches!(check_option(None, 0), Err(BoardError::NoPoll)));
    }

    #[test]
    fn upvotes_can_go_negative() {
        assert_eq!(add_upvotes(0, -5), -5);
        assert_eq!(add_upvotes(i64::MAX, 1), i64::MAX);
    }
}
