//! Group membership diff for one provider login
//!
//! Group names are a single flat namespace shared by every provider and by
//! manual assignment. A provider may only take away memberships it granted
//! itself, which is what the per-link snapshot of previously claimed names
//! records. A name claimed by two providers is one group.

use std::collections::BTreeSet;

/// Membership changes one login applies
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupDiff {
    /// Claimed names the identity does not hold yet
    pub to_add: BTreeSet<String>,
    /// Names this provider granted before, no longer claims, and the
    /// identity still holds
    pub to_remove: BTreeSet<String>,
}

impl GroupDiff {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// Trim names, drop blanks, collapse duplicates
pub fn normalize_groups<I, S>(names: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names
        .into_iter()
        .map(|name| name.as_ref().trim().to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

/// Compute the diff from the provider's previous snapshot (`prior`), what it
/// claims now (`claimed`) and the identity's full membership (`current`).
///
/// Memberships in `current` that are not in `prior` are never removed.
pub fn diff_groups(
    prior: &BTreeSet<String>,
    claimed: &BTreeSet<String>,
    current: &BTreeSet<String>,
) -> GroupDiff {
    let to_add = claimed.difference(current).cloned().collect();
    let to_remove = prior
        .difference(claimed)
        .filter(|name| current.contains(*name))
        .cloned()
        .collect();
    GroupDiff { to_add, to_remove }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_first_login_adds_everything() {
        let diff = diff_groups(&set(&[]), &set(&["A", "B"]), &set(&[]));
        assert_eq!(diff.to_add, set(&["A", "B"]));
        assert!(diff.to_remove.is_empty());
    }

    #[test]
    fn test_manual_membership_survives() {
        let diff = diff_groups(&set(&["A", "B"]), &set(&["A", "C"]), &set(&["A", "B", "M"]));
        assert_eq!(diff.to_add, set(&["C"]));
        assert_eq!(diff.to_remove, set(&["B"]));
    }

    #[test]
    fn test_other_provider_groups_survive() {
        // existing3 was granted by this provider, Foo by someone else
        let diff = diff_groups(
            &set(&["existing3"]),
            &set(&["g1", "g2"]),
            &set(&["Foo", "existing3"]),
        );
        assert_eq!(diff.to_add, set(&["g1", "g2"]));
        assert_eq!(diff.to_remove, set(&["existing3"]));
    }

    #[test]
    fn test_removed_elsewhere_is_not_removed_again() {
        let diff = diff_groups(&set(&["A", "B"]), &set(&["A"]), &set(&["A"]));
        assert!(diff.is_empty());
    }

    #[test]
    fn test_claiming_held_group_adds_nothing() {
        let diff = diff_groups(&set(&[]), &set(&["M"]), &set(&["M"]));
        assert!(diff.is_empty());
    }

    #[test]
    fn test_replay_converges() {
        let prior = set(&["A", "B"]);
        let claimed = set(&["A", "C"]);
        let mut current = set(&["A", "B", "M"]);

        let diff = diff_groups(&prior, &claimed, &current);
        current.extend(diff.to_add.iter().cloned());
        current.retain(|g| !diff.to_remove.contains(g));
        assert_eq!(current, set(&["A", "C", "M"]));

        // Second run sees the snapshot written by the first
        let again = diff_groups(&claimed, &claimed, &current);
        assert!(again.is_empty());
    }

    #[test]
    fn test_normalize_groups() {
        let names = normalize_groups(["  Everyone ", "", "developers", "Everyone", "   "]);
        assert_eq!(names, set(&["Everyone", "developers"]));
    }
}
