//! Mod priority and winner selection.
//!
//! A mod's priority is its index in the configured `mod_order` (later is higher).
//! Mods missing from the order are *unranked*: below every ranked mod, and never
//! equal to one.

use crate::patchers::ShaderPatcherMatch;
use std::collections::{BTreeSet, HashMap};

/// Mod name to priority, fixed for a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModPriority {
    ranks: HashMap<String, usize>,
}

impl ModPriority {
    pub fn from_order(order: &[String]) -> Self {
        let ranks = order
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Self { ranks }
    }

    /// Priority of a mod, `None` when unranked or when there is no owner.
    pub fn of(&self, owner: Option<&str>) -> Option<usize> {
        owner.and_then(|name| self.ranks.get(name).copied())
    }

    pub fn len(&self) -> usize {
        self.ranks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranks.is_empty()
    }
}

/// Pick the winning match for a shape.
///
/// Candidates ranked strictly below a ranked mesh are rejected. Among the rest
/// the strictly highest priority wins and ties keep the earliest candidate.
///
/// # Arguments
///
/// * `matches` - Candidates in patcher order
/// * `mesh_priority` - Priority of the mod providing the mesh
/// * `priority` - Priority of every ranked mod
pub fn get_winning_match<'m>(
    matches: &'m [ShaderPatcherMatch],
    mesh_priority: Option<usize>,
    priority: &ModPriority,
) -> Option<&'m ShaderPatcherMatch> {
    let mut best: Option<(&ShaderPatcherMatch, Option<usize>)> = None;
    for candidate in matches {
        let rank = priority.of(candidate.owner.as_deref());
        if let (Some(mesh), Some(rank)) = (mesh_priority, rank) {
            if rank < mesh {
                tracing::trace!(
                    "Rejecting {} from {:?}: below mesh priority",
                    candidate.matched.matched_path,
                    candidate.owner
                );
                continue;
            }
        }
        // Option orders None below every Some, which is the unranked rule.
        match best {
            Some((_, best_rank)) if rank <= best_rank => {}
            _ => best = Some((candidate, rank)),
        }
    }
    best.map(|(m, _)| m)
}

/// Decides the order of mods that compete for the same shapes.
pub trait ModOrderResolver: Send + Sync {
    /// # Arguments
    ///
    /// * `conflicting` - Mods that compete with another mod on at least one shape
    /// * `prior` - The current order, lowest priority first
    ///
    /// Returns the new order, lowest priority first.
    fn resolve(&self, conflicting: &BTreeSet<String>, prior: &[String]) -> Vec<String>;
}

/// Keeps the prior order and appends newcomers in name order.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeepPriorOrder;

impl ModOrderResolver for KeepPriorOrder {
    fn resolve(&self, conflicting: &BTreeSet<String>, prior: &[String]) -> Vec<String> {
        let mut order = prior.to_vec();
        for name in conflicting {
            if !order.contains(name) {
                order.push(name.clone());
            }
        }
        order
    }
}

/// Run a resolver and report whether the order changed.
pub fn resolve_mod_order(
    resolver: &dyn ModOrderResolver,
    conflicting: &BTreeSet<String>,
    prior: &[String],
) -> (Vec<String>, bool) {
    let order = resolver.resolve(conflicting, prior);
    let changed = order != prior;
    if changed {
        tracing::info!("Mod order updated: {} mods ranked", order.len());
    }
    (order, changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patchers::{PatcherMatch, ShaderFamily};
    use sp_mesh::TextureSlot;
    use sp_vfs::VirtualPath;

    fn candidate(path: &str, owner: Option<&str>) -> ShaderPatcherMatch {
        ShaderPatcherMatch {
            family: ShaderFamily::VanillaParallax,
            matched: PatcherMatch::new(VirtualPath::new(path), TextureSlot::Normal),
            owner: owner.map(str::to_string),
            transform: None,
        }
    }

    fn order(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_higher_priority_wins_and_low_rejected() {
        // A = 1, B = 3, C unranked; mesh = 2
        let priority = ModPriority::from_order(&order(&["X", "A", "M", "B"]));
        let matches = vec![
            candidate("a_p.dds", Some("A")),
            candidate("b_p.dds", Some("B")),
            candidate("c_p.dds", Some("C")),
        ];
        let winner = get_winning_match(&matches, Some(2), &priority).unwrap();
        assert_eq!(winner.owner.as_deref(), Some("B"));
    }

    #[test]
    fn test_unranked_mesh_keeps_first_on_tie() {
        let priority = ModPriority::from_order(&order(&["A"]));
        let matches = vec![
            candidate("first_p.dds", Some("A")),
            candidate("second_p.dds", Some("A")),
        ];
        let winner = get_winning_match(&matches, None, &priority).unwrap();
        assert_eq!(winner.matched.matched_path.as_str(), "first_p.dds");

        let unranked = vec![candidate("x_p.dds", None), candidate("y_p.dds", Some("Z"))];
        let winner = get_winning_match(&unranked, None, &priority).unwrap();
        assert_eq!(winner.matched.matched_path.as_str(), "x_p.dds");
    }

    #[test]
    fn test_ranked_beats_unranked() {
        let priority = ModPriority::from_order(&order(&["A"]));
        let matches = vec![candidate("u_p.dds", None), candidate("a_p.dds", Some("A"))];
        let winner = get_winning_match(&matches, None, &priority).unwrap();
        assert_eq!(winner.owner.as_deref(), Some("A"));
    }

    #[test]
    fn test_no_survivor_is_no_winner() {
        let priority = ModPriority::from_order(&order(&["A", "B"]));
        let matches = vec![candidate("a_p.dds", Some("A"))];
        assert!(get_winning_match(&matches, Some(1), &priority).is_none());
        assert!(get_winning_match(&[], None, &priority).is_none());
    }

    #[test]
    fn test_keep_prior_order_appends_newcomers() {
        let conflicting = BTreeSet::from(["Zed".to_string(), "Alpha".to_string(), "B".to_string()]);
        let (resolved, changed) = resolve_mod_order(&KeepPriorOrder, &conflicting, &order(&["B"]));
        assert_eq!(resolved, order(&["B", "Alpha", "Zed"]));
        assert!(changed);

        let (same, changed) = resolve_mod_order(&KeepPriorOrder, &BTreeSet::new(), &resolved);
        assert_eq!(same, resolved);
        assert!(!changed);
    }
}
