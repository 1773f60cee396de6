//! Visit-count policy extraction at temperature τ.

use crate::node::Node;
use dama_core::{move_to_action_index, Position, POLICY_SIZE};

/// τ below this snaps to argmax.
const ONE_HOT_TEMPERATURE: f32 = 1e-3;

/// Distribution over the action space proportional to root child visits
/// raised to 1/τ. All-zero when the root has no visited children; one-hot
/// on the most-visited child when τ ≈ 0 (first-seen tie-break).
pub fn get_policy(root: &Node, temperature: f32, position: &Position) -> [f32; POLICY_SIZE] {
    let mut policy = [0.0f32; POLICY_SIZE];
    let side = position.side_to_move();
    if root.num_children() == 0 {
        return policy;
    }
    let total: u64 = root.children().map(|c| u64::from(c.visits())).sum();
    if total < 1 {
        return policy;
    }

    if temperature < ONE_HOT_TEMPERATURE {
        let mut best: Option<(&Node, u32)> = None;
        for child in root.children() {
            let visits = child.visits();
            if best.map_or(true, |(_, most)| visits > most) {
                best = Some((child, visits));
            }
        }
        if let Some((child, _)) = best {
            if let Some(index) = move_to_action_index(child.move_from_parent(), side) {
                policy[index] = 1.0;
            }
        }
        return policy;
    }

    // Normalize by the largest count before exponentiating so small τ
    // cannot overflow.
    let inv_t = 1.0 / temperature;
    let most = root.children().map(Node::visits).max().unwrap_or(1).max(1) as f32;
    let mut sum = 0.0f32;
    for child in root.children() {
        let weight = (child.visits() as f32 / most).powf(inv_t);
        if let Some(index) = move_to_action_index(child.move_from_parent(), side) {
            policy[index] += weight;
            sum += weight;
        }
    }
    if sum > 0.0 {
        for p in &mut policy {
            *p /= sum;
        }
    }
    policy
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;
    use crate::expand::expand_vanilla;
    use crate::node::root_create;
    use crate::search::SearchStats;
    use crate::MctsConfig;

    fn build_root<'a>(arena: &'a Arena, visit_plan: &[u32]) -> &'a Node {
        let config = MctsConfig::pure_vanilla();
        let root = root_create(&Position::initial(), arena, &config).unwrap();
        let mut stats = SearchStats::default();
        let mut i = 0;
        while let Some(child) =
            expand_vanilla(root, arena, &config, None, None, &mut stats).unwrap()
        {
            for _ in 0..visit_plan.get(i).copied().unwrap_or(0) {
                child.record_visit();
                root.record_visit();
            }
            i += 1;
        }
        root
    }

    #[test]
    fn test_zero_vector_without_visits() {
        let arena = Arena::new(1 << 22);
        let root = build_root(&arena, &[]);
        let policy = get_policy(root, 1.0, root.position());
        assert!(policy.iter().all(|&p| p == 0.0));
    }

    #[test]
    fn test_one_hot_at_zero_temperature() {
        let arena = Arena::new(1 << 22);
        let root = build_root(&arena, &[3, 10, 2, 1, 1, 1, 1]);
        let policy = get_policy(root, 0.0, root.position());
        let ones = policy.iter().filter(|&&p| p == 1.0).count();
        let zeros = policy.iter().filter(|&&p| p == 0.0).count();
        assert_eq!(ones, 1);
        assert_eq!(zeros, POLICY_SIZE - 1);

        let best = root.children().max_by_key(|c| c.visits()).unwrap();
        let index =
            move_to_action_index(best.move_from_parent(), root.position().side_to_move()).unwrap();
        assert_eq!(policy[index], 1.0);
    }

    #[test]
    fn test_temperature_one_is_proportional() {
        let arena = Arena::new(1 << 22);
        let root = build_root(&arena, &[1, 3, 0, 0, 0, 0, 0]);
        let policy = get_policy(root, 1.0, root.position());
        let sum: f32 = policy.iter().sum();
        assert!((sum - 1.0).abs() < 1e-4);

        let side = root.position().side_to_move();
        let a = root.child(0);
        let b = root.child(1);
        let pa = policy[move_to_action_index(a.move_from_parent(), side).unwrap()];
        let pb = policy[move_to_action_index(b.move_from_parent(), side).unwrap()];
        assert!((pa - 0.25).abs() < 1e-4);
        assert!((pb - 0.75).abs() < 1e-4);
    }

    #[test]
    fn test_high_temperature_flattens() {
        let arena = Arena::new(1 << 22);
        let root = build_root(&arena, &[1, 8, 1, 1, 1, 1, 1]);
        let policy = get_policy(root, 1000.0, root.position());
        let nonzero: Vec<f32> = policy.iter().copied().filter(|&p| p > 0.0).collect();
        assert_eq!(nonzero.len(), 7);
        let min = nonzero.iter().cloned().fold(f32::INFINITY, f32::min);
        let max = nonzero.iter().cloned().fold(0.0f32, f32::max);
        assert!(max / min < 1.01, "τ→∞ must approach uniform");
    }

    #[test]
    fn test_extraction_is_idempotent() {
        let arena = Arena::new(1 << 22);
        let root = build_root(&arena, &[2, 5, 1, 0, 0, 0, 0]);
        let a = get_policy(root, 1.0, root.position());
        let b = get_policy(root, 1.0, root.position());
        assert_eq!(a, b);
    }
}
