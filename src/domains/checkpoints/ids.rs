use super::entity::Leaf;
use crate::shared::text::single_line;

const ANCESTRY_LEAVES: usize = 3;
const ANCESTRY_PROMPT_LEN: usize = 60;

/// Branch ids are minted from a monotonically increasing sequence: b0001,
/// b0002, ...
pub fn format_branch_id(seq: i64) -> String {
    format!("b{seq:04}")
}

/// Leaf ids pair a three-digit major with a minor letter. The zero-based
/// ordinal 0 maps to 001a, 25 to 001z, 26 rolls over to 002a.
pub fn leaf_id_for_seq(seq: i64) -> String {
    let major = seq / 26 + 1;
    let minor = (b'a' + (seq % 26) as u8) as char;
    format!("{major:03}{minor}")
}

/// Render the trail of recent leaves, oldest first, as a single audit line.
/// Input is newest-first as the store returns it.
pub fn ancestry_summary(leaves_newest_first: &[Leaf]) -> String {
    let mut parts: Vec<String> = leaves_newest_first
        .iter()
        .take(ANCESTRY_LEAVES)
        .map(|leaf| {
            format!(
                "{}: {}",
                leaf.leaf_id,
                single_line(&leaf.prompt, ANCESTRY_PROMPT_LEN)
            )
        })
        .collect();
    parts.reverse();
    parts.join(" | ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn leaf(leaf_id: &str, seq: i64, prompt: &str) -> Leaf {
        Leaf {
            branch_id: "b0001".to_string(),
            leaf_id: leaf_id.to_string(),
            seq,
            prompt: prompt.to_string(),
            summary: String::new(),
            git_commit: "abc".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn branch_ids_are_zero_padded() {
        assert_eq!(format_branch_id(1), "b0001");
        assert_eq!(format_branch_id(42), "b0042");
        assert_eq!(format_branch_id(10000), "b10000");
    }

    #[test]
    fn leaf_ids_roll_over_at_z() {
        assert_eq!(leaf_id_for_seq(0), "001a");
        assert_eq!(leaf_id_for_seq(25), "001z");
        assert_eq!(leaf_id_for_seq(26), "002a");
        assert_eq!(leaf_id_for_seq(27), "002b");
        assert_eq!(leaf_id_for_seq(52), "003a");
    }

    #[test]
    fn ancestry_renders_oldest_first_capped_at_three() {
        let leaves = vec![
            leaf("001d", 3, "fourth"),
            leaf("001c", 2, "third"),
            leaf("001b", 1, "second"),
            leaf("001a", 0, "first"),
        ];
        assert_eq!(
            ancestry_summary(&leaves),
            "001b: second | 001c: third | 001d: fourth"
        );
    }

    #[test]
    fn ancestry_truncates_long_prompts() {
        let long = "x".repeat(100);
        let rendered = ancestry_summary(&[leaf("001a", 0, &long)]);
        assert!(rendered.starts_with("001a: "));
        assert!(rendered.ends_with('…'));
        assert_eq!(rendered.chars().count(), "001a: ".chars().count() + 60);
    }

    #[test]
    fn ancestry_of_nothing_is_empty() {
        assert_eq!(ancestry_summary(&[]), "");
    }
}
