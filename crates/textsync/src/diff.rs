/// Compile a whole-buffer change into operations
use crate::document::char_len;
use crate::OperationKind;

/// Operations turning `old` into `new`, to be applied in order.
///
/// The changed region is found by trimming the common prefix and suffix, so the result
/// is at most one delete followed by one insert, both at the same offset.
pub fn diff_edits(old: &str, new: &str) -> Vec<OperationKind> {
    let old_chars: Vec<char> = old.chars().collect();
    let new_chars: Vec<char> = new.chars().collect();

    let prefix = old_chars
        .iter()
        .zip(new_chars.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let max_suffix = old_chars.len().min(new_chars.len()) - prefix;
    let suffix = old_chars
        .iter()
        .rev()
        .zip(new_chars.iter().rev())
        .take(max_suffix)
        .take_while(|(a, b)| a == b)
        .count();

    let removed = old_chars.len() - prefix - suffix;
    let inserted: String = new_chars[prefix..new_chars.len() - suffix].iter().collect();

    let mut edits = Vec::with_capacity(2);
    if removed > 0 {
        edits.push(OperationKind::delete(prefix, removed));
    }
    if char_len(&inserted) > 0 {
        edits.push(OperationKind::insert(prefix, inserted));
    }
    edits
}

#[cfg(test)]
mod tests {
    use super::*;

    fn replay(old: &str, edits: &[OperationKind]) -> String {
        let mut text = old.to_string();
        for edit in edits {
            edit.validate(char_len(&text)).unwrap();
            edit.apply_to(&mut text);
        }
        text
    }

    #[test]
    fn test_unchanged_buffer_yields_nothing() {
        assert!(diff_edits("same", "same").is_empty());
    }

    #[test]
    fn test_replacement_in_the_middle() {
        let edits = diff_edits("hello world", "hello there world");
        assert_eq!(edits, vec![OperationKind::insert(6, "there ")]);

        let edits = diff_edits("abcdef", "abXYef");
        assert_eq!(
            edits,
            vec![OperationKind::delete(2, 2), OperationKind::insert(2, "XY")]
        );
        assert_eq!(replay("abcdef", &edits), "abXYef");
    }

    #[test]
    fn test_repeated_characters_do_not_overlap() {
        // Prefix and suffix must not claim the same character
        let edits = diff_edits("aaa", "aaaa");
        assert_eq!(replay("aaa", &edits), "aaaa");
        assert_eq!(edits.len(), 1);

        let edits = diff_edits("abab", "ab");
        assert_eq!(replay("abab", &edits), "ab");
    }

    #[test]
    fn test_multibyte_offsets() {
        let edits = diff_edits("héllo", "hé!llo");
        assert_eq!(edits, vec![OperationKind::insert(2, "!")]);
    }
}
