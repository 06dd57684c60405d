/// Pairwise operational transformation for linear text
///
/// `transform(a, b)` returns `(a', b')` such that applying `a` then `b'` yields the
/// same text as applying `b` then `a'`. Every replica relies on this property, so the
/// functions here are pure and total for any two operations defined on the same text.
use crate::document::char_len;
use crate::{CollaboratorId, Operation, OperationKind, Span};

/// Why a transformation had to pick an order between the two operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TieBreak {
    /// Both operations inserted at the same offset; `winner` keeps the lower position
    ConcurrentInsert {
        position: usize,
        winner: CollaboratorId,
    },
    /// Both operations deleted some of the same characters
    OverlappingDelete { overlap: usize },
}

/// Result of transforming two concurrent operations against each other
#[derive(Debug, Clone)]
pub struct Transformed {
    /// First operation, re-expressed to apply after the second
    pub a: Operation,
    /// Second operation, re-expressed to apply after the first
    pub b: Operation,
    pub tie_break: Option<TieBreak>,
}

/// Transform two operations that were computed against the same document state.
pub fn transform(a: &Operation, b: &Operation) -> Transformed {
    let (a_kind, b_kind, tie_break) = transform_kinds(a.kind(), a.origin(), b.kind(), b.origin());

    Transformed {
        a: a.with_kind(a_kind),
        b: b.with_kind(b_kind),
        tie_break,
    }
}

/// Kind-level transformation; origins decide equal-position inserts.
pub fn transform_kinds(
    a: &OperationKind,
    a_origin: &CollaboratorId,
    b: &OperationKind,
    b_origin: &CollaboratorId,
) -> (OperationKind, OperationKind, Option<TieBreak>) {
    use OperationKind::*;

    match (a, b) {
        (
            Insert {
                position: pa,
                content: ca,
            },
            Insert {
                position: pb,
                content: cb,
            },
        ) => {
            if ca.is_empty() || cb.is_empty() {
                return (a.clone(), b.clone(), None);
            }

            // Decided once so both outputs agree even when origins are equal
            let a_first = pa < pb || (pa == pb && a_origin <= b_origin);
            let tie_break = (pa == pb).then(|| TieBreak::ConcurrentInsert {
                position: *pa,
                winner: if a_first {
                    a_origin.clone()
                } else {
                    b_origin.clone()
                },
            });

            if a_first {
                let shifted = OperationKind::insert(pb + char_len(ca), cb.clone());
                (a.clone(), shifted, tie_break)
            } else {
                let shifted = OperationKind::insert(pa + char_len(cb), ca.clone());
                (shifted, b.clone(), tie_break)
            }
        }

        (Insert { position, content }, Delete { spans }) => {
            let (insert, delete) = insert_against_delete(*position, content, spans);
            (insert, delete, None)
        }

        (Delete { spans }, Insert { position, content }) => {
            let (insert, delete) = insert_against_delete(*position, content, spans);
            (delete, insert, None)
        }

        (Delete { spans: sa }, Delete { spans: sb }) => {
            let overlap = overlap_len(sa, sb);
            let a_prime = Delete {
                spans: map_spans_through_delete(&subtract(sa, sb), sb),
            };
            let b_prime = Delete {
                spans: map_spans_through_delete(&subtract(sb, sa), sa),
            };
            let tie_break = (overlap > 0).then_some(TieBreak::OverlappingDelete { overlap });
            (a_prime, b_prime, tie_break)
        }
    }
}

/// Transform `op` through a sequence of operations applied after the state it was
/// computed against. Only the rebased `op` is kept.
pub fn transform_through<'a>(
    op: &OperationKind,
    origin: &CollaboratorId,
    applied: impl IntoIterator<Item = &'a Operation>,
) -> OperationKind {
    applied.into_iter().fold(op.clone(), |kind, other| {
        transform_kinds(&kind, origin, other.kind(), other.origin()).0
    })
}

/// Where a caret at `offset` ends up after `kind` is applied.
///
/// An insert at or before the caret pushes it right; a delete spanning it clamps it
/// to the start of the deleted range.
pub fn map_offset(offset: usize, kind: &OperationKind) -> usize {
    match kind {
        OperationKind::Insert { position, content } => {
            if !content.is_empty() && *position <= offset {
                offset + char_len(content)
            } else {
                offset
            }
        }
        OperationKind::Delete { spans } => map_through_delete(offset, spans),
    }
}

fn insert_against_delete(
    position: usize,
    content: &str,
    spans: &[Span],
) -> (OperationKind, OperationKind) {
    let insert = OperationKind::insert(map_through_delete(position, spans), content);
    let inserted = char_len(content);
    if inserted == 0 {
        return (
            insert,
            OperationKind::Delete {
                spans: spans.to_vec(),
            },
        );
    }

    let mut shifted = Vec::with_capacity(spans.len() + 1);
    for span in spans.iter().filter(|s| !s.is_empty()) {
        if span.start >= position {
            shifted.push(Span::new(span.start + inserted, span.len));
        } else if span.end() > position {
            // Insert landed inside the deleted range: keep the inserted text
            shifted.push(Span::new(span.start, position - span.start));
            shifted.push(Span::new(position + inserted, span.end() - position));
        } else {
            shifted.push(*span);
        }
    }

    (
        insert,
        OperationKind::Delete {
            spans: normalize(shifted),
        },
    )
}

/// Offset after removing `spans`; offsets inside a removed span clamp to its start
fn map_through_delete(offset: usize, spans: &[Span]) -> usize {
    let removed: usize = spans
        .iter()
        .filter(|s| s.start < offset)
        .map(|s| s.len.min(offset - s.start))
        .sum();
    offset - removed
}

/// Spans of `spans` not covered by `other`
fn subtract(spans: &[Span], other: &[Span]) -> Vec<Span> {
    let mut result = Vec::new();
    for span in spans.iter().filter(|s| !s.is_empty()) {
        let mut cursor = span.start;
        let end = span.end();
        for cut in other {
            if cut.end() <= cursor || cut.start >= end {
                continue;
            }
            if cut.start > cursor {
                result.push(Span::new(cursor, cut.start - cursor));
            }
            cursor = cursor.max(cut.end());
            if cursor >= end {
                break;
            }
        }
        if cursor < end {
            result.push(Span::new(cursor, end - cursor));
        }
    }
    result
}

fn map_spans_through_delete(spans: &[Span], through: &[Span]) -> Vec<Span> {
    normalize(
        spans
            .iter()
            .map(|s| Span::new(map_through_delete(s.start, through), s.len))
            .collect(),
    )
}

fn overlap_len(a: &[Span], b: &[Span]) -> usize {
    a.iter()
        .flat_map(|x| b.iter().map(move |y| (x, y)))
        .map(|(x, y)| x.end().min(y.end()).saturating_sub(x.start.max(y.start)))
        .sum()
}

/// Drop empty spans and merge touching ones; input must be sorted
fn normalize(spans: Vec<Span>) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::with_capacity(spans.len());
    for span in spans.into_iter().filter(|s| !s.is_empty()) {
        match merged.last_mut() {
            Some(last) if last.end() == span.start => last.len += span.len,
            _ => merged.push(span),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn id(name: &str) -> CollaboratorId {
        CollaboratorId::new(name)
    }

    fn apply(text: &str, kind: &OperationKind) -> String {
        kind.validate(char_len(text)).expect("operation fits text");
        let mut out = text.to_string();
        kind.apply_to(&mut out);
        out
    }

    /// Apply both orders and assert they agree
    fn converge(text: &str, a: &OperationKind, b: &OperationKind) -> String {
        let (a2, b2, _) = transform_kinds(a, &id("a"), b, &id("b"));
        let left = apply(&apply(text, a), &b2);
        let right = apply(&apply(text, b), &a2);
        assert_eq!(left, right, "a={:?} b={:?}", a, b);
        left
    }

    #[test]
    fn test_insert_insert_tie_break_by_origin() {
        let x = OperationKind::insert(1, "X");
        let y = OperationKind::insert(1, "Y");

        // "bob" > "alice", so alice's Y goes first
        let (x2, y2, tie) = transform_kinds(&x, &id("bob"), &y, &id("alice"));
        assert_eq!(x2, OperationKind::insert(2, "X"));
        assert_eq!(y2, y);
        assert_eq!(
            tie,
            Some(TieBreak::ConcurrentInsert {
                position: 1,
                winner: id("alice")
            })
        );

        assert_eq!(apply(&apply("ab", &x), &y2), "aYXb");
        assert_eq!(apply(&apply("ab", &y), &x2), "aYXb");
    }

    #[test]
    fn test_insert_insert_same_decision_in_both_directions() {
        let x = OperationKind::insert(2, "xx");
        let y = OperationKind::insert(2, "yy");

        let (x_ab, _, _) = transform_kinds(&x, &id("b"), &y, &id("a"));
        let (_, x_ba, _) = transform_kinds(&y, &id("a"), &x, &id("b"));
        assert_eq!(x_ab, x_ba);
    }

    #[test]
    fn test_insert_before_insert_shifts_later() {
        let a = OperationKind::insert(0, "abc");
        let b = OperationKind::insert(4, "Z");
        let (a2, b2, tie) = transform_kinds(&a, &id("z"), &b, &id("a"));
        assert_eq!(a2, a);
        assert_eq!(b2, OperationKind::insert(7, "Z"));
        assert!(tie.is_none());
    }

    #[test]
    fn test_delete_swallowing_end_insert() {
        // "hello": delete [0,5) concurrent with insert "!" at 5
        let delete = OperationKind::delete(0, 5);
        let insert = OperationKind::insert(5, "!");
        let (_, insert2, _) = transform_kinds(&delete, &id("a"), &insert, &id("b"));
        assert_eq!(insert2, OperationKind::insert(0, "!"));
        assert_eq!(converge("hello", &delete, &insert), "!");
    }

    #[test]
    fn test_insert_inside_delete_survives() {
        let delete = OperationKind::delete(1, 4);
        let insert = OperationKind::insert(3, "XY");
        let (delete2, insert2, _) = transform_kinds(&delete, &id("a"), &insert, &id("b"));

        assert_eq!(
            delete2,
            OperationKind::Delete {
                spans: vec![Span::new(1, 2), Span::new(5, 2)]
            }
        );
        assert_eq!(insert2, OperationKind::insert(1, "XY"));
        assert_eq!(converge("abcdefg", &delete, &insert), "aXYfg");
    }

    #[test]
    fn test_insert_at_delete_start_shifts_delete() {
        let delete = OperationKind::delete(2, 2);
        let insert = OperationKind::insert(2, "__");
        assert_eq!(converge("abcdef", &delete, &insert), "ab__ef");
    }

    #[test]
    fn test_overlapping_deletes() {
        let first = OperationKind::delete(0, 3);
        let second = OperationKind::delete(2, 2);
        let (first2, second2, tie) = transform_kinds(&first, &id("a"), &second, &id("b"));

        assert_eq!(first2, OperationKind::delete(0, 2));
        assert_eq!(second2, OperationKind::delete(0, 1));
        assert_eq!(tie, Some(TieBreak::OverlappingDelete { overlap: 1 }));
        assert_eq!(converge("abcde", &first, &second), "e");

        // Union of [0,3) and [2,5) covers the whole text
        assert_eq!(
            converge("abcde", &OperationKind::delete(0, 3), &OperationKind::delete(2, 3)),
            ""
        );
    }

    #[test]
    fn test_fully_consumed_delete_becomes_noop() {
        let inner = OperationKind::delete(2, 2);
        let outer = OperationKind::delete(1, 5);
        let (inner2, outer2, _) = transform_kinds(&inner, &id("a"), &outer, &id("b"));

        assert!(inner2.is_noop());
        assert_eq!(outer2, OperationKind::delete(1, 3));
        assert_eq!(converge("abcdefgh", &inner, &outer), "agh");
    }

    #[test]
    fn test_zero_length_operations_are_identity() {
        let empty_insert = OperationKind::insert(2, "");
        let empty_delete = OperationKind::delete(1, 0);
        let insert = OperationKind::insert(1, "Q");

        let (_, insert2, _) = transform_kinds(&empty_insert, &id("a"), &insert, &id("b"));
        assert_eq!(insert2, insert);
        let (_, insert3, _) = transform_kinds(&empty_delete, &id("a"), &insert, &id("b"));
        assert_eq!(insert3, insert);
        assert_eq!(converge("abc", &empty_delete, &insert), "aQbc");
    }

    #[test]
    fn test_map_offset_rules() {
        let insert = OperationKind::insert(2, "abc");
        assert_eq!(map_offset(1, &insert), 1);
        assert_eq!(map_offset(2, &insert), 5);
        assert_eq!(map_offset(4, &insert), 7);

        let delete = OperationKind::delete(2, 3);
        assert_eq!(map_offset(1, &delete), 1);
        assert_eq!(map_offset(3, &delete), 2);
        assert_eq!(map_offset(5, &delete), 2);
        assert_eq!(map_offset(8, &delete), 5);
    }

    #[test]
    fn test_transform_through_sequence() {
        let applied = vec![
            Operation::insert(id("b"), 0, 0, "12"),
            Operation::delete(id("c"), 1, 4, 2),
        ];
        // Defined on "abcdef": delete "e"
        let rebased = transform_through(&OperationKind::delete(4, 1), &id("a"), &applied);

        // "abcdef" -> "12abcdef" -> "12abef" -> delete "e"
        assert_eq!(rebased, OperationKind::delete(4, 1));
        assert_eq!(apply("12abef", &rebased), "12abf");
    }

    #[test]
    fn test_transform_keeps_operation_identity() {
        let a = Operation::insert(id("a"), 0, 0, "x");
        let b = Operation::insert(id("b"), 0, 0, "y");
        let t = transform(&a, &b);

        assert_eq!(t.a.id(), a.id());
        assert_eq!(t.b.id(), b.id());
        assert_eq!(t.b.kind(), &OperationKind::insert(1, "y"));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn arb_kind(len: usize) -> impl Strategy<Value = OperationKind> {
            prop_oneof![
                (0..=len, "[a-z]{0,3}").prop_map(|(p, s)| OperationKind::insert(p, s)),
                (0..=len)
                    .prop_flat_map(move |p| (Just(p), 0..=len - p))
                    .prop_map(|(p, l)| OperationKind::delete(p, l)),
            ]
        }

        fn arb_case() -> impl Strategy<Value = (String, OperationKind, OperationKind)> {
            "[a-z]{0,12}".prop_flat_map(|text| {
                let len = text.chars().count();
                (Just(text), arb_kind(len), arb_kind(len))
            })
        }

        proptest! {
            #[test]
            fn prop_transform_converges((text, a, b) in arb_case()) {
                converge(&text, &a, &b);
            }

            #[test]
            fn prop_transformed_split_delete_converges(
                (text, a, b) in arb_case(),
                extra in (0usize..4, "[a-z]{1,2}")
            ) {
                // Second round: a transformed (possibly split) delete against a fresh insert
                let (a2, _, _) = transform_kinds(&a, &id("a"), &b, &id("b"));
                let after_b = apply(&text, &b);
                let len = char_len(&after_b);
                let insert = OperationKind::insert(extra.0.min(len), extra.1);
                converge(&after_b, &a2, &insert);
            }
        }
    }
}
