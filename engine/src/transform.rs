//! Operational transformation of components and operations.
//!
//! `transform_component(a, b, side)` rewrites `a` so it has the same effect
//! when applied after `b`. All arithmetic is in codepoints.
//!
//! # Convergence
//!
//! For operations `a` and `b` made against the same text `c`:
//!
//! ```text
//! apply(apply(c, a), transform_ops(b, a, Right))
//!     == apply(apply(c, b), transform_ops(a, b, Left))
//! ```
//!
//! `transform_x` computes both sides of that square in one pass.

use crate::text::split_at_codepoint;
use crate::{Component, Operation};
use serde::{Deserialize, Serialize};

/// Which operation wins when two inserts land on the same position.
///
/// With `Left` the transformed insert stays before the other one; with
/// `Right` it is shifted past it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

/// Transform `c1` against `c2`, returning the component(s) that apply after
/// `c2` has been applied.
///
/// Only a delete bisected by an insert produces two components; a delete
/// swallowed by another delete produces none.
pub fn transform_component(c1: &Component, c2: &Component, side: Side) -> Vec<Component> {
    match (c1, c2) {
        (Component::Insert { position, text }, Component::Insert { position: other, .. }) => {
            if *position < *other || (*position == *other && side == Side::Left) {
                vec![c1.clone()]
            } else {
                vec![Component::insert(position.saturating_add(c2.len()), text.clone())]
            }
        }

        (Component::Insert { position, text }, Component::Delete { position: other, .. }) => {
            let deleted = c2.len();
            let position = if *position <= *other {
                *position
            } else if *position >= other.saturating_add(deleted) {
                position - deleted
            } else {
                // Inside the deleted span: collapse onto its start.
                *other
            };
            vec![Component::insert(position, text.clone())]
        }

        (Component::Delete { position, text }, Component::Insert { position: other, .. }) => {
            let end = position.saturating_add(c1.len());
            if *other >= end {
                vec![c1.clone()]
            } else if *other <= *position {
                vec![Component::delete(position.saturating_add(c2.len()), text.clone())]
            } else {
                let (before, after) = split_at_codepoint(text, other - position);
                vec![
                    Component::delete(*position, before),
                    Component::delete(position.saturating_add(c2.len()), after),
                ]
            }
        }

        (Component::Delete { position, text }, Component::Delete { position: other, .. }) => {
            transform_delete_delete(*position, text, c1.len(), *other, c2.len())
        }
    }
}

/// Delete `[p1, p1 + len1)` against an already applied delete `[p2, p2 + len2)`.
fn transform_delete_delete(
    p1: usize,
    text: &str,
    len1: usize,
    p2: usize,
    len2: usize,
) -> Vec<Component> {
    let end1 = p1.saturating_add(len1);
    let end2 = p2.saturating_add(len2);

    if end1 <= p2 {
        // Entirely before the other delete.
        vec![Component::delete(p1, text)]
    } else if p1 >= end2 {
        // Entirely after it.
        vec![Component::delete(p1 - len2, text)]
    } else if p2 <= p1 && end2 >= end1 {
        // Everything this delete wanted is already gone.
        Vec::new()
    } else if p2 <= p1 {
        // The other delete covers our start.
        let (_, kept) = split_at_codepoint(text, end2 - p1);
        vec![Component::delete(p2, kept)]
    } else if end2 >= end1 {
        // The other delete covers our end.
        let (kept, _) = split_at_codepoint(text, p2 - p1);
        vec![Component::delete(p1, kept)]
    } else {
        // The other delete sits strictly inside ours.
        let (before, rest) = split_at_codepoint(text, p2 - p1);
        let (_, after) = split_at_codepoint(rest, len2);
        vec![Component::delete(p1, format!("{before}{after}"))]
    }
}

/// Transform `ops1` so it applies after `ops2`.
///
/// Every component of `ops1` is folded across the components of `ops2`. Both
/// operations are sequential, so each component of `ops2` is also carried
/// past the components of `ops1` it has already met before it meets the
/// next one.
pub fn transform_ops(ops1: &Operation, ops2: &Operation, side: Side) -> Operation {
    match side {
        Side::Left => transform_x(ops1, ops2).0,
        Side::Right => transform_x(ops2, ops1).1,
    }
}

/// Transform two concurrent operations against each other.
///
/// Returns `(left', right')` where `left'` applies after `right` and wins
/// insert ties, and `right'` applies after `left`.
pub fn transform_x(left: &Operation, right: &Operation) -> (Operation, Operation) {
    let (left, right) = transform_lists(left.components().to_vec(), right.components());
    (left.into(), right.into())
}

fn transform_lists(
    mut left: Vec<Component>,
    right: &[Component],
) -> (Vec<Component>, Vec<Component>) {
    let mut right_out = Vec::with_capacity(right.len());
    for component in right {
        let (next_left, advanced) = transform_against(left, component.clone());
        left = next_left;
        right_out.extend(advanced);
    }
    (left, right_out)
}

/// Move every component of `left` past `right`, and `right` past them.
fn transform_against(
    left: Vec<Component>,
    mut right: Component,
) -> (Vec<Component>, Vec<Component>) {
    let mut out = Vec::with_capacity(left.len());
    let mut rest = left.into_iter();

    while let Some(component) = rest.next() {
        out.extend(transform_component(&component, &right, Side::Left));
        let advanced = transform_component(&right, &component, Side::Right);
        match <[Component; 1]>::try_from(advanced) {
            Ok([next]) => right = next,
            Err(advanced) => {
                // `right` was split or swallowed: the remaining components
                // are transformed against what is left of it.
                let (tail, right_tail) = transform_lists(rest.collect(), &advanced);
                out.extend(tail);
                return (out, right_tail);
            }
        }
    }

    (out, vec![right])
}
