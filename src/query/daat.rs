//! Document-at-a-time cursors and merge-join kernels.
//!
//! Every stream handed to these kernels must be sorted ascending by document id. The
//! kernels only move cursors forward, so each stream is read at most once per evaluation.

use crate::core::error::Result;
use crate::core::types::DocId;
use crate::index::posting::InvertedList;
use crate::search::results::ScoreList;

/// A stream of entries sorted ascending by document id
pub trait DocStream {
    fn stream_len(&self) -> usize;

    fn doc_at(&self, index: usize) -> DocId;
}

impl DocStream for InvertedList {
    fn stream_len(&self) -> usize {
        self.len()
    }

    fn doc_at(&self, index: usize) -> DocId {
        self.doc_id(index)
    }
}

impl DocStream for ScoreList {
    fn stream_len(&self) -> usize {
        self.len()
    }

    fn doc_at(&self, index: usize) -> DocId {
        self.doc_id(index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    Active(DocId),
    Exhausted,
}

/// Read pointer into one operand's stream, alive for a single evaluation
#[derive(Debug)]
pub struct Cursor<'a, S: DocStream> {
    stream: &'a S,
    next: usize,
}

impl<'a, S: DocStream> Cursor<'a, S> {
    pub fn new(stream: &'a S) -> Self {
        Cursor { stream, next: 0 }
    }

    pub fn state(&self) -> CursorState {
        if self.next < self.stream.stream_len() {
            CursorState::Active(self.stream.doc_at(self.next))
        } else {
            CursorState::Exhausted
        }
    }

    /// Index of the entry under the cursor.
    pub fn index(&self) -> usize {
        self.next
    }

    pub fn remaining(&self) -> usize {
        self.stream.stream_len().saturating_sub(self.next)
    }

    pub fn advance(&mut self) {
        self.next += 1;
    }

    /// Skip every entry whose document id is below `target`.
    pub fn advance_to(&mut self, target: DocId) -> CursorState {
        loop {
            match self.state() {
                CursorState::Active(doc) if doc < target => self.advance(),
                state => return state,
            }
        }
    }
}

/// Documents present in every stream.
///
/// The shortest stream drives; the others are advanced to its current document. `on_match`
/// receives the document and, per stream in the original order, the index of its entry.
pub fn intersect<S, F>(streams: &[&S], mut on_match: F) -> Result<()>
where
    S: DocStream,
    F: FnMut(DocId, &[usize]) -> Result<()>,
{
    if streams.is_empty() {
        return Ok(());
    }

    let mut cursors: Vec<Cursor<S>> = streams.iter().map(|s| Cursor::new(*s)).collect();
    let pivot = (0..cursors.len())
        .min_by_key(|&i| cursors[i].remaining())
        .unwrap_or(0);
    let mut indices = vec![0usize; cursors.len()];

    while let CursorState::Active(doc) = cursors[pivot].state() {
        let mut aligned = true;

        for (i, cursor) in cursors.iter_mut().enumerate() {
            if i == pivot {
                continue;
            }
            match cursor.advance_to(doc) {
                CursorState::Exhausted => return Ok(()),
                CursorState::Active(other) if other > doc => {
                    aligned = false;
                    break;
                }
                CursorState::Active(_) => {}
            }
        }

        if aligned {
            for (slot, cursor) in indices.iter_mut().zip(&cursors) {
                *slot = cursor.index();
            }
            on_match(doc, &indices)?;
        }
        cursors[pivot].advance();
    }

    Ok(())
}

/// Every document present in at least one stream, in ascending order.
///
/// `on_doc` receives, per stream, `Some(index)` when the stream holds the document and
/// `None` otherwise.
pub fn union<S, F>(streams: &[&S], mut on_doc: F) -> Result<()>
where
    S: DocStream,
    F: FnMut(DocId, &[Option<usize>]) -> Result<()>,
{
    let mut cursors: Vec<Cursor<S>> = streams.iter().map(|s| Cursor::new(*s)).collect();
    let mut present: Vec<Option<usize>> = vec![None; cursors.len()];

    loop {
        let min_doc = cursors.iter()
            .filter_map(|cursor| match cursor.state() {
                CursorState::Active(doc) => Some(doc),
                CursorState::Exhausted => None,
            })
            .min();
        let Some(doc) = min_doc else {
            return Ok(());
        };

        for (slot, cursor) in present.iter_mut().zip(cursors.iter_mut()) {
            *slot = match cursor.state() {
                CursorState::Active(current) if current == doc => {
                    let index = cursor.index();
                    cursor.advance();
                    Some(index)
                }
                _ => None,
            };
        }
        on_doc(doc, &present)?;
    }
}

/// Ordered proximity inside one document.
///
/// A match is a chain with one position per list, each strictly after the previous one
/// and at most `distance` away from it. Every position of the first list is tried as a
/// start, and later starts may chain through the same occurrences as earlier ones.
/// Returns the start positions of the matching chains, ascending.
pub fn ordered_window_starts(positions: &[&[u32]], distance: u32) -> Vec<u32> {
    let Some((first, rest)) = positions.split_first() else {
        return Vec::new();
    };
    // Chain positions only grow with the start, so skipped occurrences stay skipped
    let mut pointers = vec![0usize; rest.len()];
    let mut starts = Vec::new();

    for &start in first.iter() {
        let mut previous = start;
        let mut chained = true;

        for (list, pointer) in rest.iter().zip(pointers.iter_mut()) {
            while *pointer < list.len() && list[*pointer] <= previous {
                *pointer += 1;
            }
            match list.get(*pointer) {
                Some(&next) if next - previous <= distance => previous = next,
                _ => {
                    chained = false;
                    break;
                }
            }
        }

        if chained {
            starts.push(start);
        }
    }

    starts
}

/// Unordered proximity inside one document: every list contributes one position and the
/// span from the smallest to the largest is at most `width` tokens. Returns window ends.
pub fn unordered_window_ends(positions: &[&[u32]], width: u32) -> Vec<u32> {
    if positions.is_empty() {
        return Vec::new();
    }
    let mut pointers = vec![0usize; positions.len()];
    let mut ends = Vec::new();

    loop {
        let mut min = (u32::MAX, 0usize);
        let mut max = 0u32;

        for (i, (list, &pointer)) in positions.iter().zip(&pointers).enumerate() {
            let Some(&position) = list.get(pointer) else {
                return ends;
            };
            if position < min.0 {
                min = (position, i);
            }
            max = max.max(position);
        }

        if max - min.0 + 1 <= width {
            ends.push(max);
            for pointer in pointers.iter_mut() {
                *pointer += 1;
            }
        } else {
            pointers[min.1] += 1;
        }
    }
}
