use tracing::debug;

use crate::aggregate::{merge_tables, PartialTable};

/// Owns the final table and folds partial tables into it as they arrive.
#[derive(Debug, Default)]
pub struct Merger {
    table: PartialTable,
    merged: usize,
}

impl Merger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn absorb(&mut self, partial: PartialTable) {
        debug!(keys = partial.len(), "merging partial table");
        if self.table.is_empty() {
            // The first table can be taken over wholesale.
            self.table = partial;
        } else {
            merge_tables(&mut self.table, partial);
        }
        self.merged += 1;
    }

    /// Number of partial tables absorbed so far.
    pub fn tables_merged(&self) -> usize {
        self.merged
    }

    pub fn finish(self) -> PartialTable {
        self.table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_chunk;

    #[test]
    fn arrival_order_does_not_matter() {
        let parts = [
            &b"a;1.0\nb;-4.0\n"[..],
            &b"a;2.5\nc;8.0\n"[..],
            &b"b;16.0\na;-0.5\n"[..],
        ];

        let mut forward = Merger::new();
        for p in parts {
            forward.absorb(parse_chunk(p).unwrap());
        }
        let mut backward = Merger::new();
        for p in parts.iter().rev() {
            backward.absorb(parse_chunk(p).unwrap());
        }

        assert_eq!(forward.tables_merged(), 3);
        assert_eq!(forward.finish(), backward.finish());
    }

    #[test]
    fn empty_partials_are_counted_but_add_nothing() {
        let mut merger = Merger::new();
        merger.absorb(PartialTable::default());
        merger.absorb(parse_chunk(b"k;1.0\n").unwrap());
        merger.absorb(PartialTable::default());
        assert_eq!(merger.tables_merged(), 3);
        let table = merger.finish();
        assert_eq!(table.len(), 1);
        assert_eq!(table[b"k".as_slice()].count, 1);
    }
}
