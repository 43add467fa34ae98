use ahash::AHashMap;

/// Running statistics for one key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StationAggregate {
    pub min: f64,
    pub max: f64,
    pub sum: f64,
    pub count: u64,
}

impl StationAggregate {
    /// Seeds an aggregate from its first observation.
    pub fn new(value: f64) -> Self {
        Self {
            min: value,
            max: value,
            sum: value,
            count: 1,
        }
    }

    pub fn update(&mut self, value: f64) {
        if value < self.min {
            self.min = value;
        }
        if value > self.max {
            self.max = value;
        }
        self.sum += value;
        self.count += 1;
    }

    pub fn merge(&mut self, other: &StationAggregate) {
        if other.min < self.min {
            self.min = other.min;
        }
        if other.max > self.max {
            self.max = other.max;
        }
        self.sum += other.sum;
        self.count += other.count;
    }

    pub fn mean(&self) -> f64 {
        self.sum / self.count as f64
    }
}

/// Key to aggregate table. Keys are the raw bytes of the key field.
pub type PartialTable = AHashMap<Box<[u8]>, StationAggregate>;

/// Folds `local` into `global`, consuming it.
pub fn merge_tables(global: &mut PartialTable, local: PartialTable) {
    for (station, stats) in local {
        global
            .entry(station)
            .and_modify(|gstats| gstats.merge(&stats))
            .or_insert(stats);
    }
}

/// Records one observation in `table`. Only allocates the key the first
/// time it is seen.
pub fn observe(table: &mut PartialTable, key: &[u8], value: f64) {
    match table.get_mut(key) {
        Some(stats) => stats.update(value),
        None => {
            table.insert(key.into(), StationAggregate::new(value));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(rows: &[(&str, f64)]) -> PartialTable {
        let mut t = PartialTable::default();
        for (k, v) in rows {
            observe(&mut t, k.as_bytes(), *v);
        }
        t
    }

    fn merged(parts: Vec<PartialTable>) -> PartialTable {
        let mut global = PartialTable::default();
        for p in parts {
            merge_tables(&mut global, p);
        }
        global
    }

    #[test]
    fn update_tracks_min_max_sum_count() {
        let mut s = StationAggregate::new(5.0);
        s.update(10.0);
        s.update(-2.5);
        assert_eq!(s.count, 3);
        assert_eq!(s.min, -2.5);
        assert_eq!(s.max, 10.0);
        assert_eq!(s.sum, 12.5);
        assert!(s.min <= s.mean() && s.mean() <= s.max);
    }

    #[test]
    fn later_max_after_new_min_is_still_seen() {
        let mut s = StationAggregate::new(0.0);
        s.update(-1.0);
        s.update(1.0);
        assert_eq!((s.min, s.max), (-1.0, 1.0));
    }

    #[test]
    fn merge_is_order_independent() {
        // Values chosen so every partial sum is exact in binary.
        let a = || table(&[("x", 1.5), ("y", -4.0), ("x", 2.0)]);
        let b = || table(&[("x", -0.5), ("z", 8.25)]);
        let c = || table(&[("y", 16.0), ("z", 0.25), ("x", 3.0)]);

        let abc = merged(vec![a(), b(), c()]);
        let cba = merged(vec![c(), b(), a()]);
        let bac = merged(vec![b(), a(), c()]);

        // (a + b) + c versus a + (b + c)
        let left = merged(vec![merged(vec![a(), b()]), c()]);
        let right = merged(vec![a(), merged(vec![b(), c()])]);

        assert_eq!(abc, cba);
        assert_eq!(abc, bac);
        assert_eq!(left, right);
        assert_eq!(abc, left);

        let x = abc[b"x".as_slice()];
        assert_eq!(x.count, 4);
        assert_eq!(x.min, -0.5);
        assert_eq!(x.max, 3.0);
        assert_eq!(x.sum, 6.0);
    }

    #[test]
    fn merge_inserts_unseen_keys_as_is() {
        let mut global = table(&[("a", 1.0)]);
        merge_tables(&mut global, table(&[("b", 2.0), ("b", 4.0)]));
        assert_eq!(global.len(), 2);
        let b = global[b"b".as_slice()];
        assert_eq!((b.min, b.max, b.sum, b.count), (2.0, 4.0, 6.0, 2));
    }
}
