use std::collections::HashMap;

/// Case-insensitive index over a list of names.
///
/// Every spelling is kept, so callers can tell a unique match from an
/// ambiguous one (`Date` and `DATE` in the same table).
#[derive(Debug, Clone, Default)]
pub struct CaseInsensitiveSet {
    map: HashMap<String, Vec<usize>>,
}

impl CaseInsensitiveSet {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut map: HashMap<String, Vec<usize>> = HashMap::new();
        for (position, name) in names.into_iter().enumerate() {
            let key = name.as_ref().to_ascii_uppercase();
            map.entry(key).or_default().push(position);
        }
        Self { map }
    }

    /// Positions of every name equal to `name` ignoring ASCII case.
    pub fn positions(&self, name: &str) -> &[usize] {
        self.map
            .get(&name.to_ascii_uppercase())
            .map_or(&[], Vec::as_slice)
    }

    pub fn contains(&self, name: &str) -> bool {
        !self.positions(name).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_positions_ignoring_case() {
        let set = CaseInsensitiveSet::new(["id2", "Date", "DATE"]);
        assert_eq!(set.positions("ID2"), &[0]);
        assert_eq!(set.positions("date"), &[1, 2]);
        assert!(!set.contains("visit"));
    }
}
