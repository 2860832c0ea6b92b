use indexmap::IndexSet;

/// Collect the distinct, trimmed, non-empty values of one column.
///
/// `None` stands for a non-text cell (SQL NULL or a placeholder the loader
/// could not turn into text) and is dropped together with blank strings.
/// First-appearance order is kept so chunk contents are reproducible
/// between runs over the same snapshot.
pub fn unique_terms<'a, I>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    let mut seen: IndexSet<&'a str> = IndexSet::new();
    for value in values.into_iter().flatten() {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            seen.insert(trimmed);
        }
    }
    seen.into_iter().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn drops_blanks_and_missing_values() {
        let input = vec![Some("A"), Some("B"), Some("A"), Some(""), None, Some("   "), Some("C")];
        assert_eq!(unique_terms(input), vec!["A", "B", "C"]);
    }

    #[test]
    fn identity_is_trimmed_string() {
        let input = vec![Some(" 固相反应法"), Some("固相反应法  "), Some("sol-gel")];
        assert_eq!(unique_terms(input), vec!["固相反应法", "sol-gel"]);
    }

    #[test]
    fn size_matches_distinct_trimmed_values() {
        let raw = [
            "YSZ，商品化材料(Toyo Soda)，>99%",
            "",
            "Sc2O3, 商品化材料(Adventech, Korea)，6.8 mol%",
            "YSZ，商品化材料(Toyo Soda)，>99% ",
            "\t",
            "共沉淀法",
        ];
        let expected: HashSet<&str> = raw
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect();
        let out = unique_terms(raw.iter().map(|s| Some(*s)));
        assert_eq!(out.len(), expected.len());
        assert!(out.iter().all(|t| expected.contains(t.as_str())));
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(unique_terms(Vec::<Option<&str>>::new()).is_empty());
    }
}
