//! The dataset flowing through feature steps.

use polars::prelude::*;
use std::collections::BTreeMap;

/// Separator between a categorical column name and its indicator index.
pub const DUMMY_SEPARATOR: &str = "_dummy_";

/// A column-labeled table plus the declared category order of categorical columns.
///
/// Each step consumes one `Dataset` and returns the next version; nothing is
/// shared between versions.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    frame: DataFrame,
    categories: BTreeMap<String, Vec<String>>,
}

impl Dataset {
    pub fn new(frame: DataFrame) -> Self {
        Self {
            frame,
            categories: BTreeMap::new(),
        }
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn frame_mut(&mut self) -> &mut DataFrame {
        &mut self.frame
    }

    pub fn into_frame(self) -> DataFrame {
        self.frame
    }

    pub fn height(&self) -> usize {
        self.frame.height()
    }

    pub fn width(&self) -> usize {
        self.frame.width()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.frame
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.frame.column(name).is_ok()
    }

    /// Declared category order of `column`, if it was made categorical.
    pub fn categories(&self, column: &str) -> Option<&[String]> {
        self.categories.get(column).map(Vec::as_slice)
    }

    pub fn set_categories(&mut self, column: &str, categories: Vec<String>) {
        self.categories.insert(column.to_owned(), categories);
    }

    /// Forget the category order of `column` after its values were replaced.
    pub fn clear_categories(&mut self, column: &str) {
        self.categories.remove(column);
    }

    /// Drop columns (and any category metadata attached to them).
    pub fn drop_columns(&mut self, columns: &[String]) -> PolarsResult<()> {
        for name in columns {
            self.frame.drop_in_place(name)?;
            self.categories.remove(name);
        }
        Ok(())
    }

    /// Keep only `columns`, in the given order.
    pub fn select(&mut self, columns: &[String]) -> PolarsResult<()> {
        self.frame = self.frame.select(columns.iter().map(String::as_str))?;
        self.categories.retain(|name, _| columns.contains(name));
        Ok(())
    }
}

impl From<DataFrame> for Dataset {
    fn from(frame: DataFrame) -> Self {
        Self::new(frame)
    }
}

/// The source column of a one-hot indicator, i.e. everything before the first
/// `_dummy_`; the whole name for ordinary columns.
pub fn dummy_source(column: &str) -> &str {
    column
        .split_once(DUMMY_SEPARATOR)
        .map_or(column, |(source, _)| source)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dummy_source() {
        assert_eq!(dummy_source("colour_dummy_2"), "colour");
        assert_eq!(dummy_source("colour"), "colour");
        assert_eq!(dummy_source("a_dummy_b_dummy_0"), "a");
    }

    #[test]
    fn test_drop_clears_categories() {
        let df = df!("a" => ["x", "y"], "b" => [1i64, 2]).unwrap();
        let mut ds = Dataset::new(df);
        ds.set_categories("a", vec!["x".to_owned(), "y".to_owned()]);
        ds.drop_columns(&["a".to_owned()]).unwrap();

        assert!(ds.categories("a").is_none());
        assert_eq!(ds.column_names(), vec!["b"]);
    }
}
