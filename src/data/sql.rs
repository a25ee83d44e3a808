//! SQL text preparation: comment stripping and placeholder substitution.

use crate::error::{Result, ResultExt as _};
use std::collections::BTreeMap;
use std::path::Path;

/// Substitute placeholders in `sql`.
///
/// `${var:NAME}` is replaced from `replace_sqlvar` first, then `{NAME}` from
/// `replace_var`. Placeholders without a value are left untouched.
pub fn format_sql(
    sql: &str,
    replace_sqlvar: &BTreeMap<String, String>,
    replace_var: &BTreeMap<String, String>,
) -> String {
    let mut out = sql.to_owned();
    for (name, value) in replace_sqlvar {
        out = out.replace(&format!("${{var:{name}}}"), value);
    }
    for (name, value) in replace_var {
        out = out.replace(&format!("{{{name}}}"), value);
    }
    out
}

/// Read a SQL file, dropping `--` comment lines unless `load_comments` is set.
pub fn load_sql(path: &Path, load_comments: bool) -> Result<String> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read SQL file {}", path.display()))?;

    let sql = content
        .lines()
        .filter(|line| load_comments || !line.starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n");
    Ok(sql)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_format_sql_both_styles() {
        let mut sqlvar = BTreeMap::new();
        sqlvar.insert("table".to_owned(), "sales".to_owned());
        let mut var = BTreeMap::new();
        var.insert("year".to_owned(), "2019".to_owned());

        let sql = format_sql(
            "SELECT * FROM ${var:table} WHERE year = {year} AND id IN {ids}",
            &sqlvar,
            &var,
        );
        assert_eq!(sql, "SELECT * FROM sales WHERE year = 2019 AND id IN {ids}");
    }

    #[test]
    fn test_load_sql_strips_comments() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("q.sql");
        std::fs::write(&path, "-- header\nSELECT a\n-- note\nFROM t").unwrap();

        assert_eq!(load_sql(&path, false).unwrap(), "SELECT a\nFROM t");
        assert_eq!(
            load_sql(&path, true).unwrap(),
            "-- header\nSELECT a\n-- note\nFROM t"
        );
    }
}
