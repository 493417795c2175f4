//! Schema bootstrap scripts

/// Embedded SQLite bootstrap script.
pub const SQLITE_INIT: &str = include_str!("../../sql/sqlite_init.sql");

/// Embedded Postgres bootstrap script.
pub const POSTGRES_INIT: &str = include_str!("../../sql/postgres_init.sql");

/// Split a script into executable statements.
///
/// Lines starting with `--` are dropped, the rest is split on `;` and blank
/// segments are skipped.
pub fn split_statements(script: &str) -> Vec<String> {
    let without_comments: String = script
        .lines()
        .filter(|line| !line.trim_start().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n");

    without_comments
        .split(';')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_blank_segments_and_comments() {
        let script = "-- header\nCREATE TABLE a (x INT);\n\n;\n  CREATE TABLE b (y INT)  ;\n";
        assert_eq!(
            split_statements(script),
            vec!["CREATE TABLE a (x INT)", "CREATE TABLE b (y INT)"]
        );
    }

    #[test]
    fn trailing_statement_without_semicolon() {
        assert_eq!(split_statements("SELECT 1"), vec!["SELECT 1"]);
    }

    #[test]
    fn embedded_scripts_create_both_tables() {
        for script in [SQLITE_INIT, POSTGRES_INIT] {
            let statements = split_statements(script);
            assert!(statements.iter().any(|s| s.contains("CREATE TABLE IF NOT EXISTS tasks")));
            assert!(statements.iter().any(|s| s.contains("CREATE TABLE IF NOT EXISTS task_session")));
            assert!(statements.iter().all(|s| !s.starts_with("--")));
        }
    }
}
