//! Target table rewriting.
//!
//! The first `FROM`, `INTO` or `UPDATE` clause names the logical table. That
//! clause, and every identical occurrence of it, gets the table shard suffix
//! appended to its identifier. This is a textual rewrite, not a parse.

use std::borrow::Cow;

use dbrouter_core::TableIndex;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

/// Clause keyword, whitespace, then an optionally backtick-quoted identifier.
static TARGET_CLAUSE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(from|into|update)\s+`?(\w+)`?").expect("target clause pattern is valid")
});

/// Rewrites logical table names to their physical, shard-suffixed names.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatementRewriter;

impl StatementRewriter {
    /// Creates a rewriter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Rewrites `sql` for table shard `table`.
    ///
    /// Returns the input unchanged when no table shard is routed, when the
    /// entity doesn't split its tables, or when no target clause is found.
    #[must_use]
    pub fn rewrite<'a>(
        &self,
        sql: &'a str,
        table: Option<TableIndex>,
        split_table: bool,
    ) -> Cow<'a, str> {
        let Some(table) = table else {
            return Cow::Borrowed(sql);
        };
        if !split_table {
            debug!("entity doesn't split tables; statement left unchanged");
            return Cow::Borrowed(sql);
        }

        let Some(caps) = TARGET_CLAUSE.captures(sql) else {
            warn!(sql, table = %table, "no target table clause found; statement left unchanged");
            return Cow::Borrowed(sql);
        };
        let (Some(clause), Some(ident)) = (caps.get(0), caps.get(2)) else {
            return Cow::Borrowed(sql);
        };

        let clause_text = clause.as_str();
        let ident_start = ident.start() - clause.start();
        let ident_end = ident.end() - clause.start();
        let physical = table.physical_table(ident.as_str());
        let replacement = format!(
            "{}{}{}",
            &clause_text[..ident_start],
            physical,
            &clause_text[ident_end..]
        );

        let rewritten = replace_clause(sql, clause_text, &replacement);
        debug!(table = %physical, sql = %rewritten, "rewrote statement");
        Cow::Owned(rewritten)
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Replaces every standalone occurrence of `clause` in `sql`.
///
/// An occurrence glued to a surrounding word character (`from users` when
/// the clause is `from user`) is left alone.
fn replace_clause(sql: &str, clause: &str, replacement: &str) -> String {
    let guard_head = clause.starts_with(is_word_char);
    let guard_tail = clause.ends_with(is_word_char);

    let mut out = String::with_capacity(sql.len() + replacement.len());
    let mut last = 0;
    for (start, _) in sql.match_indices(clause) {
        let end = start + clause.len();
        let glued_head = guard_head && sql[..start].ends_with(is_word_char);
        let glued_tail = guard_tail && sql[end..].starts_with(is_word_char);
        if glued_head || glued_tail {
            continue;
        }
        out.push_str(&sql[last..start]);
        out.push_str(replacement);
        last = end;
    }
    out.push_str(&sql[last..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rewrite(sql: &str, table: u32) -> String {
        StatementRewriter::new()
            .rewrite(sql, Some(TableIndex::new(table)), true)
            .into_owned()
    }

    #[test]
    fn test_rewrite_select() {
        assert_eq!(
            rewrite("select * from user where id=1", 7),
            "select * from user_007 where id=1"
        );
    }

    #[test]
    fn test_split_table_disabled() {
        let sql = "select * from user where id=1";
        let out = StatementRewriter::new().rewrite(sql, Some(TableIndex::new(7)), false);
        assert!(matches!(out, Cow::Borrowed(_)));
        assert_eq!(out, sql);
    }

    #[test]
    fn test_no_table_key() {
        let sql = "select * from user where id=1";
        let out = StatementRewriter::new().rewrite(sql, None, true);
        assert!(matches!(out, Cow::Borrowed(_)));
    }

    #[test]
    fn test_no_matching_clause() {
        let sql = "select 1";
        let out = StatementRewriter::new().rewrite(sql, Some(TableIndex::new(3)), true);
        assert_eq!(out, sql);
    }

    #[test]
    fn test_rewrite_insert_and_update() {
        assert_eq!(
            rewrite("INSERT INTO orders (id, uid) VALUES (?, ?)", 2),
            "INSERT INTO orders_002 (id, uid) VALUES (?, ?)"
        );
        assert_eq!(
            rewrite("update account set balance = ? where uid = ?", 15),
            "update account_015 set balance = ? where uid = ?"
        );
    }

    #[test]
    fn test_case_insensitive_keyword() {
        assert_eq!(rewrite("SeLeCt id FrOm user", 1), "SeLeCt id FrOm user_001");
    }

    #[test]
    fn test_backtick_quoted_identifier() {
        assert_eq!(
            rewrite("select * from `user` where id = 1", 4),
            "select * from `user_004` where id = 1"
        );
    }

    #[test]
    fn test_whitespace_preserved() {
        assert_eq!(
            rewrite("select *\nfrom\n  user\nwhere id = 1", 0),
            "select *\nfrom\n  user_000\nwhere id = 1"
        );
    }

    #[test]
    fn test_all_identical_clauses_rewritten() {
        assert_eq!(
            rewrite(
                "select * from user where id in (select id from user where age > 3)",
                1
            ),
            "select * from user_001 where id in (select id from user_001 where age > 3)"
        );
    }

    #[test]
    fn test_other_tables_untouched() {
        assert_eq!(
            rewrite("select * from user u join profile p on u.id = p.uid", 1),
            "select * from user_001 u join profile p on u.id = p.uid"
        );
    }

    #[test]
    fn test_prefix_table_names_untouched() {
        assert_eq!(
            rewrite("select * from user where id in (select uid from users)", 1),
            "select * from user_001 where id in (select uid from users)"
        );
    }

    #[test]
    fn test_keyword_inside_identifier_ignored() {
        assert_eq!(
            rewrite("select created_from, x from orders", 3),
            "select created_from, x from orders_003"
        );
    }

    #[test]
    fn test_replace_clause_guards() {
        assert_eq!(
            replace_clause("from user, from users, xfrom user", "from user", "from user_1"),
            "from user_1, from users, xfrom user"
        );
    }
}
