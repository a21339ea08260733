//! Safety checks applied to rewritten expressions before they are accepted.

use super::scan::{mask_literals, parentheses_balanced};
use crate::error::{MigrateError, Result};

/// Extended and system procedures that must never appear in a migrated expression.
const DANGEROUS_PROCEDURES: &[&str] = &[
    "xp_cmdshell",
    "xp_regread",
    "xp_regwrite",
    "xp_regdelete",
    "xp_dirtree",
    "xp_fileexist",
    "xp_availablemedia",
    "xp_enumgroups",
    "xp_loginconfig",
    "xp_makecab",
    "xp_ntsec_enumdomains",
    "xp_subdirs",
    "sp_executesql",
    "sp_execute",
    "sp_oacreate",
    "sp_oamethod",
    "sp_oagetproperty",
    "sp_oasetproperty",
    "sp_oadestroy",
    "sp_addextendedproc",
    "sp_configure",
    "sp_makewebtask",
];

/// Reject expressions that could smuggle extra statements into generated DDL.
///
/// The expression ends up inside `CHECK (...)`, `SET DEFAULT ...` or a view
/// select list, so anything that can terminate or comment out the surrounding
/// statement is refused.
/// String literal contents are data and are not inspected.
pub fn check_expression_safety(expression: &str) -> Result<()> {
    if expression.matches('\'').count() % 2 != 0 {
        return Err(MigrateError::Validation(format!(
            "unterminated string literal in expression: {:?}",
            expression
        )));
    }

    let code = mask_literals(expression);
    let lower = code.to_lowercase();

    if code.contains(';') {
        return Err(MigrateError::Validation(format!(
            "expression contains a statement separator: {:?}",
            expression
        )));
    }

    if code.contains("--") || code.contains("/*") || code.contains("*/") {
        return Err(MigrateError::Validation(format!(
            "expression contains SQL comment markers: {:?}",
            expression
        )));
    }

    if lower.split_whitespace().any(|word| {
        word == "exec" || word == "execute" || word.starts_with("exec(") || word.starts_with("execute(")
    }) {
        return Err(MigrateError::Validation(format!(
            "expression contains EXEC/EXECUTE: {:?}",
            expression
        )));
    }

    for proc in DANGEROUS_PROCEDURES {
        for (idx, _) in lower.match_indices(proc) {
            let before_ok = lower[..idx]
                .chars()
                .last()
                .map_or(true, |c| !c.is_alphanumeric() && c != '_');
            let after_ok = lower[idx + proc.len()..]
                .chars()
                .next()
                .map_or(true, |c| !c.is_alphanumeric() && c != '_');

            if before_ok && after_ok {
                return Err(MigrateError::Validation(format!(
                    "expression references procedure '{}': {:?}",
                    proc, expression
                )));
            }
        }
    }

    if !parentheses_balanced(expression) {
        return Err(MigrateError::Validation(format!(
            "unbalanced parentheses in expression: {:?}",
            expression
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_ordinary_expressions() {
        assert!(check_expression_safety("COALESCE(qty, 0) * price").is_ok());
        assert!(check_expression_safety("status IN ('active', 'inactive')").is_ok());
        assert!(check_expression_safety("sp_rate > 0").is_ok());
        assert!(check_expression_safety("xp_value_total + 1").is_ok());
    }

    #[test]
    fn test_rejects_statement_separator() {
        assert!(check_expression_safety("1; DROP TABLE accnt").is_err());
    }

    #[test]
    fn test_rejects_comments() {
        assert!(check_expression_safety("x -- trailing").is_err());
        assert!(check_expression_safety("x /* hidden */").is_err());
    }

    #[test]
    fn test_rejects_exec_and_procedures() {
        assert!(check_expression_safety("exec something").is_err());
        assert!(check_expression_safety("EXECUTE('x')").is_err());
        assert!(check_expression_safety("xp_cmdshell('dir')").is_err());
        assert!(check_expression_safety("x + SP_CONFIGURE").is_err());
    }

    #[test]
    fn test_literal_contents_are_not_inspected() {
        assert!(check_expression_safety("([code]<>';')").is_ok());
        assert!(check_expression_safety("('N/A -- none')").is_ok());
        assert!(check_expression_safety("note <> '/* draft */'").is_ok());
        assert!(check_expression_safety("cmd = 'exec xp_cmdshell'").is_ok());
        assert!(check_expression_safety("COALESCE(note, 'a;b')").is_ok());
    }

    #[test]
    fn test_rejects_unterminated_literal() {
        let err = check_expression_safety("x = 'open; DROP TABLE accnt").unwrap_err();
        assert!(err.to_string().contains("unterminated"));
    }

    #[test]
    fn test_rejects_unbalanced_parentheses() {
        let err = check_expression_safety("COALESCE(x, 0").unwrap_err();
        assert!(err.to_string().contains("unbalanced"));
    }
}
