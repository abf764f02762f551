//! Built-in dangerous-command table
//!
//! Order matters: the validator reports the first rule that matches.

use super::{SafetyRuleSpec, Severity};

/// Built-in rule table as data
pub(crate) const BUILTIN_RULES: &[(&str, &str, Severity, Option<&str>)] = &[
    (
        // The whole operand list up to a command separator, with a recursive
        // flag and an absolute operand in either order.
        r#"\brm(?:\s+[^\s;&|]+)*?\s+(?:(?:-[A-Za-z]*[rR][A-Za-z]*|--recursive)(?:\s+[^\s;&|]+)*?\s+["']?/|["']?/[^\s;&|]*(?:\s+[^\s;&|]+)*?\s+(?:-[A-Za-z]*[rR][A-Za-z]*|--recursive))[^\s;&|]*(?:\s+[^\s;&|]+)*"#,
        "Recursive deletion of a root path",
        Severity::Critical,
        // Exempt only when every absolute operand is a temp directory.
        Some(r#"^rm(?:\s+(?:-[^\s;&|]*|["']?/(?:var/)?tmp(?:/[^\s;&|"']*)?["']?|[^\s;&|/"'-][^\s;&|]*))*$"#),
    ),
    (
        r">\s*/dev/(?:sd[a-z]|hd[a-z]|xvd[a-z]|vd[a-z]|nvme\d|mmcblk\d|disk\d)",
        "Direct write to a raw disk device",
        Severity::Critical,
        None,
    ),
    (
        r"\bdd\b[^\n]*\bof=/dev/(?:sd|hd|xvd|vd|nvme|mmcblk|disk)",
        "Raw disk write with dd",
        Severity::Critical,
        None,
    ),
    (
        r"\b(?:mkfs(?:\.[A-Za-z0-9]+)?|mke2fs|mkswap)\b",
        "Filesystem formatting",
        Severity::Critical,
        None,
    ),
    (
        r"\bdd\s+if=/dev/(?:sd|hd|xvd|vd|nvme|mmcblk|disk)|\b(?:ddrescue|partclone\.\w+|clonezilla)\b",
        "Disk cloning tool",
        Severity::High,
        None,
    ),
    (
        r":\(\)\s*\{\s*:\s*\|\s*:\s*&\s*\}\s*;\s*:",
        "Shell fork bomb",
        Severity::Critical,
        None,
    ),
    (
        r"\b(?:curl|wget)\b[^|\n]*\|\s*(?:sudo\s+)?(?:ba|da|k|z)?sh\b",
        "Piping a download into a shell",
        Severity::High,
        None,
    ),
    (
        r"\bchmod\s+(?:-[A-Za-z]*R[A-Za-z]*\s+)+0?777\s+/(?:\s|$)",
        "Recursive world-writable permissions on root",
        Severity::High,
        None,
    ),
];

/// Built-in table in its serde form
#[must_use]
pub fn builtin_specs() -> Vec<SafetyRuleSpec> {
    BUILTIN_RULES
        .iter()
        .map(|(pattern, description, severity, allow)| SafetyRuleSpec {
            pattern: (*pattern).to_string(),
            description: (*description).to_string(),
            severity: *severity,
            allow: allow.map(str::to_string),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::safety::SafetyRule;

    #[test]
    fn builtin_patterns_compile() {
        for spec in builtin_specs() {
            assert!(
                SafetyRule::compile(&spec).is_ok(),
                "pattern failed to compile: {}",
                spec.pattern
            );
        }
    }

    #[test]
    fn descriptions_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for (_, description, _, _) in BUILTIN_RULES {
            assert!(seen.insert(*description), "duplicate rule: {description}");
        }
    }
}
