/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

/// The typed value kind a registered directive expects, per §4.2
/// `register_commands`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    String,
    Numeric,
    Boolean,
    TemplateAppend,
    HashKeyValue,
    Addrlist,
    AddrlistRemove,
    Handler,
}

/// One entry in the command registry: a setting name, its value kind, the
/// default applied when absent, and the `is_priv`/`is_admin` gates from
/// §4.2 (rejected outright in scores-only / per-user config respectively).
#[derive(Debug, Clone)]
pub struct CommandDef {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub kind: ValueKind,
    pub default: &'static str,
    pub is_priv: bool,
    pub is_admin: bool,
}

impl CommandDef {
    pub fn matches(&self, token: &str) -> bool {
        self.name.eq_ignore_ascii_case(token) || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(token))
    }
}

/// The built-in directive registry for the settings enumerated in §6 that
/// are not rule/score/addrlist lines (those have dedicated grammars parsed
/// directly by [`crate::parser`]).
pub fn builtin_commands() -> &'static [CommandDef] {
    const DEFS: &[CommandDef] = &[
        CommandDef { name: "required_hits", aliases: &["required_score"], kind: ValueKind::Numeric, default: "5.0", is_priv: false, is_admin: false },
        CommandDef { name: "rewrite_subject", aliases: &[], kind: ValueKind::Boolean, default: "0", is_priv: false, is_admin: false },
        CommandDef { name: "subject_tag", aliases: &[], kind: ValueKind::String, default: "*****SPAM*****", is_priv: false, is_admin: false },
        CommandDef { name: "report_safe", aliases: &[], kind: ValueKind::Numeric, default: "1", is_priv: false, is_admin: false },
        CommandDef { name: "report", aliases: &[], kind: ValueKind::TemplateAppend, default: "", is_priv: false, is_admin: false },
        CommandDef { name: "unsafe_report", aliases: &[], kind: ValueKind::TemplateAppend, default: "", is_priv: false, is_admin: false },
        CommandDef { name: "terse_report", aliases: &[], kind: ValueKind::TemplateAppend, default: "", is_priv: false, is_admin: false },
        CommandDef { name: "spamtrap", aliases: &[], kind: ValueKind::TemplateAppend, default: "", is_priv: false, is_admin: false },
        CommandDef { name: "clear_report_template", aliases: &[], kind: ValueKind::Handler, default: "", is_priv: false, is_admin: false },
        CommandDef { name: "use_bayes", aliases: &[], kind: ValueKind::Boolean, default: "1", is_priv: false, is_admin: false },
        CommandDef { name: "bayes_path", aliases: &[], kind: ValueKind::String, default: "~/.spamassassin/bayes", is_priv: true, is_admin: true },
        CommandDef { name: "bayes_file_mode", aliases: &[], kind: ValueKind::String, default: "0700", is_priv: true, is_admin: true },
        CommandDef { name: "bayes_use_hapaxes", aliases: &[], kind: ValueKind::Boolean, default: "1", is_priv: false, is_admin: false },
        CommandDef { name: "bayes_use_chi2_combining", aliases: &[], kind: ValueKind::Boolean, default: "1", is_priv: false, is_admin: false },
        CommandDef { name: "bayes_expiry_min_db_size", aliases: &[], kind: ValueKind::Numeric, default: "100000", is_priv: true, is_admin: true },
        CommandDef { name: "bayes_expiry_scan_count", aliases: &[], kind: ValueKind::Numeric, default: "0", is_priv: true, is_admin: true },
        CommandDef { name: "bayes_ignore_header", aliases: &[], kind: ValueKind::HashKeyValue, default: "", is_priv: false, is_admin: false },
        CommandDef { name: "allow_user_rules", aliases: &[], kind: ValueKind::Boolean, default: "0", is_priv: true, is_admin: true },
        CommandDef { name: "skip_rbl_checks", aliases: &[], kind: ValueKind::Boolean, default: "0", is_priv: false, is_admin: false },
        CommandDef { name: "rbl_timeout", aliases: &[], kind: ValueKind::Numeric, default: "15", is_priv: true, is_admin: true },
        CommandDef { name: "auto_whitelist_path", aliases: &[], kind: ValueKind::String, default: "~/.spamassassin/auto-whitelist", is_priv: true, is_admin: true },
        CommandDef { name: "auto_whitelist_factor", aliases: &[], kind: ValueKind::Numeric, default: "0.5", is_priv: false, is_admin: false },
        CommandDef { name: "auto_learn", aliases: &[], kind: ValueKind::Boolean, default: "1", is_priv: false, is_admin: false },
        CommandDef { name: "auto_learn_threshold_spam", aliases: &[], kind: ValueKind::Numeric, default: "12.0", is_priv: false, is_admin: false },
        CommandDef { name: "auto_learn_threshold_nonspam", aliases: &[], kind: ValueKind::Numeric, default: "0.1", is_priv: false, is_admin: false },
        CommandDef { name: "ok_locales", aliases: &[], kind: ValueKind::String, default: "all", is_priv: false, is_admin: false },
        CommandDef { name: "ok_languages", aliases: &[], kind: ValueKind::String, default: "all", is_priv: false, is_admin: false },
        CommandDef { name: "report_header", aliases: &[], kind: ValueKind::Boolean, default: "0", is_priv: false, is_admin: false },
        CommandDef { name: "fold_headers", aliases: &[], kind: ValueKind::Boolean, default: "1", is_priv: false, is_admin: false },
        CommandDef { name: "add_header", aliases: &[], kind: ValueKind::Handler, default: "", is_priv: false, is_admin: false },
    ];
    DEFS
}

pub fn lookup(name: &str) -> Option<&'static CommandDef> {
    builtin_commands().iter().find(|c| c.matches(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_score_is_an_alias_of_required_hits() {
        let def = lookup("required_score").unwrap();
        assert_eq!(def.name, "required_hits");
    }

    #[test]
    fn bayes_path_is_privileged_and_admin_only() {
        let def = lookup("bayes_path").unwrap();
        assert!(def.is_priv && def.is_admin);
    }
}
