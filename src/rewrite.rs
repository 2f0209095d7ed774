//! Post-processing of generator output.
//!
//! The generator hands back plain source lines; everything here is text
//! substitution, never parsing. Steps run in a fixed order:
//!
//! 1. restore escaped reserved words (lines carrying the escape marker only)
//! 2. splice custom declarations after the first anchor match
//! 3. substitute custom type names
//! 4. append the synthesized union
pub mod rule;

use tracing::debug;

pub use rule::{Pattern, Rule};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// Hand-authored declarations and type-name substitutions for one language.
#[derive(Debug, Clone, Default)]
pub struct CustomMapping {
    /// Marks the end of the import block. `None` disables insertion.
    pub anchor: Option<Pattern>,
    pub declarations: Vec<String>,
    /// Applied in order, to every line.
    pub substitutions: Vec<Rule>,
}

#[derive(Debug, Clone)]
pub struct CodeRewriter<'a> {
    marker: &'a str,
    restore: &'a Rule,
    custom: Option<&'a CustomMapping>,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl<'a> CodeRewriter<'a> {
    pub fn new(marker: &'a str, restore: &'a Rule, custom: Option<&'a CustomMapping>) -> Self {
        Self { marker, restore, custom }
    }

    pub fn rewrite(&self, lines: Vec<String>, union: Vec<String>) -> Vec<String> {
        let mut lines = restore_reserved(lines, self.marker, self.restore);
        if let Some(custom) = self.custom {
            if let Some(anchor) = &custom.anchor {
                lines = insert_declarations(lines, anchor, &custom.declarations);
            }
            lines = substitute_types(lines, &custom.substitutions);
        }
        append_union(lines, union)
    }
}

/// Step 1. Only lines containing `marker` are touched, so unrelated text
/// matching a loose pattern elsewhere in the file is left alone.
pub fn restore_reserved(lines: Vec<String>, marker: &str, rule: &Rule) -> Vec<String> {
    lines
        .into_iter()
        .map(|line| {
            if line.contains(marker) {
                rule.apply(&line).into_owned()
            } else {
                line
            }
        })
        .collect()
}

/// Step 2. Anchor never matching is not an error; nothing is inserted.
pub fn insert_declarations(lines: Vec<String>, anchor: &Pattern, declarations: &[String]) -> Vec<String> {
    if declarations.is_empty() {
        return lines;
    }
    let Some(at) = lines.iter().position(|line| anchor.is_match(line)) else {
        debug!(anchor = anchor.as_str(), "declaration anchor not found; skipping insertion");
        return lines;
    };

    let mut out = Vec::with_capacity(lines.len() + declarations.len() * 2);
    let mut rest = lines.into_iter();
    out.extend(rest.by_ref().take(at + 1));
    for declaration in declarations {
        out.push(String::new());
        out.extend(declaration.lines().map(str::to_string));
    }
    out.extend(rest);
    out
}

/// Step 3.
pub fn substitute_types(lines: Vec<String>, substitutions: &[Rule]) -> Vec<String> {
    if substitutions.is_empty() {
        return lines;
    }
    lines
        .into_iter()
        .map(|line| {
            substitutions
                .iter()
                .fold(line, |line, rule| rule.apply(&line).into_owned())
        })
        .collect()
}

/// Step 4.
pub fn append_union(mut lines: Vec<String>, union: Vec<String>) -> Vec<String> {
    if union.is_empty() {
        return lines;
    }
    if lines.last().is_some_and(|last| !last.trim().is_empty()) {
        lines.push(String::new());
    }
    lines.extend(union);
    lines
}

// ————————————————————————————————————————————————————————————————————————————
// TESTS
// ————————————————————————————————————————————————————————————————————————————

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(src: &str) -> Vec<String> {
        src.lines().map(str::to_string).collect()
    }

    fn restore() -> Rule {
        Rule::compile(r"quicktype_(\w+)", "g", "$1_").unwrap()
    }

    #[test]
    fn restoration_only_touches_marked_lines() {
        // the second line matches a loose pattern but has no marker
        let loose = Rule::compile(r"(\w+)_x", "g", "$1").unwrap();
        let out = restore_reserved(lines("a quicktype_x\nb_x"), "quicktype_", &loose);
        assert_eq!(out, lines("a quicktype\nb_x"));

        let out = restore_reserved(lines("    quicktype_else: str\n    when: str"), "quicktype_", &restore());
        assert_eq!(out, lines("    else_: str\n    when: str"));
    }

    #[test]
    fn declarations_follow_first_anchor_match() {
        let anchor = Pattern::compile(r"^from typing import", "").unwrap();
        let src = lines("from enum import Enum\nfrom typing import Any\nfrom typing import List\n\nclass A:");
        let decls = vec!["Params = Any".to_string(), "class Meta:\n    pass".to_string()];
        let out = insert_declarations(src, &anchor, &decls);
        assert_eq!(
            out,
            lines("from enum import Enum\nfrom typing import Any\n\nParams = Any\n\nclass Meta:\n    pass\nfrom typing import List\n\nclass A:")
        );
    }

    #[test]
    fn missing_anchor_is_a_silent_no_op() {
        let anchor = Pattern::compile(r"^import ", "").unwrap();
        let src = lines("package sdk\n\ntype A struct {}");
        let out = insert_declarations(src.clone(), &anchor, &["type B int".to_string()]);
        assert_eq!(out, src);
    }

    #[test]
    fn substitutions_apply_in_order_to_every_line() {
        let subs = vec![
            Rule::compile(r"Dict\[str, Any\]", "g", "Params").unwrap(),
            Rule::compile(r"Params", "g", "Optional[Params]").unwrap(),
        ];
        let out = substitute_types(lines("a: Dict[str, Any]\nb: Dict[str, Any]\nc: int"), &subs);
        assert_eq!(out, lines("a: Optional[Params]\nb: Optional[Params]\nc: int"));
    }

    #[test]
    fn full_rewrite_runs_steps_in_order() {
        let rule = restore();
        let custom = CustomMapping {
            anchor: Some(Pattern::compile(r"^import", "").unwrap()),
            declarations: vec!["type Headers = Record<string, string>;".into()],
            // sees restored names: `else_` exists only after step 1
            substitutions: vec![Rule::compile(r"else_\?: any", "g", "else_?: Instruction[]").unwrap()],
        };
        let rewriter = CodeRewriter::new("quicktype_", &rule, Some(&custom));
        let out = rewriter.rewrite(
            lines("import x from 'y';\nexport interface Cond {\n    quicktype_else?: any;\n}"),
            vec!["export type Instruction = Cond;".into()],
        );
        assert_eq!(
            out,
            lines(
                "import x from 'y';\n\ntype Headers = Record<string, string>;\nexport interface Cond {\n    else_?: Instruction[];\n}\n\nexport type Instruction = Cond;"
            )
        );
    }

    #[test]
    fn union_is_appended_after_single_blank_line() {
        let out = append_union(lines("a\n"), vec!["u".into()]);
        assert_eq!(out, vec!["a".to_string(), String::new(), "u".to_string()]);
        let out = append_union(vec!["a".into(), String::new()], vec!["u".into()]);
        assert_eq!(out, vec!["a".to_string(), String::new(), "u".to_string()]);
        assert_eq!(append_union(lines("a"), Vec::new()), lines("a"));
    }
}
