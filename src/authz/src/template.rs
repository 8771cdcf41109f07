//! Variable placeholder resolution for policy statements
//!
//! Action and resource strings may carry `${name}` placeholders that
//! are substituted per policy instance at decision time. Unknown
//! placeholders stay verbatim so that a missing binding can never
//! silently widen a pattern.

use crate::policy::Statement;
use regex::Regex;
use std::borrow::Cow;
use std::collections::{BTreeSet, HashMap};

/// Placeholder grammar: `${` + one or more `[A-Za-z0-9_.]` + `}`
///
/// No nesting, no escaping. A literal `${` without a well-formed name
/// and closing brace is simply not a placeholder and passes through.
const PLACEHOLDER_PATTERN: &str = r"\$\{([A-Za-z0-9_.]+)\}";

/// Resolves `${name}` placeholders against per-instance variable bags
#[derive(Debug)]
pub struct TemplateResolver {
    placeholder: Regex,
}

impl TemplateResolver {
    /// Create a new resolver
    pub fn new() -> Self {
        Self {
            // The pattern is a compile-time constant and always valid
            placeholder: Regex::new(PLACEHOLDER_PATTERN)
                .unwrap_or_else(|_| unreachable!("placeholder pattern is valid")),
        }
    }

    /// Substitute every known placeholder in a template string
    ///
    /// Placeholders whose name is absent from `vars` remain verbatim.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::collections::HashMap;
    /// use warden_authz::template::TemplateResolver;
    ///
    /// let resolver = TemplateResolver::new();
    /// let vars = HashMap::from([("var1".to_string(), "alpha".to_string())]);
    /// assert_eq!(resolver.resolve("res:${var1}:x", &vars), "res:alpha:x");
    /// assert_eq!(resolver.resolve("res:${other}:x", &vars), "res:${other}:x");
    /// ```
    pub fn resolve(&self, template: &str, vars: &HashMap<String, String>) -> String {
        self.placeholder
            .replace_all(template, |caps: &regex::Captures<'_>| {
                let name = &caps[1];
                match vars.get(name) {
                    Some(value) => Cow::Owned(value.clone()),
                    None => Cow::Owned(caps[0].to_string()),
                }
            })
            .into_owned()
    }

    /// Collect the distinct placeholder names in a template string
    pub fn names_in(&self, template: &str, out: &mut BTreeSet<String>) {
        for caps in self.placeholder.captures_iter(template) {
            out.insert(caps[1].to_string());
        }
    }

    /// Collect every distinct placeholder name over a statement list
    ///
    /// Scans all action and resource strings; used by the policy
    /// variable introspection endpoint.
    pub fn variable_names(&self, statements: &[Statement]) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        for statement in statements {
            for action in &statement.actions {
                self.names_in(action, &mut names);
            }
            for resource in &statement.resources {
                self.names_in(resource, &mut names);
            }
        }
        names
    }
}

impl Default for TemplateResolver {
    fn default() -> Self {
        Self::new()
    }
}
