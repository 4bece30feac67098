use std::fmt;
use std::sync::{Arc, LazyLock};

use regex::Regex;

use super::ScopeId;

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[\p{XID_Start}$_][\p{XID_Continue}$\x{200C}\x{200D}]*$")
        .expect("Invalid regex pattern")
});

pub fn is_valid_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}

/// A variable: a validated name bound in a particular scope.
///
/// Two `Var`s with the same name in different scopes are different
/// variables, which is what keeps a callee's locals from killing the
/// caller's definitions once graphs are merged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Var {
    name: Arc<str>,
    scope: ScopeId,
}

impl Var {
    pub fn new(name: &str, scope: ScopeId) -> Option<Var> {
        if !is_valid_identifier(name) {
            return None;
        }
        Some(Var {
            name: Arc::from(name),
            scope,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scope(&self) -> ScopeId {
        self.scope
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
