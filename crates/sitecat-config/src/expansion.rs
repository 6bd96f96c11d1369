//! `${NAME}` substitution in catalog text.

use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::warn;

static VAR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap());

/// Replace every `${NAME}` that has an entry in `variables`.
///
/// Unknown names are left in place.
pub fn expand_variables(input: &str, variables: &HashMap<String, String>) -> String {
    VAR_REGEX
        .replace_all(input, |caps: &Captures| {
            let name = &caps[1];
            match variables.get(name) {
                Some(value) => value.clone(),
                None => {
                    warn!(variable = %name, "no value for catalog variable; leaving it unexpanded");
                    caps[0].to_string()
                }
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> HashMap<String, String> {
        HashMap::from([
            ("HOME".to_string(), "/home/pegasus".to_string()),
            ("SCRATCH_ROOT".to_string(), "/lustre".to_string()),
        ])
    }

    #[test]
    fn test_expand_known() {
        assert_eq!(
            expand_variables("path=\"${SCRATCH_ROOT}/${HOME}\"", &vars()),
            "path=\"/lustre//home/pegasus\""
        );
    }

    #[test]
    fn test_unknown_left_alone() {
        assert_eq!(
            expand_variables("${MISSING} and ${HOME}", &vars()),
            "${MISSING} and /home/pegasus"
        );
    }

    #[test]
    fn test_non_variable_dollar() {
        assert_eq!(expand_variables("$HOME ${1ABC} $", &vars()), "$HOME ${1ABC} $");
    }
}
